//! # Notation parse (stage 2, §4.1)
//!
//! Turns tab-delimited source text into a [`RawNotation`]: a maximal-run
//! segmentation into gongans (separated by blank lines), with each line
//! classified as a metadata directive, a comment, or a stave, and each
//! stave's beat groups handed to [`crate::lexer::SymbolDecoder`].
//!
//! An optional leading run of metadata/comment-only lines (no staves) is
//! kept unattached to any gongan — the "unbound" block where score-wide
//! settings such as `SEQUENCE` belong (§4.6).

pub mod directive;

use crate::ast::{RawGongan, RawLine, RawNotation, RawStave};
use crate::error::{Diagnostics, GamelanError, TextLocation};
use crate::lexer::SymbolDecoder;
use crate::score::Pass;
use crate::tables::FontTable;

/// Parses a complete notation file into its raw syntax tree.
pub fn parse(source: &str, font: &FontTable, diag: &mut Diagnostics) -> RawNotation {
    let physical: Vec<(usize, &str)> = source.lines().enumerate().map(|(i, l)| (i + 1, l)).collect();
    let runs = split_into_runs(&physical);

    let mut parsed_runs: Vec<Vec<RawLine>> = runs
        .into_iter()
        .map(|run| parse_run(&run, font, diag))
        .collect();

    let mut notation = RawNotation::default();
    if !parsed_runs.is_empty() {
        let first = parsed_runs.remove(0);
        let has_stave = first.iter().any(|line| matches!(line, RawLine::Stave(_)));
        if has_stave {
            notation.gongans.push(RawGongan { lines: first });
        } else {
            notation.unbound = first;
        }
    }
    for lines in parsed_runs {
        notation.gongans.push(RawGongan { lines });
    }
    notation
}

/// Groups physical lines into maximal runs separated by one or more blank
/// lines, dropping the blank lines themselves.
fn split_into_runs<'a>(physical: &[(usize, &'a str)]) -> Vec<Vec<(usize, &'a str)>> {
    let mut runs = Vec::new();
    let mut current: Vec<(usize, &str)> = Vec::new();
    for &(n, text) in physical {
        if text.trim().is_empty() {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        } else {
            current.push((n, text));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Parses one run (a maximal block of non-blank lines) into its component
/// lines, consuming extra physical lines for multi-line metadata blocks.
fn parse_run(lines: &[(usize, &str)], font: &FontTable, diag: &mut Diagnostics) -> Vec<RawLine> {
    let mut result = Vec::new();
    let mut idx = 0;
    while idx < lines.len() {
        let (line_no, text) = lines[idx];
        let location = TextLocation::new(line_no, 1);

        if let Some(brace_start) = find_metadata_start(text) {
            let mut body = String::new();
            body.push_str(&text[brace_start..]);
            let mut consumed = 1;
            let mut terminated = body.contains('}');
            while !terminated && idx + consumed < lines.len() {
                let (_, next_text) = lines[idx + consumed];
                body.push('\n');
                body.push_str(next_text);
                terminated = next_text.contains('}');
                consumed += 1;
            }
            if !terminated {
                diag.push_error(GamelanError::UnterminatedMetadata { location });
                idx += consumed;
                continue;
            }
            let inner = strip_braces(&body);
            if let Some(directive) = directive::parse_directive(&inner, location, diag) {
                result.push(RawLine::Metadata(directive));
            }
            idx += consumed;
            continue;
        }

        if let Some(content) = find_comment_start(text) {
            result.push(RawLine::Comment(content.trim().to_string()));
            idx += 1;
            continue;
        }

        let parts: Vec<&str> = text.split('\t').collect();
        if parts.len() < 2 {
            diag.push_error(GamelanError::LineParseError {
                location,
                message: format!("expected a tab-delimited line, got '{text}'"),
            });
            idx += 1;
            continue;
        }

        let (tag, pass) = parse_tag_and_pass(parts[0], location.clone(), diag);
        let decoder = SymbolDecoder::new(font);
        let mut beats = Vec::new();
        let mut column = parts[0].chars().count() + 2;
        for beat_text in &parts[1..] {
            let symbols = decoder.decode(beat_text, line_no, column, diag);
            column += beat_text.chars().count() + 1;
            beats.push(symbols);
        }
        result.push(RawLine::Stave(RawStave {
            tag,
            pass,
            beats,
            location,
        }));
        idx += 1;
    }
    result
}

/// Detects a metadata line (`[metadata]<TAB>{...`) and returns the byte
/// offset of the opening brace within `text`, so that continuation lines of
/// a multi-line block can be appended verbatim.
fn find_metadata_start(text: &str) -> Option<usize> {
    let mut parts = text.splitn(2, '\t');
    let field0 = parts.next()?;
    let field1 = parts.next()?;
    let is_metadata_keyword = field0.trim().is_empty() || field0.trim().eq_ignore_ascii_case("metadata");
    if !is_metadata_keyword {
        return None;
    }
    let trimmed = field1.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let offset_in_field1 = field1.len() - trimmed.len();
    Some(field0.len() + 1 + offset_in_field1)
}

/// Detects a comment line (`comment<TAB>...` or `<TAB>#...`) and returns its
/// text content.
fn find_comment_start(text: &str) -> Option<&str> {
    let mut parts = text.splitn(2, '\t');
    let field0 = parts.next()?;
    let field1 = parts.next()?;
    if field0.trim().eq_ignore_ascii_case("comment") {
        return Some(field1);
    }
    let trimmed = field1.trim_start();
    if field0.trim().is_empty() && trimmed.starts_with('#') {
        return Some(&trimmed[1..]);
    }
    None
}

fn strip_braces(body: &str) -> String {
    let start = body.find('{').map(|i| i + 1).unwrap_or(0);
    let end = body.rfind('}').unwrap_or(body.len());
    if start <= end {
        body[start..end].to_string()
    } else {
        String::new()
    }
}

/// Parses a stave's leading field into a tag and an optional pass
/// specifier (`tag`, `tag:N`, or `tag:N-M`). `tag:N-` (no upper bound) is
/// rejected rather than treated as open-ended, per the resolved Open
/// Question on unbounded pass ranges.
fn parse_tag_and_pass(raw: &str, location: TextLocation, diag: &mut Diagnostics) -> (String, Pass) {
    match raw.split_once(':') {
        None => (raw.trim().to_string(), Pass::All),
        Some((tag, pass_spec)) => {
            let tag = tag.trim().to_string();
            let pass_spec = pass_spec.trim();

            if let Ok(n) = pass_spec.parse::<u32>() {
                return (tag, Pass::Single(n));
            }

            if let Some((lo, hi)) = pass_spec.split_once('-') {
                let hi = hi.trim();
                if hi.is_empty() {
                    diag.push_error(GamelanError::MalformedDirective {
                        location,
                        keyword: "PASS_RANGE".to_string(),
                        message: format!("unbounded pass range '{pass_spec}' is not supported"),
                    });
                    return (tag, Pass::All);
                }
                if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.parse::<u32>()) {
                    return (tag, Pass::Range(lo, hi));
                }
            }

            diag.push_error(GamelanError::MalformedDirective {
                location,
                keyword: "PASS_RANGE".to_string(),
                message: format!("invalid pass specifier '{pass_spec}'"),
            });
            (tag, Pass::All)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::{frac, ONE};
    use crate::score::{Pitch, PitchOctave, Stroke};
    use crate::tables::FontEntry;
    use crate::tables::FontSymbolKind;

    fn test_font() -> FontTable {
        let mut entries = std::collections::HashMap::new();
        entries.insert(
            'o',
            FontEntry {
                code_point: 'o',
                kind: FontSymbolKind::Note {
                    pitch_octave: PitchOctave::new(Pitch::Dong, 0),
                    stroke: Stroke::Open,
                },
                duration: ONE,
                rest_after: frac(0, 1),
                is_combining: false,
            },
        );
        entries.insert(
            '-',
            FontEntry {
                code_point: '-',
                kind: FontSymbolKind::Rest,
                duration: frac(0, 1),
                rest_after: ONE,
                is_combining: false,
            },
        );
        FontTable { entries }
    }

    #[test]
    fn parses_a_single_gongan_with_one_stave() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "kendang\to-o-";
        let notation = parse(source, &font, &mut diag);
        assert!(!diag.has_errors());
        assert!(notation.unbound.is_empty());
        assert_eq!(notation.gongans.len(), 1);
        assert_eq!(notation.gongans[0].staves().count(), 1);
    }

    #[test]
    fn separates_unbound_block_from_first_gongan() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "metadata\t{SEQUENCE value=[a,b]}\n\nkendang\to-o-";
        let notation = parse(source, &font, &mut diag);
        assert!(!diag.has_errors());
        assert_eq!(notation.unbound_metadata().count(), 1);
        assert_eq!(notation.gongans.len(), 1);
    }

    #[test]
    fn separates_gongans_on_blank_lines() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "kendang\to-o-\n\nkendang\to-o-";
        let notation = parse(source, &font, &mut diag);
        assert!(!diag.has_errors());
        assert_eq!(notation.gongans.len(), 2);
    }

    #[test]
    fn parses_comment_lines() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "comment\tthis is a remark\nkendang\to-o-";
        let notation = parse(source, &font, &mut diag);
        assert!(!diag.has_errors());
        let comments: Vec<_> = notation.gongans[0]
            .lines
            .iter()
            .filter(|l| matches!(l, RawLine::Comment(_)))
            .collect();
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn parses_pass_specifier_on_tag() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "kendang:2\to-o-";
        let notation = parse(source, &font, &mut diag);
        assert!(!diag.has_errors());
        let stave = notation.gongans[0].staves().next().unwrap();
        assert_eq!(stave.pass, Pass::Single(2));
    }

    #[test]
    fn rejects_unbounded_pass_range() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "kendang:1-\to-o-";
        let notation = parse(source, &font, &mut diag);
        assert!(diag.has_errors());
        let stave = notation.gongans[0].staves().next().unwrap();
        assert_eq!(stave.pass, Pass::All);
    }

    #[test]
    fn reports_unterminated_metadata_block() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "metadata\t{GONGAN type=kebyar";
        let notation = parse(source, &font, &mut diag);
        assert!(diag.has_errors());
        assert!(notation.unbound.is_empty() && notation.gongans.is_empty());
    }
}
