//! # Score construction (stage 3, §4.2 first half)
//!
//! Builds a [`Score`] with generic pitches directly from a [`RawNotation`]:
//! each stave's beat groups become a `Measure` per beat, keyed for now by
//! the raw notation tag rather than a resolved instrument position (that
//! happens in `binding.rs`, the second half of §4.2). The label table is
//! also built here, from `LABEL` directives.

use crate::ast::{Keyword, RawNotation, RawSymbol};
use crate::error::{Diagnostics, GamelanError, TextLocation};
use crate::score::{
    Beat, Gongan, GonganType, InstrumentGroup, Measure, Note, NoteModifier, Position, Score, ScoreSettings, Stroke,
};
use crate::tables::{FontSymbolKind, FontTable, ModifierKind, RunConfig};

/// Builds the generic-pitch score: stave tags stand in for positions until
/// `binding::bind_positions` resolves them. `settings` is the seed produced
/// by `settings::validate_settings`, carried through untouched except for
/// the `SEQUENCE`/`LABEL` directives this stage reads out of the unbound
/// block. `config`'s `instrument_group`/`font_version` become the score's
/// own top-level fields (§3) — every table lookup from `binding` onward is
/// keyed on `config.instrument_group`.
pub fn construct(
    raw: &RawNotation,
    font: &FontTable,
    settings: ScoreSettings,
    config: &RunConfig,
    diag: &mut Diagnostics,
) -> Score {
    let mut score = Score {
        settings,
        instrument_group: InstrumentGroup::new(config.instrument_group.clone()),
        font_version: config.font_version.clone(),
        ..Score::default()
    };

    for directive in raw.unbound_metadata() {
        if directive.keyword == Keyword::Sequence {
            if let Some(list) = directive.get_list("value") {
                score.settings.sequence = Some(list.to_vec());
            }
        }
        if directive.keyword == Keyword::Label {
            if let Some(name) = directive.get_str("name") {
                score.unbound_labels.insert(name.to_string());
            }
        }
    }

    for (gongan_index, raw_gongan) in raw.gongans.iter().enumerate() {
        let gongan_directive = raw_gongan.metadata().find(|d| d.keyword == Keyword::Gongan);
        let gongan_type = gongan_directive
            .map(|d| parse_gongan_type(d.get_str("type")))
            .unwrap_or_default();
        // No keyword in the directive catalog (§6) names this flag
        // explicitly; `GONGAN beat_at_end=true` is the natural extension of
        // the same directive that already carries the gongan's type.
        let beat_at_end = gongan_directive.and_then(|d| d.get_bool("beat_at_end")).unwrap_or(false);

        let mut gongan = Gongan {
            gongan_type,
            beat_at_end,
            ..Gongan::default()
        };
        gongan.directives = raw_gongan.metadata().cloned().collect();

        let beat_count = raw_gongan.staves().map(|stave| stave.beats.len()).max().unwrap_or(0);
        gongan.beats = vec![Beat::default(); beat_count];

        for stave in raw_gongan.staves() {
            let position = Position::new(stave.tag.clone());
            for (beat_index, symbols) in stave.beats.iter().enumerate() {
                let Some(beat) = gongan.beats.get_mut(beat_index) else {
                    continue;
                };
                let notes = decode_beat(symbols, font, diag);
                let mut measure = Measure::new(notes);
                measure.pass = stave.pass;
                beat.measures.insert(position.clone(), measure);
            }
        }

        for directive in raw_gongan.metadata() {
            if directive.keyword == Keyword::Label {
                if let Some(name) = directive.get_str("name") {
                    let beat = directive.get_int("beat").unwrap_or(1).max(1) as usize - 1;
                    if score.labels.contains_key(name) {
                        diag.push_error(GamelanError::DuplicateLabel {
                            name: name.to_string(),
                        });
                    } else {
                        score.labels.insert(name.to_string(), (gongan_index, beat));
                    }
                }
            }
        }

        score.gongans.push(gongan);
    }

    score
}

fn parse_gongan_type(raw: Option<&str>) -> GonganType {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("kebyar") => GonganType::Kebyar,
        Some("gineman") => GonganType::Gineman,
        _ => GonganType::Regular,
    }
}

/// Reduces one beat group's raw symbols into notes: each base symbol
/// becomes a `Note`, trailing combining modifiers attach to it (§9,
/// "(base, modifier*) -> Note"), and rest symbols become rest notes.
fn decode_beat(symbols: &[RawSymbol], font: &FontTable, diag: &mut Diagnostics) -> Vec<Note> {
    let mut notes = Vec::new();
    for symbol in symbols {
        let Some(entry) = font.get(symbol.base) else {
            continue;
        };
        match &entry.kind {
            FontSymbolKind::Rest => {
                let (modifiers, _, _) = decode_modifiers(&symbol.modifiers, font, diag, &symbol.location);
                notes.push(Note {
                    pitch: None,
                    stroke: Stroke::Open,
                    duration: crate::fraction::ZERO,
                    rest_after: entry.rest_after,
                    modifiers,
                    velocity_override: None,
                });
            }
            FontSymbolKind::Note { pitch_octave, stroke } => {
                let (modifiers, octave_delta, stroke_override) =
                    decode_modifiers(&symbol.modifiers, font, diag, &symbol.location);
                notes.push(Note {
                    pitch: Some(pitch_octave.shifted(octave_delta)),
                    stroke: stroke_override.unwrap_or(*stroke),
                    duration: entry.duration,
                    rest_after: entry.rest_after,
                    modifiers,
                    velocity_override: None,
                });
            }
            FontSymbolKind::Modifier(_) => {
                diag.push_error(GamelanError::LineParseError {
                    location: symbol.location.clone(),
                    message: format!(
                        "'{}' is a combining modifier and cannot start a symbol",
                        symbol.base
                    ),
                });
            }
        }
    }
    notes
}

/// Resolves a note's combining modifiers into note-level ornament tags, an
/// octave delta, and a stroke override (muting replaces the base stroke
/// rather than stacking as a modifier tag).
fn decode_modifiers(
    chars: &[char],
    font: &FontTable,
    diag: &mut Diagnostics,
    location: &TextLocation,
) -> (Vec<NoteModifier>, i8, Option<Stroke>) {
    let mut modifiers = Vec::new();
    let mut octave_delta = 0i8;
    let mut stroke_override = None;
    for &c in chars {
        match font.get(c).map(|entry| &entry.kind) {
            Some(FontSymbolKind::Modifier(kind)) => match kind {
                ModifierKind::OctaveShift(delta) => octave_delta += delta,
                ModifierKind::Mute => stroke_override = Some(Stroke::Muted),
                ModifierKind::Tremolo => modifiers.push(NoteModifier::Tremolo),
                ModifierKind::AcceleratingTremolo => modifiers.push(NoteModifier::AcceleratingTremolo),
                ModifierKind::Pattern(tag) => modifiers.push(NoteModifier::Pattern(tag.clone())),
            },
            _ => {
                diag.push_error(GamelanError::LineParseError {
                    location: location.clone(),
                    message: format!("'{c}' is not a recognized combining modifier"),
                });
            }
        }
    }
    (modifiers, octave_delta, stroke_override)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::{frac, ONE};
    use crate::score::{Pitch, PitchOctave};
    use crate::tables::FontEntry;

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
    fn builds_one_gongan_with_generic_positions() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "kendang\to-o-";
        let raw = crate::parser::parse(source, &font, &mut diag);
        let score = construct(&raw, &font, ScoreSettings::default(), &RunConfig::default(), &mut diag);
        assert!(!diag.has_errors());
        assert_eq!(score.gongans.len(), 1);
        let gongan = &score.gongans[0];
        assert_eq!(gongan.beats.len(), 2);
        let measure = gongan.beats[0].measure(&Position::new("kendang")).unwrap();
        assert_eq!(measure.notes.len(), 2);
        assert!(measure.notes[0].pitch.is_some());
        assert!(measure.notes[1].is_rest());
    }

    #[test]
    fn gongan_beat_at_end_flag_is_read_from_the_gongan_directive() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "metadata\t{GONGAN type=kebyar, beat_at_end=true}\nkendang\to-o-";
        let raw = crate::parser::parse(source, &font, &mut diag);
        let score = construct(&raw, &font, ScoreSettings::default(), &RunConfig::default(), &mut diag);
        assert!(score.gongans[0].beat_at_end);
    }

    #[test]
    fn rejects_duplicate_labels() {
        let font = test_font();
        let mut diag = Diagnostics::new();
        let source = "metadata\t{LABEL name=start}\nkendang\to-o-\n\nmetadata\t{LABEL name=start}\nkendang\to-o-";
        let raw = crate::parser::parse(source, &font, &mut diag);
        let _ = construct(&raw, &font, ScoreSettings::default(), &RunConfig::default(), &mut diag);
        assert!(diag.has_errors());
        assert!(matches!(diag.errors[0], GamelanError::DuplicateLabel { .. }));
    }
}
