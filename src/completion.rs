//! # Score completion (stage 6, §4.4)
//!
//! Produces a score in which every beat has a measure for every position
//! of the instrument group and every completion-time metadata directive
//! (`OCTAVATE`, `SUPPRESS`, `KEMPLI`, `PART`, `VALIDATION`, `WAIT`, and the
//! `beat_at_end` gongan flag) has been materialized onto the score.

use crate::ast::{DirectiveValue, Keyword, MetadataDirective};
use crate::error::{Diagnostics, GamelanError};
use crate::score::{Beat, Measure, Pass, Position, Score, Suppression, ValidationCheck, WaitEntry};
use crate::tables::ReferenceTables;

pub fn complete(mut score: Score, tables: &ReferenceTables, diag: &mut Diagnostics) -> Score {
    fill_empty_measures(&mut score, tables);
    apply_beat_at_end(&mut score);
    materialize_directives(&mut score, tables, diag);
    score
}

/// Every position registered for this score's instrument group gets a
/// rest-measure wherever its stave was silent in the raw notation (§4.4
/// "Empty measures").
fn fill_empty_measures(score: &mut Score, tables: &ReferenceTables) {
    let group = score.instrument_group.clone();
    let positions: Vec<Position> = tables
        .instruments
        .entries
        .keys()
        .filter(|key| key.0 == group)
        .map(|key| key.1.clone())
        .collect();

    for gongan in score.gongans.iter_mut() {
        for beat_index in 0..gongan.beats.len() {
            let length = gongan.beat_length(beat_index);
            let beat = &mut gongan.beats[beat_index];
            for position in &positions {
                beat.measures
                    .entry(position.clone())
                    .or_insert_with(|| Measure::rest_spanning(length));
            }
        }
    }
}

/// Rotates the GIR: a gongan flagged `beat_at_end` gives up its last
/// beat's measures to become the first beat of the following gongan
/// (§4.4). A trailing flagged gongan with no successor simply loses that
/// beat — there is nowhere for the gong to land.
fn apply_beat_at_end(score: &mut Score) {
    let count = score.gongans.len();
    for i in 0..count {
        if !score.gongans[i].beat_at_end {
            continue;
        }
        let Some(last_beat) = score.gongans[i].beats.pop() else { continue };
        if i + 1 < count {
            score.gongans[i + 1].beats.insert(0, last_beat);
        }
    }
}

fn materialize_directives(score: &mut Score, tables: &ReferenceTables, diag: &mut Diagnostics) {
    let mut score_kempli_off_beats: Vec<(usize, usize)> = Vec::new();
    let mut score_validation_ignore: Vec<ValidationCheck> = Vec::new();

    for gongan_index in 0..score.gongans.len() {
        let directives = score.gongans[gongan_index].directives.clone();
        for directive in &directives {
            match directive.keyword {
                Keyword::Octavate => apply_octavate(score, gongan_index, directive, tables, diag),
                Keyword::Suppress => apply_suppress(score, gongan_index, directive),
                Keyword::Kempli => apply_kempli(score, gongan_index, directive, &mut score_kempli_off_beats),
                Keyword::Part => {
                    if let Some(name) = directive.get_str("name") {
                        score.gongans[gongan_index].part_name = Some(name.to_string());
                    }
                }
                Keyword::Validation => {
                    apply_validation(score, gongan_index, directive, &mut score_validation_ignore)
                }
                Keyword::Wait => apply_wait(score, gongan_index, directive, diag),
                _ => {}
            }
        }
    }

    for (_, beat_index) in score_kempli_off_beats {
        for gongan in score.gongans.iter_mut() {
            gongan.kempli.insert(beat_index, false);
        }
    }
    score.settings.validation_ignore.extend(score_validation_ignore);
}

fn apply_octavate(
    score: &mut Score,
    gongan_index: usize,
    directive: &MetadataDirective,
    tables: &ReferenceTables,
    diag: &mut Diagnostics,
) {
    let Some(instrument) = directive.get_str("instrument") else { return };
    let Some(octaves) = directive.get_int("octaves") else { return };
    let position = Position::new(instrument.to_string());
    let scope_score = directive.get_str("scope").map(str::to_ascii_uppercase).as_deref() == Some("SCORE");
    let group = score.instrument_group.clone();
    let Some(entry) = tables.instruments.get(&group, &position) else { return };
    let range = entry.range.clone();

    let gongan_indices: Vec<usize> = if scope_score {
        (0..score.gongans.len()).collect()
    } else {
        vec![gongan_index]
    };

    for gi in gongan_indices {
        for beat in score.gongans[gi].beats.iter_mut() {
            let Some(measure) = beat.measures.get_mut(&position) else { continue };
            for note in measure.notes.iter_mut() {
                if let Some(po) = note.pitch {
                    let shifted = po.shifted(octaves as i8);
                    if !range.contains_extended(shifted) {
                        diag.push_error(GamelanError::OctavateOutOfRange {
                            instrument: instrument.to_string(),
                        });
                        continue;
                    }
                    note.pitch = Some(shifted);
                }
            }
        }
    }
}

fn apply_suppress(score: &mut Score, gongan_index: usize, directive: &MetadataDirective) {
    let positions = directive
        .get_list("positions")
        .map(|list| list.iter().map(|s| Position::new(s.clone())).collect())
        .unwrap_or_default();
    let beats = directive.get_list("beats").and_then(|list| {
        if list.iter().any(|s| s.eq_ignore_ascii_case("all")) {
            None
        } else {
            Some(list.iter().filter_map(|s| s.parse::<usize>().ok().map(|n| n - 1)).collect())
        }
    });
    let passes = passes_from(directive);
    score.gongans[gongan_index].suppressions.push(Suppression {
        positions,
        beats,
        passes,
    });
}

fn apply_kempli(
    score: &mut Score,
    gongan_index: usize,
    directive: &MetadataDirective,
    score_off: &mut Vec<(usize, usize)>,
) {
    let Some(status) = directive.get_bool("status") else { return };
    let scope_score = directive.get_str("scope").map(str::to_ascii_uppercase).as_deref() == Some("SCORE");
    let beat_indices: Vec<usize> = match directive.get_list("beats") {
        Some(list) if !list.iter().any(|s| s.eq_ignore_ascii_case("all")) => {
            list.iter().filter_map(|s| s.parse::<usize>().ok().map(|n| n - 1)).collect()
        }
        _ => (0..score.gongans[gongan_index].beats.len()).collect(),
    };

    if scope_score {
        for &beat_index in &beat_indices {
            if !status {
                score_off.push((gongan_index, beat_index));
            }
        }
    } else {
        for &beat_index in &beat_indices {
            score.gongans[gongan_index].kempli.insert(beat_index, status);
        }
    }
}

fn apply_validation(
    score: &mut Score,
    gongan_index: usize,
    directive: &MetadataDirective,
    score_ignore: &mut Vec<ValidationCheck>,
) {
    let Some(names) = directive.get_list("ignore") else { return };
    let checks: Vec<ValidationCheck> = names.iter().filter_map(|n| parse_validation_check(n)).collect();
    let scope_score = directive.get_str("scope").map(str::to_ascii_uppercase).as_deref() == Some("SCORE");
    if scope_score {
        score_ignore.extend(checks);
    } else {
        score.gongans[gongan_index].validation_ignore.extend(checks);
    }
}

fn parse_validation_check(name: &str) -> Option<ValidationCheck> {
    match name.to_ascii_lowercase().as_str() {
        "beat-duration" => Some(ValidationCheck::BeatDuration),
        "stave-length" => Some(ValidationCheck::StaveLength),
        "instrument-range" => Some(ValidationCheck::InstrumentRange),
        "kempyung" => Some(ValidationCheck::Kempyung),
        _ => None,
    }
}

fn apply_wait(score: &mut Score, gongan_index: usize, directive: &MetadataDirective, diag: &mut Diagnostics) {
    let Some(seconds) = directive.get_float("seconds") else { return };
    let after = directive.get_bool("after").unwrap_or(true);
    if !after {
        diag.push_error(GamelanError::UnsupportedDirective {
            keyword: "WAIT".to_string(),
            detail: "after=false is not operational".to_string(),
        });
        return;
    }
    score.waits.push(WaitEntry {
        gongan_index,
        seconds,
        after,
        passes: passes_from(directive),
    });
}

fn passes_from(directive: &MetadataDirective) -> Pass {
    match directive.get_passes("passes") {
        Some(list) if list.is_empty() => Pass::All,
        Some(list) if list.len() == 1 => Pass::Single(list[0]),
        Some(list) => Pass::Range(*list.iter().min().unwrap(), *list.iter().max().unwrap()),
        None => match directive.params.get("passes") {
            Some(DirectiveValue::Str(s)) if s.eq_ignore_ascii_case("all") => Pass::All,
            _ => Pass::All,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::ONE;
    use crate::score::{Gongan, InstrumentGroup, Note, Pitch, PitchOctave, Stroke};
    use crate::tables::{InstrumentEntry, InstrumentRange, InstrumentsTable};

    fn tables_with_position(group: &InstrumentGroup, position: &Position) -> ReferenceTables {
        let mut instruments = InstrumentsTable::default();
        instruments.entries.insert(
            (group.clone(), position.clone()),
            InstrumentEntry {
                instrument_type: "gangsa".to_string(),
                range: InstrumentRange {
                    nominal: vec![PitchOctave::new(Pitch::Dong, 0)],
                    extended: vec![PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Dong, -1)],
                },
            },
        );
        ReferenceTables { instruments, ..Default::default() }
    }

    #[test]
    fn fills_missing_positions_with_rests() {
        let group = InstrumentGroup::new("gk");
        let position = Position::new("gangsa");
        let tables = tables_with_position(&group, &position);
        let mut score = Score { instrument_group: group, ..Default::default() };
        score.gongans.push(Gongan { beats: vec![Beat::default()], ..Default::default() });
        let mut diag = Diagnostics::new();
        let completed = complete(score, &tables, &mut diag);
        let measure = completed.gongans[0].beats[0].measure(&position).unwrap();
        assert!(measure.notes[0].is_rest());
    }

    #[test]
    fn octavate_out_of_range_is_reported() {
        let group = InstrumentGroup::new("gk");
        let position = Position::new("gangsa");
        let tables = tables_with_position(&group, &position);
        let mut score = Score { instrument_group: group, ..Default::default() };
        let mut beat = Beat::default();
        beat.measures.insert(
            position.clone(),
            Measure::new(vec![Note {
                pitch: Some(PitchOctave::new(Pitch::Dong, 0)),
                stroke: Stroke::Open,
                duration: ONE,
                rest_after: crate::fraction::ZERO,
                modifiers: vec![],
                velocity_override: None,
            }]),
        );
        let directive = MetadataDirective {
            keyword: Keyword::Octavate,
            params: {
                let mut m = std::collections::HashMap::new();
                m.insert("instrument".to_string(), DirectiveValue::Str("gangsa".to_string()));
                m.insert("octaves".to_string(), DirectiveValue::Int(-3));
                m
            },
            location: Default::default(),
        };
        score.gongans.push(Gongan {
            beats: vec![beat],
            directives: vec![directive],
            ..Default::default()
        });
        let mut diag = Diagnostics::new();
        let _ = complete(score, &tables, &mut diag);
        assert!(diag.has_errors());
        assert!(matches!(diag.errors[0], GamelanError::OctavateOutOfRange { .. }));
    }
}
