//! # Score validation and autocorrection (stage 7, §4.5)
//!
//! Four independent checks over a completed score: beat-length equality,
//! stave length (empty gongans), instrument range, and kempyung
//! correctness. Each is individually suppressible via a `VALIDATION
//! ignore=[...]` directive (materialized onto `Gongan::validation_ignore`
//! / `ScoreSettings::validation_ignore` at completion time). Autocorrection
//! writes into the returned `Score` value; it never mutates the input in
//! place (§9 "immutable staged artifacts").

use crate::error::{Diagnostics, GamelanError, ScoreLocation};
use crate::score::{Position, Score, ValidationCheck};
use crate::tables::{ReferenceTables, RunConfig};

pub fn validate(mut score: Score, tables: &ReferenceTables, config: &RunConfig, diag: &mut Diagnostics) -> Score {
    check_stave_length(&score, diag);
    check_beat_length(&score, diag);
    check_instrument_range(&mut score, tables, config, diag);
    check_kempyung(&mut score, tables, config, diag);
    score
}

fn ignores(score: &Score, gongan_index: usize, check: ValidationCheck) -> bool {
    score.settings.validation_ignore.contains(&check)
        || score.gongans[gongan_index].validation_ignore.contains(&check)
}

/// §8 boundary behavior: an empty gongan is a stave-length violation.
/// Per-position beat-count mismatches within a non-empty gongan are
/// resolved earlier by completion's empty-measure fill (§4.4), not
/// flagged here.
fn check_stave_length(score: &Score, diag: &mut Diagnostics) {
    for (gongan_index, gongan) in score.gongans.iter().enumerate() {
        if gongan.beats.is_empty() && !ignores(score, gongan_index, ValidationCheck::StaveLength) {
            diag.push_error(GamelanError::StaveLengthMismatch {
                gongan: gongan_index,
                position: String::new(),
            });
        }
    }
}

fn check_beat_length(score: &Score, diag: &mut Diagnostics) {
    use crate::score::GonganType;
    for (gongan_index, gongan) in score.gongans.iter().enumerate() {
        if gongan.gongan_type != GonganType::Regular {
            continue;
        }
        if ignores(score, gongan_index, ValidationCheck::BeatDuration) {
            continue;
        }
        for (beat_index, beat) in gongan.beats.iter().enumerate() {
            if beat.measures.is_empty() {
                diag.push_error(GamelanError::BeatLengthMismatch {
                    location: ScoreLocation { gongan: gongan_index, beat: beat_index, position: None },
                    position: String::new(),
                    actual: "0".to_string(),
                    expected: "n/a".to_string(),
                });
                continue;
            }
            let expected = gongan.beat_length(beat_index);
            for (position, measure) in &beat.measures {
                let actual = measure.total_duration();
                if measure.ignores(ValidationCheck::BeatDuration) {
                    continue;
                }
                if actual != expected {
                    diag.push_error(GamelanError::BeatLengthMismatch {
                        location: ScoreLocation { gongan: gongan_index, beat: beat_index, position: Some(position.to_string()) },
                        position: position.to_string(),
                        actual: actual.to_string(),
                        expected: expected.to_string(),
                    });
                }
            }
        }
    }
}

fn check_instrument_range(score: &mut Score, tables: &ReferenceTables, config: &RunConfig, diag: &mut Diagnostics) {
    let group = score.instrument_group.clone();
    for gongan_index in 0..score.gongans.len() {
        let skip = ignores(score, gongan_index, ValidationCheck::InstrumentRange);
        let gongan = &mut score.gongans[gongan_index];
        for (beat_index, beat) in gongan.beats.iter_mut().enumerate() {
            for (position, measure) in beat.measures.iter_mut() {
                if skip || measure.ignores(ValidationCheck::InstrumentRange) {
                    continue;
                }
                let Some(entry) = tables.instruments.get(&group, position) else { continue };
                for note in measure.notes.iter_mut() {
                    let Some(po) = note.pitch else { continue };
                    if entry.range.contains_extended(po) {
                        continue;
                    }
                    if config.autocorrect {
                        if entry.range.contains_extended(po.shifted(-1)) {
                            note.pitch = Some(po.shifted(-1));
                            diag.push_warning(format!(
                                "gongan {gongan_index} beat {beat_index} position {position}: clamped out-of-range note down one octave"
                            ));
                            continue;
                        }
                        if entry.range.contains_extended(po.shifted(1)) {
                            note.pitch = Some(po.shifted(1));
                            diag.push_warning(format!(
                                "gongan {gongan_index} beat {beat_index} position {position}: clamped out-of-range note up one octave"
                            ));
                            continue;
                        }
                    }
                    diag.push_error(GamelanError::NoteOutOfRange {
                        location: ScoreLocation { gongan: gongan_index, beat: beat_index, position: Some(position.to_string()) },
                        position: position.to_string(),
                    });
                }
            }
        }
    }
}

fn check_kempyung(score: &mut Score, tables: &ReferenceTables, config: &RunConfig, diag: &mut Diagnostics) {
    let group = score.instrument_group.clone();
    let Some(pairs) = tables.rules.kempyung_pairs.get(&group).cloned() else { return };

    for (polos, sangsih) in pairs {
        for gongan_index in 0..score.gongans.len() {
            let skip = ignores(score, gongan_index, ValidationCheck::Kempyung);
            if skip {
                continue;
            }
            for beat_index in 0..score.gongans[gongan_index].beats.len() {
                check_kempyung_beat(score, tables, &group, &polos, &sangsih, gongan_index, beat_index, config, diag);
            }
        }
    }
}

fn check_kempyung_beat(
    score: &mut Score,
    tables: &ReferenceTables,
    group: &crate::score::InstrumentGroup,
    polos: &Position,
    sangsih: &Position,
    gongan_index: usize,
    beat_index: usize,
    config: &RunConfig,
    diag: &mut Diagnostics,
) {
    let beat = &score.gongans[gongan_index].beats[beat_index];
    let Some(polos_measure) = beat.measure(polos) else { return };
    let Some(sangsih_measure) = beat.measure(sangsih) else { return };
    if polos_measure.ignores(ValidationCheck::Kempyung) || sangsih_measure.ignores(ValidationCheck::Kempyung) {
        return;
    }

    let mut corrections = Vec::new();
    for (i, polos_note) in polos_measure.notes.iter().enumerate() {
        let Some(sangsih_note) = sangsih_measure.notes.get(i) else { continue };
        let Some(polos_pitch) = polos_note.pitch else { continue };
        let Some(sangsih_pitch) = sangsih_note.pitch else { continue };
        let Some(expected) = tables.rules.kempyung_of(group, polos_pitch) else { continue };
        if sangsih_pitch != expected {
            if config.autocorrect {
                corrections.push((i, expected));
            } else {
                diag.push_error(GamelanError::KempyungMismatch {
                    location: ScoreLocation { gongan: gongan_index, beat: beat_index, position: Some(sangsih.to_string()) },
                });
            }
        }
    }

    if !corrections.is_empty() {
        let beat = &mut score.gongans[gongan_index].beats[beat_index];
        if let Some(measure) = beat.measures.get_mut(sangsih) {
            for (i, expected) in corrections {
                if let Some(note) = measure.notes.get_mut(i) {
                    note.pitch = Some(expected);
                }
            }
        }
        diag.push_warning(format!(
            "gongan {gongan_index} beat {beat_index}: autocorrected sangsih to kempyung equivalent"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::ONE;
    use crate::score::{Beat, Gongan, InstrumentGroup, Measure, Note, Pitch, PitchOctave, Stroke};
    use crate::tables::{InstrumentEntry, InstrumentRange, InstrumentsTable, RulesTable};

    fn note(pitch: Pitch, octave: i8) -> Note {
        Note {
            pitch: Some(PitchOctave::new(pitch, octave)),
            stroke: Stroke::Open,
            duration: ONE,
            rest_after: crate::fraction::ZERO,
            modifiers: vec![],
            velocity_override: None,
        }
    }

    #[test]
    fn empty_gongan_is_stave_length_mismatch() {
        let mut score = Score::default();
        score.gongans.push(Gongan::default());
        let mut diag = Diagnostics::new();
        let _ = validate(score, &ReferenceTables::default(), &RunConfig::default(), &mut diag);
        assert!(matches!(diag.errors[0], GamelanError::StaveLengthMismatch { .. }));
    }

    #[test]
    fn kempyung_mismatch_autocorrects_when_enabled() {
        let group = InstrumentGroup::new("gk");
        let polos = Position::new("polos");
        let sangsih = Position::new("sangsih");

        let mut rules = RulesTable::default();
        rules.kempyung_pairs.insert(group.clone(), vec![(polos.clone(), sangsih.clone())]);
        let mut kempyung_map = std::collections::HashMap::new();
        kempyung_map.insert(PitchOctave::new(Pitch::Dong, 0), PitchOctave::new(Pitch::Dung, 0));
        rules.kempyung.insert(group.clone(), kempyung_map);
        let tables = ReferenceTables { rules, ..Default::default() };

        let mut beat = Beat::default();
        beat.measures.insert(polos.clone(), Measure::new(vec![note(Pitch::Dong, 0)]));
        beat.measures.insert(sangsih.clone(), Measure::new(vec![note(Pitch::Deng, 0)]));
        let mut score = Score { instrument_group: group, ..Default::default() };
        score.gongans.push(Gongan { beats: vec![beat], ..Default::default() });

        let mut diag = Diagnostics::new();
        let config = RunConfig { autocorrect: true, ..Default::default() };
        let corrected = validate(score, &tables, &config, &mut diag);
        assert!(!diag.has_errors());
        assert!(!diag.warnings.is_empty());
        let measure = corrected.gongans[0].beats[0].measure(&sangsih).unwrap();
        assert_eq!(measure.notes[0].pitch, Some(PitchOctave::new(Pitch::Dung, 0)));
    }

    #[test]
    fn instrument_range_check_flags_out_of_range_note_without_autocorrect() {
        let group = InstrumentGroup::new("gk");
        let position = Position::new("gangsa");
        let mut instruments = InstrumentsTable::default();
        instruments.entries.insert(
            (group.clone(), position.clone()),
            InstrumentEntry {
                instrument_type: "gangsa".to_string(),
                range: InstrumentRange {
                    nominal: vec![PitchOctave::new(Pitch::Dong, 0)],
                    extended: vec![PitchOctave::new(Pitch::Dong, 0)],
                },
            },
        );
        let tables = ReferenceTables { instruments, ..Default::default() };
        let mut beat = Beat::default();
        beat.measures.insert(position, Measure::new(vec![note(Pitch::Deng, 2)]));
        let mut score = Score { instrument_group: group, ..Default::default() };
        score.gongans.push(Gongan { beats: vec![beat], ..Default::default() });

        let mut diag = Diagnostics::new();
        let config = RunConfig { autocorrect: false, ..Default::default() };
        let _ = validate(score, &tables, &config, &mut diag);
        assert!(diag.errors.iter().any(|e| matches!(e, GamelanError::NoteOutOfRange { .. })));
    }
}
