//! # Position binding (stage 4, §4.2 second half)
//!
//! Resolves each measure's notation tag to one or more concrete instrument
//! positions via the tag-to-positions table. A tag bound to a single
//! position binds directly; a tag shared across several positions runs the
//! shared-notation rules engine (`SAME_PITCH`, `SAME_PITCH_EXTENDED_RANGE`,
//! `KEMPYUNG`, first success wins) per target position.

use std::collections::BTreeMap;

use crate::error::{Diagnostics, GamelanError, ScoreLocation};
use crate::score::{InstrumentGroup, Measure, PitchOctave, Position, Score};
use crate::tables::{InstrumentRange, ReferenceTables, SharedNotationRule};

pub fn bind_positions(mut score: Score, tables: &ReferenceTables, diag: &mut Diagnostics) -> Score {
    let group = score.instrument_group.clone();
    let rules = tables
        .rules
        .shared_notation_rules
        .get(&group)
        .cloned()
        .unwrap_or_default();

    for (gongan_index, gongan) in score.gongans.iter_mut().enumerate() {
        for (beat_index, beat) in gongan.beats.iter_mut().enumerate() {
            let tags: Vec<Position> = beat.measures.keys().cloned().collect();
            let mut resolved: BTreeMap<Position, Measure> = BTreeMap::new();

            for tag_position in tags {
                let Some(measure) = beat.measures.remove(&tag_position) else {
                    continue;
                };
                let tag = tag_position.0;

                let Some(positions) = tables.tag_positions.positions_for(&tag) else {
                    diag.push_error(GamelanError::UnknownTag {
                        location: crate::error::TextLocation::default(),
                        tag: tag.clone(),
                    });
                    continue;
                };

                if positions.len() == 1 {
                    resolved.insert(positions[0].clone(), measure);
                    continue;
                }

                for position in positions {
                    match apply_shared_notation(&measure, position, &group, tables, &rules) {
                        Some(bound) => {
                            resolved.insert(position.clone(), bound);
                        }
                        None => {
                            diag.push_error(GamelanError::UnmappableSharedNotation {
                                location: ScoreLocation {
                                    gongan: gongan_index,
                                    beat: beat_index,
                                    position: Some(position.to_string()),
                                },
                                tag: tag.clone(),
                                position: position.to_string(),
                            });
                            resolved.insert(
                                position.clone(),
                                Measure::rest_spanning(measure.total_duration()),
                            );
                        }
                    }
                }
            }

            beat.measures = resolved;
        }
    }

    score
}

fn apply_shared_notation(
    measure: &Measure,
    position: &Position,
    group: &InstrumentGroup,
    tables: &ReferenceTables,
    rules: &[SharedNotationRule],
) -> Option<Measure> {
    let entry = tables.instruments.get(group, position)?;
    for rule in rules {
        let attempt = match rule {
            SharedNotationRule::SamePitch => try_same_pitch(measure, &entry.range, false),
            SharedNotationRule::SamePitchExtendedRange => try_same_pitch(measure, &entry.range, true),
            SharedNotationRule::Kempyung => try_kempyung(measure, group, &entry.range, tables),
        };
        if attempt.is_some() {
            return attempt;
        }
    }
    None
}

fn try_same_pitch(measure: &Measure, range: &InstrumentRange, extended: bool) -> Option<Measure> {
    let mut notes = Vec::with_capacity(measure.notes.len());
    for note in &measure.notes {
        match note.pitch {
            None => notes.push(note.clone()),
            Some(po) => {
                let contains = |p: PitchOctave| {
                    if extended {
                        range.contains_extended(p)
                    } else {
                        range.contains_nominal(p)
                    }
                };
                let resolved = if contains(po) {
                    po
                } else if contains(po.shifted(1)) {
                    po.shifted(1)
                } else if contains(po.shifted(-1)) {
                    po.shifted(-1)
                } else {
                    return None;
                };
                let mut resolved_note = note.clone();
                resolved_note.pitch = Some(resolved);
                notes.push(resolved_note);
            }
        }
    }
    let mut result = measure.clone();
    result.notes = notes;
    Some(result)
}

fn try_kempyung(
    measure: &Measure,
    group: &InstrumentGroup,
    range: &InstrumentRange,
    tables: &ReferenceTables,
) -> Option<Measure> {
    let mut notes = Vec::with_capacity(measure.notes.len());
    for note in &measure.notes {
        match note.pitch {
            None => notes.push(note.clone()),
            Some(po) => {
                let kempyung = tables.rules.kempyung_of(group, po)?;
                if !range.contains_nominal(kempyung) {
                    return None;
                }
                let mut resolved_note = note.clone();
                resolved_note.pitch = Some(kempyung);
                notes.push(resolved_note);
            }
        }
    }
    let mut result = measure.clone();
    result.notes = notes;
    Some(result)
}
