//! # Pattern elaboration (stage 5, §4.3)
//!
//! Expands shorthand notation atoms into concrete note sequences: fixed-
//! frequency tremolo, one- or two-note accelerating tremolo, and
//! (for the configured shorthand positions) padding a beat out to its
//! nominal length with a trailing rest or a sustain extension. Norot and
//! other pattern ornaments share the `Pattern(String)` modifier and are
//! looked up in the same way tremolo is — new ornaments are added to the
//! rule table, not to this elaborator (§4.3, §9).

use crate::fraction::{round_nearest, Fraction, ONE, ZERO};
use crate::score::{Measure, Note, NoteModifier, Position, Score};
use crate::tables::{PatternRule, TremoloTables};

pub fn elaborate(mut score: Score, tables: &TremoloTables) -> Score {
    let shorthand: Vec<Position> = score.settings.shorthand_positions.clone();

    for gongan_index in 0..score.gongans.len() {
        let beat_count = score.gongans[gongan_index].beat_count();
        for beat_index in 0..beat_count {
            let nominal = score.gongans[gongan_index].beat_length(beat_index);
            let gongan = &mut score.gongans[gongan_index];
            let Some(beat) = gongan.beats.get_mut(beat_index) else { continue };

            for (position, measure) in beat.measures.iter_mut() {
                measure.notes = expand_notes(&measure.notes, tables);
                if shorthand.contains(position) {
                    pad_to_length(measure, nominal);
                }
            }
        }
    }

    score
}

/// Expands every note bearing a tremolo-family modifier in place, leaving
/// plain notes untouched. Accelerating tremolo consumes its partner note
/// (the next note in the slice) when present, per §4.3's one- or
/// two-note rule.
fn expand_notes(notes: &[Note], tables: &TremoloTables) -> Vec<Note> {
    let mut expanded = Vec::with_capacity(notes.len());
    let mut i = 0;
    while i < notes.len() {
        let note = &notes[i];
        if note.modifiers.contains(&NoteModifier::Tremolo) {
            expanded.extend(expand_tremolo(note, tables));
            i += 1;
        } else if note.modifiers.contains(&NoteModifier::AcceleratingTremolo) {
            let partner = notes
                .get(i + 1)
                .filter(|n| n.modifiers.contains(&NoteModifier::AcceleratingTremolo));
            match partner {
                Some(partner) => {
                    expanded.extend(expand_accelerating_tremolo_pair(note, partner, tables));
                    i += 2;
                }
                None => {
                    expanded.extend(expand_accelerating_tremolo_single(note, tables));
                    i += 1;
                }
            }
        } else if let Some(tag) = pattern_tag(note) {
            match tables.patterns.get(tag) {
                Some(rule) if !rule.scale_steps.is_empty() => {
                    expanded.extend(expand_pattern(note, rule, tables));
                }
                _ => expanded.push(note.clone()),
            }
            i += 1;
        } else {
            expanded.push(note.clone());
            i += 1;
        }
    }
    expanded
}

fn pattern_tag(note: &Note) -> Option<&str> {
    note.modifiers.iter().find_map(|m| match m {
        NoteModifier::Pattern(tag) => Some(tag.as_str()),
        _ => None,
    })
}

/// Norot and similar ornaments (§4.3): cycles `rule.scale_steps` over the
/// base note's pitch at the tremolo repetition rate, each repetition
/// carrying an equal share of the note's total duration. Rests are left
/// untouched (the pattern has no pitch to offset).
fn expand_pattern(note: &Note, rule: &PatternRule, tables: &TremoloTables) -> Vec<Note> {
    let Some(base_pitch) = note.pitch else {
        return vec![note.clone()];
    };
    let total = note.total_duration();
    let count = repetition_count(total, tables.notes_per_quarternote).max(rule.scale_steps.len() as i64);
    let segment = total / Fraction::from(count as i64);
    (0..count)
        .map(|i| Note {
            pitch: Some(base_pitch.stepped(rule.scale_steps[(i as usize) % rule.scale_steps.len()])),
            stroke: note.stroke,
            duration: segment,
            rest_after: ZERO,
            modifiers: Vec::new(),
            velocity_override: None,
        })
        .collect()
}

/// Fixed-frequency tremolo (§4.3): `notes_per_quarternote * duration`
/// evenly spaced repetitions of the base pitch, summing to the original
/// note's total duration. Velocity is left unset so the prevailing
/// dynamics curve (applied during execution, §4.6) supplies it.
fn expand_tremolo(note: &Note, tables: &TremoloTables) -> Vec<Note> {
    let total = note.total_duration();
    let count = repetition_count(total, tables.notes_per_quarternote);
    if count <= 1 {
        return vec![note.clone()];
    }
    let segment = total / Fraction::from(count as i64);
    (0..count)
        .map(|_| Note {
            pitch: note.pitch,
            stroke: note.stroke,
            duration: segment,
            rest_after: ZERO,
            modifiers: Vec::new(),
            velocity_override: None,
        })
        .collect()
}

fn repetition_count(total: Fraction, notes_per_quarternote: u32) -> i64 {
    round_nearest(total * Fraction::from(notes_per_quarternote as i64)).max(1)
}

/// One base note bearing accelerating tremolo: emits the note once per
/// entry of `accelerating_pattern`, with the matching
/// `accelerating_velocity`, the whole expansion scaled to the note's own
/// total duration (§4.3).
fn expand_accelerating_tremolo_single(note: &Note, tables: &TremoloTables) -> Vec<Note> {
    expand_accelerating_tremolo(&[note.clone()], note.total_duration(), tables)
}

/// Two consecutive base notes: alternates `N1, N2, N1, N2, ...` across the
/// full (even-length) pattern, so the sequence ends on `N2`. The combined
/// duration of both source notes is what the pattern is scaled against.
fn expand_accelerating_tremolo_pair(first: &Note, second: &Note, tables: &TremoloTables) -> Vec<Note> {
    let total = first.total_duration() + second.total_duration();
    expand_accelerating_tremolo(&[first.clone(), second.clone()], total, tables)
}

fn expand_accelerating_tremolo(
    sources: &[Note],
    total: Fraction,
    tables: &TremoloTables,
) -> Vec<Note> {
    let pattern = &tables.accelerating_pattern;
    let velocity = &tables.accelerating_velocity;
    if pattern.is_empty() || pattern.len() != velocity.len() || pattern.len() % 2 != 0 {
        return sources.to_vec();
    }
    let pattern_sum: i64 = pattern.iter().map(|&v| v as i64).sum();
    if pattern_sum == 0 {
        return sources.to_vec();
    }
    pattern
        .iter()
        .zip(velocity.iter())
        .enumerate()
        .map(|(i, (&weight, &vel))| {
            let source = &sources[i % sources.len()];
            let share = total * Fraction::from(weight as i64) / Fraction::from(pattern_sum);
            Note {
                pitch: source.pitch,
                stroke: source.stroke,
                duration: share,
                rest_after: ZERO,
                modifiers: Vec::new(),
                velocity_override: Some(vel),
            }
        })
        .collect()
}

/// Pads a shorthand position's measure out to `nominal` by appending a
/// rest or a sustain extension of the last note, chosen by whether that
/// note's font-table definition gave it a natural trailing rest (§4.3).
fn pad_to_length(measure: &mut Measure, nominal: Fraction) {
    let current = measure.total_duration();
    let shortfall = nominal - current;
    if shortfall <= ZERO {
        return;
    }
    match measure.notes.last_mut() {
        Some(last) if !last.is_rest() && last.rest_after == ZERO => {
            last.duration = last.duration + shortfall;
        }
        Some(last) if !last.is_rest() => {
            last.rest_after = last.rest_after + shortfall;
        }
        _ => {
            measure.notes.push(Note::rest(shortfall));
        }
    }
}
