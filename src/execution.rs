//! # Execution linearization (stage 8, §4.6)
//!
//! Walks a completed, validated score in notational order (or the order
//! declared by a `SEQUENCE` directive) and produces an [`Execution`]: an
//! ordered list of `(gongan, beat, pass)` triples together with the
//! tempo and per-position dynamics in effect at each step. Interprets
//! `LABEL`/`GOTO` jumps and `REPEAT` persistence; detects cycles that make
//! no progress.

use std::collections::HashMap;

use crate::ast::{Keyword, MetadataDirective};
use crate::error::{Diagnostics, GamelanError};
use crate::score::{Pass, Position, Score};

#[derive(Debug, Clone)]
pub struct ExecutionStep {
    pub gongan: usize,
    pub beat: usize,
    pub pass: u32,
    pub tempo_bpm: u32,
    pub velocities: HashMap<Position, u8>,
    pub part_marker: Option<String>,
    pub silence_before_seconds: f64,
    pub silence_after_seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub steps: Vec<ExecutionStep>,
}

const DEFAULT_TEMPO: u32 = 60;
pub const DEFAULT_VELOCITY: u8 = 80;
/// A run that revisits more gongans than this without terminating is
/// treated as genuinely non-terminating rather than merely long; avoids
/// an unbounded loop when `loop_piece` masks a real authoring mistake.
const MAX_STEPS: usize = 1_000_000;

pub fn linearize(score: &Score, diag: &mut Diagnostics) -> Execution {
    let order = gongan_order(score);
    if order.is_empty() {
        return Execution::default();
    }

    let mut execution = Execution::default();
    let mut visit_count: HashMap<(usize, usize), u32> = HashMap::new();
    let mut repeat_remaining: HashMap<usize, u32> = HashMap::new();
    let mut repeat_span_start: HashMap<(usize, usize), u32> = HashMap::new();
    let mut current_tempo = DEFAULT_TEMPO;
    let mut current_velocity: HashMap<Position, u8> = HashMap::new();
    let mut last_step: Option<(usize, usize, u32)> = None;

    let mut seg = 0usize;
    let mut cursor: Option<(usize, usize)> = None;

    'walk: loop {
        if cursor.is_none() && seg >= order.len() {
            break;
        }
        let (gongan_index, start_beat) = cursor.take().unwrap_or((order[seg], 0));
        if cursor_is_fresh_arrival(start_beat) {
            if let Some(count) = repeat_count_of(score, gongan_index) {
                if count < 1 {
                    diag.push_error(GamelanError::RepeatCountInvalid { count: count as i64 });
                } else {
                    repeat_remaining.insert(gongan_index, count);
                }
            }
        }

        let beat_count = score.gongans[gongan_index].beats.len();
        let mut beat_index = start_beat;
        let mut jumped = false;

        while beat_index < beat_count {
            let visits = visit_count.entry((gongan_index, beat_index)).or_insert(0);
            *visits += 1;
            let pass = *visits;

            if last_step == Some((gongan_index, beat_index, pass)) {
                diag.push_error(GamelanError::DivergentFlow { gongan: gongan_index, beat: beat_index, pass });
                break 'walk;
            }
            last_step = Some((gongan_index, beat_index, pass));

            let tempo = resolve_tempo(score, gongan_index, beat_index, pass, current_tempo, &mut repeat_span_start);
            current_tempo = tempo;
            let velocities = resolve_dynamics(score, gongan_index, beat_index, pass, &mut current_velocity);

            let part_marker = if beat_index == 0 {
                score.gongans[gongan_index].part_name.clone()
            } else {
                None
            };

            let (before, after) = wait_seconds(score, gongan_index, pass, beat_index, beat_count);

            execution.steps.push(ExecutionStep {
                gongan: gongan_index,
                beat: beat_index,
                pass,
                tempo_bpm: tempo,
                velocities,
                part_marker,
                silence_before_seconds: before,
                silence_after_seconds: after,
            });

            if execution.steps.len() > MAX_STEPS {
                diag.push_error(GamelanError::DivergentFlow { gongan: gongan_index, beat: beat_index, pass });
                break 'walk;
            }

            if let Some(target) = goto_target(score, gongan_index, beat_index, pass, diag) {
                cursor = Some(target);
                seg = order_index_of(&order, target.0).unwrap_or(seg);
                jumped = true;
                break;
            }

            beat_index += 1;
        }

        if jumped {
            continue;
        }

        if let Some(remaining) = repeat_remaining.get_mut(&gongan_index) {
            if *remaining > 1 {
                *remaining -= 1;
                cursor = Some((gongan_index, 0));
                continue;
            }
        }

        seg += 1;
    }

    execution
}

fn cursor_is_fresh_arrival(start_beat: usize) -> bool {
    start_beat == 0
}

/// The walk order over gongans: the `SEQUENCE` directive's label list when
/// present (unbound-block only, §4.6), otherwise notational order.
fn gongan_order(score: &Score) -> Vec<usize> {
    match &score.settings.sequence {
        Some(labels) => labels
            .iter()
            .filter_map(|label| score.label_target(label).map(|(g, _)| g))
            .collect(),
        None => (0..score.gongans.len()).collect(),
    }
}

fn order_index_of(order: &[usize], gongan_index: usize) -> Option<usize> {
    order.iter().position(|&g| g == gongan_index)
}

fn repeat_count_of(score: &Score, gongan_index: usize) -> Option<u32> {
    score.gongans[gongan_index]
        .directives
        .iter()
        .find(|d| d.keyword == Keyword::Repeat)
        .and_then(|d| d.get_int("count"))
        .map(|c| c.max(0) as u32)
}

fn goto_target(
    score: &Score,
    gongan_index: usize,
    beat_index: usize,
    pass: u32,
    diag: &mut Diagnostics,
) -> Option<(usize, usize)> {
    let gongan = &score.gongans[gongan_index];
    let last_beat0 = gongan.beats.len().saturating_sub(1);
    for directive in &gongan.directives {
        if directive.keyword != Keyword::Goto {
            continue;
        }
        let from_beat0 = directive.get_int("from_beat").map(|b| (b.max(1) as usize) - 1).unwrap_or(last_beat0);
        if from_beat0 != beat_index {
            continue;
        }
        let passes = directive_passes(directive);
        if !passes.matches(pass) {
            continue;
        }
        let Some(label) = directive.get_str("label") else { continue };
        if score.unbound_labels.contains(label) {
            diag.push_error(GamelanError::GotoTargetInUnbound { label: label.to_string() });
            continue;
        }
        match score.label_target(label) {
            Some(target) => return Some(target),
            None => {
                diag.push_error(GamelanError::UndefinedLabelReference { label: label.to_string() });
            }
        }
    }
    None
}

fn directive_passes(directive: &MetadataDirective) -> Pass {
    match directive.get_passes("passes") {
        Some(list) if list.is_empty() => Pass::All,
        Some(list) if list.len() == 1 => Pass::Single(list[0]),
        Some(list) => Pass::Range(*list.iter().min().unwrap(), *list.iter().max().unwrap()),
        None => Pass::All,
    }
}

/// Resolves the effective tempo at one step: the last (in declaration
/// order) `TEMPO` directive on this gongan whose span covers this beat
/// and pass wins; linear interpolation for a finite span, flat for an
/// open-ended one (§4.6).
fn resolve_tempo(
    score: &Score,
    gongan_index: usize,
    beat_index: usize,
    pass: u32,
    current_tempo: u32,
    span_start: &mut HashMap<(usize, usize), u32>,
) -> u32 {
    let gongan = &score.gongans[gongan_index];
    let mut resolved = current_tempo;
    for (i, directive) in gongan.directives.iter().enumerate() {
        if directive.keyword != Keyword::Tempo {
            continue;
        }
        if !directive_passes(directive).matches(pass) {
            continue;
        }
        let Some(value) = directive.get_int("value") else { continue };
        let first_beat0 = directive.get_int("first_beat").map(|b| (b.max(1) as usize) - 1).unwrap_or(0);
        let beat_count = directive.get_int("beat_count").unwrap_or(0).max(0) as usize;
        if beat_index < first_beat0 {
            continue;
        }
        if beat_count > 0 && beat_index > first_beat0 + beat_count - 1 {
            continue;
        }
        let key = (gongan_index, i);
        if beat_index == first_beat0 {
            span_start.insert(key, resolved);
        }
        let start_value = *span_start.get(&key).unwrap_or(&resolved);
        resolved = if beat_count <= 1 {
            value as u32
        } else {
            let position = beat_index - first_beat0;
            if position >= beat_count - 1 {
                value as u32
            } else {
                let numerator = (value as i64 - start_value as i64) * position as i64;
                (start_value as i64 + numerator / (beat_count as i64 - 1)) as u32
            }
        };
    }
    resolved
}

/// Same propagation shape as tempo, per position (§4.6).
fn resolve_dynamics(
    score: &Score,
    gongan_index: usize,
    beat_index: usize,
    pass: u32,
    current_velocity: &mut HashMap<Position, u8>,
) -> HashMap<Position, u8> {
    let gongan = &score.gongans[gongan_index];
    for directive in &gongan.directives {
        if directive.keyword != Keyword::Dynamics {
            continue;
        }
        if !directive_passes(directive).matches(pass) {
            continue;
        }
        let Some(name) = directive.get_str("value") else { continue };
        let Some(&target) = score.settings.dynamics.get(name) else { continue };
        let first_beat0 = directive.get_int("first_beat").map(|b| (b.max(1) as usize) - 1).unwrap_or(0);
        let beat_count = directive.get_int("beat_count").unwrap_or(0).max(0) as usize;
        if beat_index < first_beat0 {
            continue;
        }
        if beat_count > 0 && beat_index > first_beat0 + beat_count - 1 {
            continue;
        }
        let positions: Vec<Position> = match directive.get_list("positions") {
            Some(list) => list.iter().map(|s| Position::new(s.clone())).collect(),
            None => score.gongans[gongan_index].beats[beat_index].measures.keys().cloned().collect(),
        };
        for position in positions {
            let start = *current_velocity.get(&position).unwrap_or(&DEFAULT_VELOCITY);
            let value = if beat_count <= 1 {
                target
            } else {
                let position_in_span = beat_index - first_beat0;
                if position_in_span >= beat_count - 1 {
                    target
                } else {
                    let numerator = (target as i32 - start as i32) * position_in_span as i32;
                    (start as i32 + numerator / (beat_count as i32 - 1)) as u8
                }
            };
            current_velocity.insert(position, value);
        }
    }
    current_velocity.clone()
}

fn wait_seconds(score: &Score, gongan_index: usize, pass: u32, beat_index: usize, beat_count: usize) -> (f64, f64) {
    let mut before = 0.0;
    let mut after = 0.0;
    for wait in &score.waits {
        if wait.gongan_index != gongan_index || !wait.passes.matches(pass) {
            continue;
        }
        if wait.after && beat_index == beat_count.saturating_sub(1) {
            after += wait.seconds;
        } else if !wait.after && beat_index == 0 {
            before += wait.seconds;
        }
    }
    (before, after)
}
