//! # MIDI emission (stage 9, §4.7)
//!
//! Serializes an [`Execution`] into a standard MIDI file, format 1: one
//! track for tempo/markers/kempli, one track per active instrument
//! position. Grounded on `other_examples`' `symi` MIDI writer
//! (`export_smf_format1`): absolute-tick events collected per track, then
//! sorted `(tick, priority)` and converted to delta time in one pass —
//! generalized here from that writer's note-group layout to our simpler
//! one-position-per-track model. `midly` supplies the binary SMF codec.

use std::collections::HashMap;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::{Diagnostics, GamelanError};
use crate::execution::{Execution, DEFAULT_VELOCITY};
use crate::fraction::to_ticks;
use crate::score::{Position, Score, Stroke};
use crate::tables::ReferenceTables;

/// One micro-priority per event kind, enforcing §5's canonical same-tick
/// ordering: note-off sorts before note-on at an identical tick.
const PRIORITY_META: u8 = 0;
const PRIORITY_NOTE_OFF: u8 = 1;
const PRIORITY_NOTE_ON: u8 = 2;

/// Natural-release tail appended to the last sounding note of each
/// position when the piece does not loop (§4.7).
const RELEASE_TICKS: i64 = 4;

struct AbsEvent {
    tick: i64,
    priority: u8,
    kind: TrackEventKind<'static>,
}

pub fn emit(score: &Score, execution: &Execution, tables: &ReferenceTables, diag: &mut Diagnostics) -> Vec<u8> {
    let ppq = score.settings.ppq.max(1);
    let base_note_time = score.settings.base_note_time.max(1);
    let group = score.instrument_group.clone();

    let mut positions: Vec<Position> = tables
        .instruments
        .entries
        .keys()
        .filter(|key| key.0 == group)
        .map(|key| key.1.clone())
        .collect();
    positions.sort();

    let seconds_before = score.settings.silence_seconds_before_start.max(0.0);
    let seconds_after = score.settings.silence_seconds_after_end.max(0.0);
    let initial_tempo = execution.steps.first().map(|s| s.tempo_bpm).unwrap_or(60);
    let lead_in_ticks = seconds_to_ticks(seconds_before, initial_tempo, ppq);

    let meta_track = build_meta_track(score, execution, base_note_time, ppq, lead_in_ticks);

    let mut tracks = vec![meta_track];
    for position in &positions {
        let preset = tables.midi_notes.preset_for(&group, &instrument_type_of(tables, &group, position));
        tracks.push(build_position_track(
            score,
            execution,
            tables,
            &group,
            position,
            base_note_time,
            ppq,
            lead_in_ticks,
            seconds_after,
            preset.map(|p| (p.bank_msb, p.program)),
            diag,
        ));
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::new(ppq)),
        },
        tracks,
    };

    let mut buffer = Vec::new();
    if let Err(err) = smf.write_std(&mut buffer) {
        diag.push_error(GamelanError::OutputFileWriteError {
            path: "<in-memory>".to_string(),
            message: err.to_string(),
        });
    }
    buffer
}

fn instrument_type_of(tables: &ReferenceTables, group: &crate::score::InstrumentGroup, position: &Position) -> String {
    tables
        .instruments
        .get(group, position)
        .map(|entry| entry.instrument_type.clone())
        .unwrap_or_default()
}

/// MIDI channel the implicit kempli track strikes on — General MIDI's
/// percussion channel, since the kempli note is a struck idiophone beat
/// marker rather than a melodic voice.
const KEMPLI_CHANNEL: u8 = 9;
/// Duration of one kempli stroke, short enough never to bleed into the
/// next beat's.
const KEMPLI_STROKE_TICKS: i64 = 4;

/// Track 0: `SET_TEMPO` whenever the effective tempo changes between
/// consecutive steps, a `MARKER` at any step carrying a `PART` name, and a
/// kempli stroke at every beat the implicit kempli track is on for (§4.4,
/// §4.7 "one track for kempli/markers").
fn build_meta_track(
    score: &Score,
    execution: &Execution,
    base_note_time: u32,
    ppq: u16,
    lead_in_ticks: i64,
) -> Vec<TrackEvent<'static>> {
    let mut events = Vec::new();
    let mut tick = lead_in_ticks;
    let mut last_tempo: Option<u32> = None;
    let channel = u4::new(KEMPLI_CHANNEL);

    for step in &execution.steps {
        if last_tempo != Some(step.tempo_bpm) {
            let mpq = 60_000_000u32.checked_div(step.tempo_bpm.max(1)).unwrap_or(500_000);
            events.push(AbsEvent {
                tick,
                priority: PRIORITY_META,
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(mpq))),
            });
            last_tempo = Some(step.tempo_bpm);
        }
        if let Some(name) = &step.part_marker {
            events.push(AbsEvent {
                tick,
                priority: PRIORITY_META,
                kind: TrackEventKind::Meta(MetaMessage::Marker(name.as_bytes())),
            });
        }

        let beat_duration_ticks = score
            .gongans
            .get(step.gongan)
            .map(|gongan| to_ticks(gongan.beat_length(step.beat), base_note_time))
            .unwrap_or(0);

        let kempli_on = score.gongans.get(step.gongan).map(|gongan| gongan.kempli_on(step.beat)).unwrap_or(true);
        if kempli_on {
            let note = u7::new(score.settings.kempli_note.min(127));
            let velocity = u7::new(score.settings.kempli_velocity.min(127));
            events.push(AbsEvent {
                tick,
                priority: PRIORITY_NOTE_ON,
                kind: TrackEventKind::Midi { channel, message: MidiMessage::NoteOn { key: note, vel: velocity } },
            });
            events.push(AbsEvent {
                tick: tick + KEMPLI_STROKE_TICKS.min(beat_duration_ticks.max(1)),
                priority: PRIORITY_NOTE_OFF,
                kind: TrackEventKind::Midi { channel, message: MidiMessage::NoteOff { key: note, vel: u7::new(0) } },
            });
        }

        tick += beat_duration_ticks + seconds_to_ticks(step.silence_before_seconds + step.silence_after_seconds, step.tempo_bpm, ppq);
    }

    to_delta_track(events, 0)
}

#[allow(clippy::too_many_arguments)]
fn build_position_track(
    score: &Score,
    execution: &Execution,
    tables: &ReferenceTables,
    group: &crate::score::InstrumentGroup,
    position: &Position,
    base_note_time: u32,
    ppq: u16,
    lead_in_ticks: i64,
    seconds_after: f64,
    preset: Option<(u8, u8)>,
    diag: &mut Diagnostics,
) -> Vec<TrackEvent<'static>> {
    let channel = u4::new((position_index(tables, group, position) % 16) as u8);
    let mut events = Vec::new();

    if let Some((bank_msb, program)) = preset {
        events.push(AbsEvent {
            tick: 0,
            priority: PRIORITY_META,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::Controller { controller: u7::new(0), value: u7::new(bank_msb) },
            },
        });
        events.push(AbsEvent {
            tick: 0,
            priority: PRIORITY_META,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange { program: u7::new(program) },
            },
        });
    }

    let mut tick = lead_in_ticks;
    let mut last_note_off_tick = tick;

    for step in &execution.steps {
        let Some(gongan) = score.gongans.get(step.gongan) else { continue };
        let Some(beat) = gongan.beats.get(step.beat) else { continue };
        let Some(measure) = beat.measure(position) else { continue };

        let suppressed = measure.suppressed
            || gongan.suppressions.iter().any(|s| s.applies(position, step.beat, step.pass));
        let pass_applies = measure.pass.matches(step.pass);

        if suppressed || !pass_applies {
            tick += to_ticks(measure.total_duration(), base_note_time);
            continue;
        }

        for note in &measure.notes {
            let duration_ticks = to_ticks(note.duration, base_note_time);
            let rest_ticks = to_ticks(note.rest_after, base_note_time);

            if note.is_rest() || duration_ticks <= 0 {
                tick += duration_ticks.max(0) + rest_ticks.max(0);
                continue;
            }

            let Some(pitch_octave) = note.pitch else { continue };
            let velocity = note.velocity_override.unwrap_or_else(|| step.velocities.get(position).copied().unwrap_or(DEFAULT_VELOCITY));
            let Some(midi_note) = tables.midi_notes.note_for(
                group,
                &instrument_type_of(tables, group, position),
                position,
                pitch_octave,
                note.stroke,
            ) else {
                diag.push_warning(format!(
                    "no MIDI note mapping for position '{position}', pitch {pitch_octave:?}, stroke {:?}",
                    note.stroke
                ));
                tick += duration_ticks + rest_ticks.max(0);
                continue;
            };

            let note_on_tick = tick;
            let note_off_tick = tick + duration_ticks;
            events.push(AbsEvent {
                tick: note_on_tick,
                priority: PRIORITY_NOTE_ON,
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { key: u7::new(midi_note), vel: u7::new(velocity.min(127)) },
                },
            });
            events.push(AbsEvent {
                tick: note_off_tick,
                priority: PRIORITY_NOTE_OFF,
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff { key: u7::new(midi_note), vel: u7::new(0) },
                },
            });
            last_note_off_tick = note_off_tick;
            tick = note_off_tick + rest_ticks.max(0);
        }

        tick += seconds_to_ticks(step.silence_before_seconds + step.silence_after_seconds, step.tempo_bpm, ppq);
    }

    if !score.settings.loop_piece {
        for event in events.iter_mut() {
            if event.tick == last_note_off_tick && event.priority == PRIORITY_NOTE_OFF {
                event.tick += RELEASE_TICKS;
            }
        }
        tick = last_note_off_tick + RELEASE_TICKS;
    }

    let final_tempo = execution.steps.last().map(|s| s.tempo_bpm).unwrap_or(60);
    let trailing_ticks = seconds_to_ticks(seconds_after, final_tempo, ppq);

    to_delta_track(events, trailing_ticks)
}

fn position_index(tables: &ReferenceTables, group: &crate::score::InstrumentGroup, position: &Position) -> usize {
    let mut positions: Vec<&Position> = tables
        .instruments
        .entries
        .keys()
        .filter(|key| &key.0 == group)
        .map(|key| &key.1)
        .collect();
    positions.sort();
    positions.iter().position(|p| *p == position).unwrap_or(0)
}

fn seconds_to_ticks(seconds: f64, tempo_bpm: u32, ppq: u16) -> i64 {
    if seconds <= 0.0 {
        return 0;
    }
    let ticks_per_second = (tempo_bpm as f64 / 60.0) * ppq as f64;
    (seconds * ticks_per_second).round() as i64
}

fn to_delta_track(mut events: Vec<AbsEvent>, trailing_ticks: i64) -> Vec<TrackEvent<'static>> {
    events.sort_by(|a, b| a.tick.cmp(&b.tick).then_with(|| a.priority.cmp(&b.priority)));
    let mut out = Vec::with_capacity(events.len() + 1);
    let mut cursor = 0i64;
    for event in events {
        let delta = (event.tick - cursor).max(0).min(0x0FFF_FFFF) as u32;
        out.push(TrackEvent { delta: u28::new(delta), kind: event.kind });
        cursor = event.tick;
    }
    let end_delta = trailing_ticks.max(0).min(0x0FFF_FFFF) as u32;
    out.push(TrackEvent { delta: u28::new(end_delta), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionStep;
    use crate::fraction::ONE;
    use crate::score::{Beat, Gongan, InstrumentGroup, Measure, Note, PitchOctave, Pitch};
    use crate::tables::{InstrumentEntry, InstrumentRange, InstrumentsTable, MidiNoteKey, MidiNotesTable, MidiPreset};

    fn one_position_score() -> (Score, ReferenceTables) {
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

        let mut midi_notes = MidiNotesTable::default();
        midi_notes.notes.insert(
            MidiNoteKey {
                instrument_group: group.clone(),
                instrument_type: "gangsa".to_string(),
                positions: None,
                pitch_octave: PitchOctave::new(Pitch::Dong, 0),
                stroke: Stroke::Open,
            },
            60,
        );
        midi_notes.presets.insert((group.clone(), "gangsa".to_string()), MidiPreset { bank_msb: 0, program: 12 });

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

        let mut score = Score { instrument_group: group, ..Default::default() };
        score.settings.ppq = 96;
        score.settings.base_note_time = 24;
        score.settings.kempli_note = 76;
        score.settings.kempli_velocity = 90;
        score.gongans.push(Gongan { beats: vec![beat], ..Default::default() });

        (score, ReferenceTables { instruments, midi_notes, ..Default::default() })
    }

    #[test]
    fn emits_note_on_and_off_for_one_step() {
        let (score, tables) = one_position_score();
        let execution = Execution {
            steps: vec![ExecutionStep {
                gongan: 0,
                beat: 0,
                pass: 1,
                tempo_bpm: 120,
                velocities: HashMap::new(),
                part_marker: None,
                silence_before_seconds: 0.0,
                silence_after_seconds: 0.0,
            }],
        };
        let mut diag = Diagnostics::new();
        let bytes = emit(&score, &execution, &tables, &mut diag);
        assert!(!bytes.is_empty());
        assert!(bytes.starts_with(b"MThd"));
    }

    #[test]
    fn kempli_on_beat_strikes_the_configured_note_on_the_meta_track() {
        let (score, tables) = one_position_score();
        let execution = Execution {
            steps: vec![ExecutionStep {
                gongan: 0,
                beat: 0,
                pass: 1,
                tempo_bpm: 120,
                velocities: HashMap::new(),
                part_marker: None,
                silence_before_seconds: 0.0,
                silence_after_seconds: 0.0,
            }],
        };
        let meta_track = build_meta_track(&score, &execution, 24, 96, 0);
        let struck = meta_track.iter().any(|event| {
            matches!(
                event.kind,
                TrackEventKind::Midi { channel, message: MidiMessage::NoteOn { key, vel } }
                    if channel == u4::new(KEMPLI_CHANNEL) && key == u7::new(76) && vel == u7::new(90)
            )
        });
        assert!(struck);
    }

    #[test]
    fn kempli_off_beat_emits_no_stroke() {
        let (mut score, _tables) = one_position_score();
        score.gongans[0].kempli.insert(0, false);
        let execution = Execution {
            steps: vec![ExecutionStep {
                gongan: 0,
                beat: 0,
                pass: 1,
                tempo_bpm: 120,
                velocities: HashMap::new(),
                part_marker: None,
                silence_before_seconds: 0.0,
                silence_after_seconds: 0.0,
            }],
        };
        let meta_track = build_meta_track(&score, &execution, 24, 96, 0);
        let struck = meta_track.iter().any(|event| matches!(event.kind, TrackEventKind::Midi { channel, .. } if channel == u4::new(KEMPLI_CHANNEL)));
        assert!(!struck);
    }
}
