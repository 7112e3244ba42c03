//! # Core score entities
//!
//! Types shared by every stage from score construction onward: pitches,
//! positions, notes, measures, beats, gongans, and the score itself.
//! Entities are created in stage order and never mutated afterward — each
//! stage produces a new `Score` value (§3, §9 "Immutable staged
//! artifacts").

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::fraction::Fraction;

/// The five tones of the notation's pitch system (pelog/slendro selisir
/// naming). A rest is represented at the `Note` level (`pitch: None`), not
/// as a sixth `Pitch` variant, so that "is this a rest" is a single `match`
/// rather than a wildcard arm sprinkled through every pitch-aware check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Pitch {
    Ding,
    Dong,
    Deng,
    Dung,
    Dang,
}

impl Pitch {
    const ORDER: [Pitch; 5] = [Pitch::Ding, Pitch::Dong, Pitch::Deng, Pitch::Dung, Pitch::Dang];

    fn scale_index(self) -> i64 {
        Self::ORDER.iter().position(|&p| p == self).unwrap() as i64
    }

    fn from_scale_index(index: i64) -> Pitch {
        Self::ORDER[index.rem_euclid(5) as usize]
    }
}

/// A pitch at a specific relative octave. Octave 0 is the instrument's
/// central octave; negative/positive values shift down/up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PitchOctave {
    pub pitch: Pitch,
    pub octave: i8,
}

impl PitchOctave {
    pub fn new(pitch: Pitch, octave: i8) -> Self {
        Self { pitch, octave }
    }

    pub fn shifted(self, delta: i8) -> Self {
        Self {
            pitch: self.pitch,
            octave: self.octave + delta,
        }
    }

    /// Moves `steps` scale degrees up (positive) or down (negative) within
    /// the five-tone system, carrying into the adjacent octave when the
    /// step count crosses `Dang`/`Ding` (used by norot/ornament pattern
    /// elaboration, §4.3, to express a neighbor-tone offset rather than a
    /// full octave shift).
    pub fn stepped(self, steps: i8) -> Self {
        let raw = self.pitch.scale_index() + steps as i64;
        let octave_delta = raw.div_euclid(5);
        Self {
            pitch: Pitch::from_scale_index(raw),
            octave: self.octave + octave_delta as i8,
        }
    }
}

/// Articulation class selecting which MIDI note/sample a stroke maps to
/// (§3, MIDI notes table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stroke {
    Open,
    Muted,
    Abbreviated,
}

/// A distinct musical voice: a polos/sangsih pair member, or a physical
/// player position such as `reyong_1`. Positions are data (rows of the
/// instruments table), not a closed enum, since the set varies by
/// instrument group and ensemble.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Position(pub String);

impl Position {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ensemble type, e.g. "gong kebyar", "semar pagulingan". Like
/// `Position`, this is data rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct InstrumentGroup(pub String);

impl InstrumentGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Open-ended note modifier tags left on a note after parsing, consumed by
/// pattern elaboration (§4.3). `Pattern` keys into the elaboration rule
/// table so new ornaments extend data, not the elaborator's code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoteModifier {
    Tremolo,
    AcceleratingTremolo,
    Pattern(String),
}

/// A single musical atom. A rest is a note with `pitch: None`, `duration:
/// 0`, `rest_after: 1` (§3).
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: Option<PitchOctave>,
    pub stroke: Stroke,
    pub duration: Fraction,
    pub rest_after: Fraction,
    pub modifiers: Vec<NoteModifier>,
    /// Overrides the prevailing dynamics-curve velocity for this one note.
    /// Only accelerating tremolo sets this (§4.3); every other note takes
    /// its velocity from the execution's dynamics curve.
    pub velocity_override: Option<u8>,
}

impl Note {
    pub fn rest(duration_of_beat: Fraction) -> Self {
        Self {
            pitch: None,
            stroke: Stroke::Open,
            duration: crate::fraction::ZERO,
            rest_after: duration_of_beat,
            modifiers: Vec::new(),
            velocity_override: None,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }

    pub fn total_duration(&self) -> Fraction {
        self.duration + self.rest_after
    }
}

/// Which passes a measure or directive applies to. `:1-` (no upper bound)
/// is deliberately rejected at parse time rather than accepted, resolving
/// Open Question (b) of `SPEC_FULL.md` §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    All,
    Single(u32),
    Range(u32, u32),
}

impl Default for Pass {
    fn default() -> Self {
        Pass::All
    }
}

impl Pass {
    pub fn matches(&self, pass: u32) -> bool {
        match self {
            Pass::All => true,
            Pass::Single(p) => *p == pass,
            Pass::Range(lo, hi) => pass >= *lo && pass <= *hi,
        }
    }
}

/// The checks that `VALIDATION ignore=[...]` can suppress (§4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCheck {
    BeatDuration,
    StaveLength,
    InstrumentRange,
    Kempyung,
}

/// A sequence of notes assigned to one (position, beat) cell.
#[derive(Debug, Clone)]
pub struct Measure {
    pub notes: Vec<Note>,
    pub pass: Pass,
    pub suppressed: bool,
    pub validation_ignore: Vec<ValidationCheck>,
}

impl Measure {
    pub fn new(notes: Vec<Note>) -> Self {
        Self {
            notes,
            pass: Pass::All,
            suppressed: false,
            validation_ignore: Vec::new(),
        }
    }

    pub fn rest_spanning(duration: Fraction) -> Self {
        Self::new(vec![Note::rest(duration)])
    }

    pub fn total_duration(&self) -> Fraction {
        self.notes.iter().map(Note::total_duration).sum()
    }

    pub fn ignores(&self, check: ValidationCheck) -> bool {
        self.validation_ignore.contains(&check)
    }
}

/// One coordinate within a gongan: a measure per position.
#[derive(Debug, Clone, Default)]
pub struct Beat {
    pub measures: BTreeMap<Position, Measure>,
}

impl Beat {
    pub fn measure(&self, position: &Position) -> Option<&Measure> {
        self.measures.get(position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GonganType {
    Regular,
    Kebyar,
    Gineman,
}

impl Default for GonganType {
    fn default() -> Self {
        GonganType::Regular
    }
}

/// A `SUPPRESS` directive materialized onto its gongan at completion
/// time (§4.4): silences the named positions for the given beats and
/// passes. Kept as structured data rather than collapsed into a single
/// `Measure::suppressed` flag, since suppression can be pass-specific and
/// one `Measure` value is shared across every pass that visits it.
#[derive(Debug, Clone)]
pub struct Suppression {
    pub positions: Vec<Position>,
    pub beats: Option<Vec<usize>>,
    pub passes: Pass,
}

impl Suppression {
    pub fn applies(&self, position: &Position, beat_index: usize, pass: u32) -> bool {
        self.positions.contains(position)
            && self.beats.as_ref().map_or(true, |beats| beats.contains(&beat_index))
            && self.passes.matches(pass)
    }
}

/// A `WAIT` directive materialized at completion time (§4.4): a silence
/// inserted before or after a gongan's visit during execution.
#[derive(Debug, Clone, Copy)]
pub struct WaitEntry {
    pub gongan_index: usize,
    pub seconds: f64,
    pub after: bool,
    pub passes: Pass,
}

/// A section terminated by a gong stroke (§3, Glossary).
#[derive(Debug, Clone, Default)]
pub struct Gongan {
    pub gongan_type: GonganType,
    pub beats: Vec<Beat>,
    /// Set by a `{GONGAN beat_at_end=...}`-style flag in the source;
    /// rotates each measure's notes right by one beat so the gong lands on
    /// the next gongan's first beat (§4.4).
    pub beat_at_end: bool,
    /// Metadata directives attached to this gongan (TEMPO, DYNAMICS,
    /// GOTO, REPEAT, KEMPLI, OCTAVATE, SUPPRESS, PART, VALIDATION, WAIT).
    pub directives: Vec<crate::ast::MetadataDirective>,
    /// Materialized `SUPPRESS` directives for this gongan.
    pub suppressions: Vec<Suppression>,
    /// Materialized `KEMPLI` on/off state, by beat index (0-based).
    /// Beats absent from the map inherit the ambient state (on, by
    /// default, unless a `scope=SCORE` directive elsewhere turned it off).
    pub kempli: BTreeMap<usize, bool>,
    /// `PART` directive's marker name, always attached to this gongan's
    /// first beat per §4.4.
    pub part_name: Option<String>,
    /// Validation checks suppressed for this gongan by a `scope=GONGAN`
    /// `VALIDATION` directive.
    pub validation_ignore: Vec<ValidationCheck>,
}

impl Gongan {
    pub fn beat_count(&self) -> usize {
        self.beats.len()
    }

    /// The expected total duration of a beat: the longest measure already
    /// present at that index. Positions with no measure yet (stage 6) or
    /// shorthand positions padding to fill out their cell (stage 5) both
    /// pad to this length. Defaults to one base note when the beat has no
    /// measures at all.
    pub fn beat_length(&self, beat_index: usize) -> Fraction {
        self.beats
            .get(beat_index)
            .and_then(|beat| beat.measures.values().map(Measure::total_duration).max())
            .unwrap_or(crate::fraction::ONE)
    }

    /// Whether the implicit kempli track strikes at this beat: on by
    /// default, off only where a materialized `KEMPLI` directive (§4.4)
    /// says so for this beat.
    pub fn kempli_on(&self, beat_index: usize) -> bool {
        *self.kempli.get(&beat_index).unwrap_or(&true)
    }
}

/// Tremolo/ornament tables live on `ScoreSettings` rather than being
/// re-threaded as a separate argument through every elaboration call.
#[derive(Debug, Clone, Default)]
pub struct ScoreSettings {
    pub ppq: u16,
    pub base_note_time: u32,
    pub dynamics: HashMap<String, u8>,
    pub shorthand_positions: Vec<Position>,
    /// The `SEQUENCE` directive's gongan-label ordering, valid only when
    /// declared in the unbound block preceding all gongans (§4.6).
    pub sequence: Option<Vec<String>>,
    pub silence_seconds_before_start: f64,
    pub silence_seconds_after_end: f64,
    pub loop_piece: bool,
    /// Validation checks suppressed score-wide by a `scope=SCORE`
    /// `VALIDATION` directive.
    pub validation_ignore: Vec<ValidationCheck>,
    /// MIDI note struck on the kempli/marker track at every beat the
    /// implicit kempli track is on for (§4.4, §4.7).
    pub kempli_note: u8,
    pub kempli_velocity: u8,
}

/// A complete, immutable musical score (§3).
#[derive(Debug, Clone, Default)]
pub struct Score {
    pub instrument_group: InstrumentGroup,
    pub font_version: String,
    pub gongans: Vec<Gongan>,
    /// name -> (gongan_index, beat_index); built once during construction
    /// and never mutated (§9, "cyclic references... never embed
    /// back-pointers").
    pub labels: HashMap<String, (usize, usize)>,
    /// Names declared by a `LABEL` directive in the unbound block
    /// preceding all gongans. These have no `(gongan, beat)` coordinate;
    /// a `GOTO` referencing one is a `GotoTargetInUnbound` error (§4.6,
    /// §7), not a silent no-op.
    pub unbound_labels: HashSet<String>,
    pub settings: ScoreSettings,
    /// `WAIT` directives materialized at completion time, consulted by
    /// execution linearization (§4.4, §4.6).
    pub waits: Vec<WaitEntry>,
}

impl Score {
    pub fn label_target(&self, name: &str) -> Option<(usize, usize)> {
        self.labels.get(name).copied()
    }
}
