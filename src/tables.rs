//! # Reference tables
//!
//! The font table, instruments table, tag-to-positions table, rules table,
//! and MIDI notes table are read-only lookup data supplied by the caller
//! (normally loaded from TSV files by code outside this crate — see
//! `SPEC_FULL.md` §6). This module only defines the shapes those tables
//! must have; it performs no file I/O.

use std::collections::HashMap;

use crate::fraction::Fraction;
use crate::score::{InstrumentGroup, Pitch, PitchOctave, Position, Stroke};

/// What a single font symbol means: either a playable note (pitch, octave,
/// stroke) or a combining modifier that attaches to the preceding note.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FontSymbolKind {
    Note { pitch_octave: PitchOctave, stroke: Stroke },
    Rest,
    Modifier(ModifierKind),
}

/// Open-ended modifier vocabulary. `Pattern` carries a key into the
/// elaboration rule table (see `elaboration.rs`) rather than being a fixed
/// enum, so new ornaments are added by extending data, not by touching the
/// elaborator — per the design notes in `SPEC_FULL.md` §4.3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModifierKind {
    OctaveShift(i8),
    Mute,
    Tremolo,
    AcceleratingTremolo,
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FontEntry {
    pub code_point: char,
    pub kind: FontSymbolKind,
    /// Audible duration, as a fraction of one base note. Meaningless for
    /// combining modifiers.
    pub duration: Fraction,
    /// Trailing rest, as a fraction of one base note.
    pub rest_after: Fraction,
    pub is_combining: bool,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FontTable {
    pub entries: HashMap<char, FontEntry>,
}

impl FontTable {
    pub fn get(&self, code_point: char) -> Option<&FontEntry> {
        self.entries.get(&code_point)
    }
}

/// A position's playable pitch/octave range: a nominal range used for
/// ordinary notation and an extended range used as an out-of-range
/// fallback (§4.2, `SAME_PITCH_EXTENDED_RANGE`).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InstrumentRange {
    pub nominal: Vec<PitchOctave>,
    pub extended: Vec<PitchOctave>,
}

impl InstrumentRange {
    pub fn contains_nominal(&self, po: PitchOctave) -> bool {
        self.nominal.contains(&po)
    }

    pub fn contains_extended(&self, po: PitchOctave) -> bool {
        self.extended.contains(&po)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InstrumentEntry {
    pub instrument_type: String,
    pub range: InstrumentRange,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InstrumentsTable {
    pub entries: HashMap<(InstrumentGroup, Position), InstrumentEntry>,
}

impl InstrumentsTable {
    pub fn get(&self, group: &InstrumentGroup, position: &Position) -> Option<&InstrumentEntry> {
        self.entries.get(&(group.clone(), position.clone()))
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TagPositionsTable {
    pub entries: HashMap<String, Vec<Position>>,
}

impl TagPositionsTable {
    pub fn positions_for(&self, tag: &str) -> Option<&[Position]> {
        self.entries.get(tag).map(|v| v.as_slice())
    }
}

/// One shared-notation transform, tried in order until one succeeds
/// (§4.2). Kept as data (an ordered `Vec`) per the design notes rather than
/// a hardcoded if/else chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SharedNotationRule {
    SamePitch,
    SamePitchExtendedRange,
    Kempyung,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RulesTable {
    pub kempyung: HashMap<InstrumentGroup, HashMap<PitchOctave, PitchOctave>>,
    pub shared_notation_rules: HashMap<InstrumentGroup, Vec<SharedNotationRule>>,
    /// Declared polos/sangsih position pairs, used by the kempyung
    /// correctness check (§4.5.4).
    pub kempyung_pairs: HashMap<InstrumentGroup, Vec<(Position, Position)>>,
}

impl RulesTable {
    pub fn kempyung_of(&self, group: &InstrumentGroup, po: PitchOctave) -> Option<PitchOctave> {
        self.kempyung.get(group).and_then(|table| table.get(&po)).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MidiPreset {
    pub bank_msb: u8,
    pub program: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MidiNoteKey {
    pub instrument_group: InstrumentGroup,
    pub instrument_type: String,
    pub positions: Option<Vec<Position>>,
    pub pitch_octave: PitchOctave,
    pub stroke: Stroke,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MidiNotesTable {
    pub notes: HashMap<MidiNoteKey, u8>,
    pub presets: HashMap<(InstrumentGroup, String), MidiPreset>,
}

impl MidiNotesTable {
    /// Looks up the MIDI note number for a key, falling back to the
    /// position-agnostic entry (`positions: None`) when no
    /// position-specific entry exists.
    pub fn note_for(
        &self,
        group: &InstrumentGroup,
        instrument_type: &str,
        position: &Position,
        pitch_octave: PitchOctave,
        stroke: Stroke,
    ) -> Option<u8> {
        let specific = MidiNoteKey {
            instrument_group: group.clone(),
            instrument_type: instrument_type.to_string(),
            positions: Some(vec![position.clone()]),
            pitch_octave,
            stroke,
        };
        if let Some(note) = self.notes.get(&specific) {
            return Some(*note);
        }
        let generic = MidiNoteKey {
            instrument_group: group.clone(),
            instrument_type: instrument_type.to_string(),
            positions: None,
            pitch_octave,
            stroke,
        };
        self.notes.get(&generic).copied()
    }

    pub fn preset_for(&self, group: &InstrumentGroup, instrument_type: &str) -> Option<MidiPreset> {
        self.presets.get(&(group.clone(), instrument_type.to_string())).copied()
    }
}

/// A norot/ornament pattern rule (§4.3): a cycle of scale-degree offsets
/// from the base note's pitch, repeated at the tremolo rate. Keyed by the
/// modifier's pattern tag, so a new ornament is added to this table rather
/// than to the elaborator (§9, "new patterns are added by extending the
/// rule table, not by changing the elaborator").
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PatternRule {
    pub scale_steps: Vec<i8>,
}

/// Pitch/octave expansion tables for pattern elaboration (§4.3): the
/// tremolo repetition rate, the two parallel tables that drive
/// accelerating tremolo, and the norot/ornament pattern rule table.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TremoloTables {
    pub notes_per_quarternote: u32,
    pub accelerating_pattern: Vec<u32>,
    pub accelerating_velocity: Vec<u8>,
    pub patterns: HashMap<String, PatternRule>,
}

/// Every reference table the pipeline needs, bundled for convenience when
/// threading them through the stage functions.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ReferenceTables {
    pub font: FontTable,
    pub instruments: InstrumentsTable,
    pub tag_positions: TagPositionsTable,
    pub rules: RulesTable,
    pub midi_notes: MidiNotesTable,
    pub tremolo: TremoloTables,
}

/// Run options, normally produced by an external CLI/config loader
/// (out of scope here, per `SPEC_FULL.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RunType {
    RunSingle,
    RunAll,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunConfig {
    pub runtype: RunType,
    pub is_production_run: bool,
    pub autocorrect: bool,
    pub save_corrected_to_file: bool,
    pub save_midifile: bool,
    pub save_pdf_notation: bool,
    pub detailed_validation_logging: bool,
    /// Names the row of the instruments/rules/MIDI-notes tables this run
    /// compiles against (e.g. "gong_kebyar"). Supplied by the external
    /// config loader alongside the reference tables (§6); every table
    /// lookup from `binding` onward is keyed on this value.
    pub instrument_group: String,
    /// The declared font version the notation was authored against. Not
    /// consulted by this crate's own lookups (font choice is data-driven
    /// per spec §1's Non-goals), but carried onto `Score` for round-
    /// tripping and for an external PDF-rendering collaborator to read.
    pub font_version: String,
    pub ppq: u16,
    pub base_note_time: u32,
    pub silence_seconds_before_start: f64,
    pub silence_seconds_after_end: f64,
    /// When true, execution linearization may legitimately revisit a step
    /// forever (invariant I4 only applies to non-looping scores) and the
    /// MIDI emitter skips the natural-release tail (§4.7).
    pub loop_piece: bool,
    /// Named dynamics levels (e.g. "f", "mp") resolved to a MIDI velocity,
    /// supplied by the caller alongside the reference tables.
    pub dynamics_presets: HashMap<String, u8>,
    /// Positions whose notation is written in shorthand and must be padded
    /// out to the beat's nominal length during elaboration (§4.3).
    pub shorthand_positions: Vec<String>,
    /// MIDI note struck on the kempli/marker track at every beat the
    /// implicit kempli track is on for (§4.4, §4.7). Defaults to General
    /// MIDI's percussion woodblock, the stand-in most soundfonts map a
    /// struck idiophone beat-keeper onto.
    pub kempli_note: u8,
    pub kempli_velocity: u8,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            runtype: RunType::RunSingle,
            is_production_run: false,
            autocorrect: true,
            save_corrected_to_file: false,
            save_midifile: true,
            save_pdf_notation: false,
            detailed_validation_logging: false,
            instrument_group: String::new(),
            font_version: String::new(),
            ppq: 96,
            base_note_time: 24,
            silence_seconds_before_start: 0.0,
            silence_seconds_after_end: 1.0,
            loop_piece: false,
            dynamics_presets: HashMap::new(),
            shorthand_positions: Vec::new(),
            kempli_note: 76,
            kempli_velocity: 90,
        }
    }
}
