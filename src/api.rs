//! # Public API
//!
//! The main entry points for the gamelan notation compiler: [`compile`] runs
//! the full nine-stage pipeline end to end, [`compile_unchecked`] skips
//! score validation for partial or in-progress notation, and the
//! individual `stage_*` functions expose the pipeline one step at a time
//! for callers that want to inspect an intermediate artifact.
//!
//! # Example
//!
//! ```rust
//! use gamelan_notation::{compile, ReferenceTables, RunConfig};
//!
//! let source = "kendang\too-";
//! let tables = ReferenceTables::default();
//! let config = RunConfig::default();
//! match compile(source, &tables, &config) {
//!     Ok(output) => {
//!         let _ = output.midi_bytes;
//!     }
//!     Err(errors) => {
//!         for error in errors {
//!             eprintln!("{error}");
//!         }
//!     }
//! }
//! ```

use crate::error::{Diagnostics, GamelanError};
use crate::score::Score;
use crate::tables::{ReferenceTables, RunConfig};
use crate::{binding, completion, construction, elaboration, execution, midi, parser, settings, validation};

/// The result of a full compilation: the serialized standard MIDI file
/// plus every warning accumulated across all nine stages (autocorrections,
/// unmapped MIDI notes, and the like).
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    pub midi_bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Runs the full pipeline: settings validation, notation parse, score
/// construction, position binding, pattern elaboration, score completion,
/// score validation, execution linearization, and MIDI emission.
///
/// A stage that records any error aborts the pipeline immediately,
/// returning every error that stage accumulated (never just the first).
pub fn compile(source: &str, tables: &ReferenceTables, config: &RunConfig) -> Result<CompileOutput, Vec<GamelanError>> {
    let mut warnings = Vec::new();

    let score = stage_through_validation(source, tables, config, &mut warnings)?;

    let mut diag = Diagnostics::new();
    let exec = execution::linearize(&score, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    let mut diag = Diagnostics::new();
    let midi_bytes = midi::emit(&score, &exec, tables, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    Ok(CompileOutput { midi_bytes, warnings })
}

/// Runs the pipeline through completion, skipping score validation (and
/// therefore autocorrection). Useful for rendering a partial score while it
/// is still being authored, where out-of-range notes or kempyung mismatches
/// are expected and should not block playback.
pub fn compile_unchecked(source: &str, tables: &ReferenceTables, config: &RunConfig) -> Result<CompileOutput, Vec<GamelanError>> {
    let mut warnings = Vec::new();
    let score = stage_through_completion(source, tables, config, &mut warnings)?;

    let mut diag = Diagnostics::new();
    let exec = execution::linearize(&score, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    let mut diag = Diagnostics::new();
    let midi_bytes = midi::emit(&score, &exec, tables, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    Ok(CompileOutput { midi_bytes, warnings })
}

fn stage_through_completion(
    source: &str,
    tables: &ReferenceTables,
    config: &RunConfig,
    warnings: &mut Vec<String>,
) -> Result<Score, Vec<GamelanError>> {
    let mut diag = Diagnostics::new();
    let initial_settings = settings::validate_settings(config, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    let mut diag = Diagnostics::new();
    let raw = parser::parse(source, &tables.font, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    let mut diag = Diagnostics::new();
    let score = construction::construct(&raw, &tables.font, initial_settings, config, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    let mut diag = Diagnostics::new();
    let score = binding::bind_positions(score, tables, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    let score = elaboration::elaborate(score, &tables.tremolo);

    let mut diag = Diagnostics::new();
    let score = completion::complete(score, tables, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    Ok(score)
}

fn stage_through_validation(
    source: &str,
    tables: &ReferenceTables,
    config: &RunConfig,
    warnings: &mut Vec<String>,
) -> Result<Score, Vec<GamelanError>> {
    let score = stage_through_completion(source, tables, config, warnings)?;

    let mut diag = Diagnostics::new();
    let score = validation::validate(score, tables, config, &mut diag);
    if diag.has_errors() {
        return Err(diag.errors);
    }
    warnings.extend(diag.warnings);

    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{InstrumentGroup, Pitch, PitchOctave, Position, Stroke};
    use crate::tables::{FontEntry, FontSymbolKind, FontTable, InstrumentEntry, InstrumentRange, InstrumentsTable, MidiNoteKey, MidiNotesTable, TagPositionsTable};

    fn minimal_tables() -> ReferenceTables {
        let group = InstrumentGroup::new("gk");
        let position = Position::new("gangsa");

        let mut font = FontTable::default();
        font.entries.insert(
            'o',
            FontEntry {
                code_point: 'o',
                kind: FontSymbolKind::Note { pitch_octave: PitchOctave::new(Pitch::Dong, 0), stroke: Stroke::Open },
                duration: crate::fraction::ONE,
                rest_after: crate::fraction::ZERO,
                is_combining: false,
            },
        );

        let mut tag_positions = TagPositionsTable::default();
        tag_positions.entries.insert("gangsa".to_string(), vec![position.clone()]);

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

        ReferenceTables { font, tag_positions, instruments, midi_notes, ..Default::default() }
    }

    #[test]
    fn compiles_a_single_beat_to_a_nonempty_midi_file() {
        let tables = minimal_tables();
        let config = RunConfig { instrument_group: "gk".to_string(), ..RunConfig::default() };
        let output = compile("gangsa\too", &tables, &config).expect("compilation should succeed");
        assert!(!output.midi_bytes.is_empty());
        assert!(output.midi_bytes.starts_with(b"MThd"));
    }

    #[test]
    fn invalid_settings_abort_before_parsing() {
        let tables = minimal_tables();
        let config = RunConfig { ppq: 0, ..RunConfig::default() };
        let errors = compile("gangsa\too", &tables, &config).expect_err("should fail settings validation");
        assert!(errors.iter().any(|e| matches!(e, GamelanError::InvalidSettings { .. })));
    }
}
