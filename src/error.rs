//! # Error types and the per-stage diagnostics collector
//!
//! Every pipeline stage accumulates the errors it finds in its own input
//! before the pipeline decides whether to continue. This module defines
//! the full error taxonomy and [`Diagnostics`], the mutable collector each
//! stage is handed and which never survives past its own stage boundary.
//!
//! Autocorrections are not errors: a stage that silently replaces a
//! sangsih note with its kempyung equivalent, or clamps a note into range,
//! records a warning on `Diagnostics`, not an entry in [`GamelanError`].

use thiserror::Error;

/// A source location within the notation file, when the error is
/// positional rather than structural.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextLocation {
    pub line: usize,
    pub column: usize,
}

impl TextLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A location within the score, when the error is structural rather than
/// textual (post-parse stages no longer have line/column information for
/// most things, only gongan/beat/position coordinates).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreLocation {
    pub gongan: usize,
    pub beat: usize,
    pub position: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GamelanError {
    // --- Parse errors ----------------------------------------------------
    #[error("{line}:{column}: {message}", line = location.line, column = location.column)]
    LineParseError {
        location: TextLocation,
        message: String,
    },

    #[error("{line}:{column}: unknown notation symbol '{symbol}'", line = location.line, column = location.column)]
    UnknownSymbolError {
        location: TextLocation,
        symbol: char,
    },

    #[error("{line}: unterminated metadata block", line = location.line)]
    UnterminatedMetadata { location: TextLocation },

    #[error("{line}: malformed directive '{keyword}': {message}", line = location.line)]
    MalformedDirective {
        location: TextLocation,
        keyword: String,
        message: String,
    },

    // --- Resolution errors -------------------------------------------------
    #[error("{line}: unknown tag '{tag}'", line = location.line)]
    UnknownTag { location: TextLocation, tag: String },

    #[error("unknown position '{position}'")]
    UnknownPosition { position: String },

    #[error("gongan {gongan} beat {beat}: tag '{tag}' has no valid mapping to position '{position}'", gongan = location.gongan, beat = location.beat)]
    UnmappableSharedNotation {
        location: ScoreLocation,
        tag: String,
        position: String,
    },

    #[error("duplicate label '{name}'")]
    DuplicateLabel { name: String },

    #[error("goto references undefined label '{label}'")]
    UndefinedLabelReference { label: String },

    // --- Structural errors -------------------------------------------------
    #[error("gongan {gongan} beat {beat}: beat length mismatch on position '{position}': expected {expected}, got {actual}", gongan = location.gongan, beat = location.beat)]
    BeatLengthMismatch {
        location: ScoreLocation,
        position: String,
        actual: String,
        expected: String,
    },

    #[error("gongan {gongan}: stave length mismatch on position '{position}'")]
    StaveLengthMismatch { gongan: usize, position: String },

    #[error("gongan {gongan} beat {beat}: note out of range for position '{position}'", gongan = location.gongan, beat = location.beat)]
    NoteOutOfRange {
        location: ScoreLocation,
        position: String,
    },

    #[error("gongan {gongan} beat {beat}: sangsih note is not the kempyung of the polos note", gongan = location.gongan, beat = location.beat)]
    KempyungMismatch { location: ScoreLocation },

    #[error("octave shift on instrument '{instrument}' leaves it out of range")]
    OctavateOutOfRange { instrument: String },

    // --- Execution errors ---------------------------------------------------
    #[error("execution diverges: step (gongan {gongan}, beat {beat}, pass {pass}) repeats with no progress")]
    DivergentFlow {
        gongan: usize,
        beat: usize,
        pass: u32,
    },

    #[error("goto target label '{label}' lies in the unbound block")]
    GotoTargetInUnbound { label: String },

    #[error("repeat count must be at least 1, got {count}")]
    RepeatCountInvalid { count: i64 },

    #[error("directive '{keyword}' is recognized but not operational: {detail}")]
    UnsupportedDirective { keyword: String, detail: String },

    // --- I/O errors ----------------------------------------------------------
    #[error("input file missing: {path}")]
    InputFileMissing { path: String },

    #[error("failed to write output file {path}: {message}")]
    OutputFileWriteError { path: String, message: String },

    // --- Settings errors -------------------------------------------------
    #[error("invalid run configuration: {message}")]
    InvalidSettings { message: String },
}

/// Accumulates errors and warnings for one pipeline stage.
///
/// A stage runs to completion against the full input it was given,
/// collecting every violation it finds rather than stopping at the first
/// one, so a single run surfaces as many problems as possible. The
/// pipeline driver inspects [`Diagnostics::has_errors`] at the stage
/// boundary and aborts before running the next stage if it is true.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub errors: Vec<GamelanError>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, error: GamelanError) {
        log::debug!("error recorded: {error}");
        self.errors.push(error);
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}
