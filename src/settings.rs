//! # Settings validation (stage 1, §4.0)
//!
//! The first pipeline stage validates the caller-supplied [`RunConfig`]
//! before any notation is read, and seeds the [`ScoreSettings`] that later
//! stages read from. A config with a zero `ppq`/`base_note_time` or a
//! negative silence duration is rejected outright — every later stage
//! assumes these values are usable without re-checking them.

use crate::error::{Diagnostics, GamelanError};
use crate::score::{Position, ScoreSettings};
use crate::tables::RunConfig;

pub fn validate_settings(config: &RunConfig, diag: &mut Diagnostics) -> ScoreSettings {
    if config.ppq == 0 {
        diag.push_error(GamelanError::InvalidSettings {
            message: "ppq must be greater than zero".to_string(),
        });
    }
    if config.base_note_time == 0 {
        diag.push_error(GamelanError::InvalidSettings {
            message: "base_note_time must be greater than zero".to_string(),
        });
    }
    if config.silence_seconds_before_start < 0.0 {
        diag.push_error(GamelanError::InvalidSettings {
            message: "silence_seconds_before_start must not be negative".to_string(),
        });
    }
    if config.silence_seconds_after_end < 0.0 {
        diag.push_error(GamelanError::InvalidSettings {
            message: "silence_seconds_after_end must not be negative".to_string(),
        });
    }

    ScoreSettings {
        ppq: config.ppq,
        base_note_time: config.base_note_time,
        dynamics: config.dynamics_presets.clone(),
        shorthand_positions: config.shorthand_positions.iter().cloned().map(Position::new).collect(),
        sequence: None,
        silence_seconds_before_start: config.silence_seconds_before_start,
        silence_seconds_after_end: config.silence_seconds_after_end,
        loop_piece: config.loop_piece,
        validation_ignore: Vec::new(),
        kempli_note: config.kempli_note,
        kempli_velocity: config.kempli_velocity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let mut diag = Diagnostics::new();
        let settings = validate_settings(&RunConfig::default(), &mut diag);
        assert!(!diag.has_errors());
        assert_eq!(settings.ppq, 96);
        assert_eq!(settings.base_note_time, 24);
    }

    #[test]
    fn zero_ppq_is_rejected() {
        let mut diag = Diagnostics::new();
        let config = RunConfig { ppq: 0, ..RunConfig::default() };
        let _ = validate_settings(&config, &mut diag);
        assert!(diag.errors.iter().any(|e| matches!(e, GamelanError::InvalidSettings { .. })));
    }

    #[test]
    fn negative_silence_is_rejected() {
        let mut diag = Diagnostics::new();
        let config = RunConfig { silence_seconds_after_end: -1.0, ..RunConfig::default() };
        let _ = validate_settings(&config, &mut diag);
        assert!(diag.errors.iter().any(|e| matches!(e, GamelanError::InvalidSettings { .. })));
    }
}
