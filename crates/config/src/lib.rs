//! Configuration for the VAD adapter
//!
//! This crate provides:
//! - Process settings loaded from environment variables
//! - Per-stream VAD parameters and their JSON overlay
//! - Validation shared by both surfaces

pub mod settings;
pub mod stream;

pub use settings::{load_settings, EngineKind, Settings};
pub use stream::StreamConfigUpdate;

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid config_json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("speech_pad_ms is not supported; use min_speech_duration_ms and min_silence_duration_ms instead")]
    SpeechPadUnsupported,

    #[error("environment: {0}")]
    Environment(#[from] config::ConfigError),
}

/// Default speech probability cutoff.
pub const DEFAULT_THRESHOLD: f64 = 0.5;
/// Default minimum sustained speech before a START event, in milliseconds.
pub const DEFAULT_MIN_SPEECH_DURATION_MS: u64 = 250;
/// Default minimum sustained silence before an END event, in milliseconds.
pub const DEFAULT_MIN_SILENCE_DURATION_MS: u64 = 300;

/// Upper bound accepted for both hysteresis durations, in milliseconds.
pub const MAX_DURATION_MS: u64 = 60_000;

/// Per-stream VAD parameters.
///
/// Copied from [`Settings`] when a stream opens, then optionally overridden
/// by `config_json` messages until the first PCM chunk arrives.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VadParams {
    /// Speech probability cutoff in `[0, 1]`.
    pub threshold: f64,
    /// Sustained speech required before START, in `(0, 60000]` ms.
    pub min_speech_duration_ms: u64,
    /// Sustained silence required before END, in `(0, 60000]` ms.
    pub min_silence_duration_ms: u64,
}

impl Default for VadParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            min_speech_duration_ms: DEFAULT_MIN_SPEECH_DURATION_MS,
            min_silence_duration_ms: DEFAULT_MIN_SILENCE_DURATION_MS,
        }
    }
}

impl VadParams {
    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "threshold",
                message: format!("must be within [0, 1], got {}", self.threshold),
            });
        }
        if self.min_speech_duration_ms == 0 || self.min_speech_duration_ms > MAX_DURATION_MS {
            return Err(ConfigError::InvalidValue {
                field: "min_speech_duration_ms",
                message: format!(
                    "must be within (0, {MAX_DURATION_MS}], got {}",
                    self.min_speech_duration_ms
                ),
            });
        }
        if self.min_silence_duration_ms == 0 || self.min_silence_duration_ms > MAX_DURATION_MS {
            return Err(ConfigError::InvalidValue {
                field: "min_silence_duration_ms",
                message: format!(
                    "must be within (0, {MAX_DURATION_MS}], got {}",
                    self.min_silence_duration_ms
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(VadParams::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let params = VadParams {
            threshold: 1.5,
            ..VadParams::default()
        };
        assert!(params.validate().is_err());

        let params = VadParams {
            threshold: -0.1,
            ..VadParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_duration_bounds() {
        let params = VadParams {
            min_speech_duration_ms: 0,
            ..VadParams::default()
        };
        assert!(params.validate().is_err());

        let params = VadParams {
            min_silence_duration_ms: MAX_DURATION_MS + 1,
            ..VadParams::default()
        };
        assert!(params.validate().is_err());

        let params = VadParams {
            min_speech_duration_ms: MAX_DURATION_MS,
            ..VadParams::default()
        };
        assert!(params.validate().is_ok());
    }
}
