//! Process settings
//!
//! Loaded once at startup from environment variables with the `VAD_` prefix
//! (e.g. `VAD_ENGINE`, `VAD_LISTEN_ADDR`, `VAD_THRESHOLD`). The per-stream
//! copy of the VAD parameters is taken from here; everything else configures
//! the dispatcher.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{ConfigError, VadParams};

/// Engine selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Prefer the Silero backend, fall back to the stub when it is not
    /// compiled in (or, in dev mode, when its probe fails).
    Auto,
    /// Require the Silero backend; startup fails if it cannot be probed.
    Silero,
    /// Deterministic stub engine; results are not based on audio content.
    Stub,
}

impl EngineKind {
    /// Configured name as it appears in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Auto => "auto",
            EngineKind::Silero => "silero",
            EngineKind::Stub => "stub",
        }
    }
}

/// Adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Engine selection policy.
    #[serde(default = "default_engine")]
    pub engine: EngineKind,

    /// Listen address for the gRPC server. Port 0 binds an ephemeral port.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log severity filter.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Speech probability cutoff.
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Hysteresis START threshold in milliseconds.
    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u64,

    /// Hysteresis END threshold in milliseconds.
    #[serde(default = "default_min_silence_duration_ms")]
    pub min_silence_duration_ms: u64,

    /// Explicit path to the ONNX Runtime shared library.
    #[serde(default)]
    pub ort_lib_path: Option<PathBuf>,

    /// Enables CWD-based library lookup and the auto -> stub fallback when
    /// the native probe fails. Off in production.
    #[serde(default)]
    pub dev_mode: bool,

    /// Legacy option kept only so it can be rejected with a useful message.
    #[serde(default)]
    pub speech_pad_ms: Option<u64>,
}

fn default_engine() -> EngineKind {
    EngineKind::Auto
}
fn default_listen_addr() -> String {
    "localhost:0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_threshold() -> f64 {
    crate::DEFAULT_THRESHOLD
}
fn default_min_speech_duration_ms() -> u64 {
    crate::DEFAULT_MIN_SPEECH_DURATION_MS
}
fn default_min_silence_duration_ms() -> u64 {
    crate::DEFAULT_MIN_SILENCE_DURATION_MS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            threshold: default_threshold(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
            min_silence_duration_ms: default_min_silence_duration_ms(),
            ort_lib_path: None,
            dev_mode: false,
            speech_pad_ms: None,
        }
    }
}

impl Settings {
    /// Validate settings, including the shared VAD parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.speech_pad_ms.is_some() {
            return Err(ConfigError::SpeechPadUnsupported);
        }
        self.vad_params().validate()
    }

    /// Per-stream VAD parameter defaults derived from these settings.
    pub fn vad_params(&self) -> VadParams {
        VadParams {
            threshold: self.threshold,
            min_speech_duration_ms: self.min_speech_duration_ms,
            min_silence_duration_ms: self.min_silence_duration_ms,
        }
    }
}

/// Load settings from `VAD_*` environment variables and validate them.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let source = Config::builder()
        .add_source(
            Environment::with_prefix("VAD")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = source.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.engine, EngineKind::Auto);
        assert_eq!(settings.listen_addr, "localhost:0");
        assert_eq!(settings.threshold, 0.5);
        assert_eq!(settings.min_speech_duration_ms, 250);
        assert_eq!(settings.min_silence_duration_ms, 300);
        assert!(!settings.dev_mode);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_speech_pad_rejected() {
        let settings = Settings {
            speech_pad_ms: Some(30),
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("speech_pad_ms"));
        assert!(err.to_string().contains("min_speech_duration_ms"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let settings = Settings {
            threshold: 2.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_engine_kind_parses_lowercase() {
        let kind: EngineKind = serde_json::from_str("\"silero\"").unwrap();
        assert_eq!(kind, EngineKind::Silero);
        let kind: EngineKind = serde_json::from_str("\"stub\"").unwrap();
        assert_eq!(kind, EngineKind::Stub);
        assert!(serde_json::from_str::<EngineKind>("\"webrtc\"").is_err());
    }

    #[test]
    fn test_vad_params_snapshot() {
        let settings = Settings {
            threshold: 0.7,
            min_speech_duration_ms: 100,
            min_silence_duration_ms: 200,
            ..Settings::default()
        };
        let params = settings.vad_params();
        assert_eq!(params.threshold, 0.7);
        assert_eq!(params.min_speech_duration_ms, 100);
        assert_eq!(params.min_silence_duration_ms, 200);
    }
}
