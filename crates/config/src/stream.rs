//! Per-stream configuration overlay
//!
//! Streams may send a JSON document to override the process VAD parameters.
//! Overrides are layered onto the stream's copy until the first non-empty
//! PCM chunk arrives; after that the configuration is frozen by the caller.

use serde::Deserialize;

use crate::{ConfigError, VadParams};

/// Partial override parsed from a stream's `config_json`.
///
/// Unknown top-level keys are ignored. `speech_pad_ms` is recognised only so
/// that its use can be rejected with a message naming the replacement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamConfigUpdate {
    pub threshold: Option<f64>,
    pub min_speech_duration_ms: Option<u64>,
    pub min_silence_duration_ms: Option<u64>,
    pub speech_pad_ms: Option<serde_json::Value>,
}

impl VadParams {
    /// Parse `config_json` and layer any recognised overrides onto `self`.
    ///
    /// Empty or whitespace-only input is a no-op. The merged result is
    /// re-validated, so a single out-of-range override fails the whole call
    /// and leaves an error naming the offending field.
    pub fn apply_json(&mut self, config_json: &str) -> Result<(), ConfigError> {
        if config_json.trim().is_empty() {
            return Ok(());
        }

        let update: StreamConfigUpdate = serde_json::from_str(config_json)?;
        if update.speech_pad_ms.is_some() {
            return Err(ConfigError::SpeechPadUnsupported);
        }

        if let Some(threshold) = update.threshold {
            self.threshold = threshold;
        }
        if let Some(ms) = update.min_speech_duration_ms {
            self.min_speech_duration_ms = ms;
        }
        if let Some(ms) = update.min_silence_duration_ms {
            self.min_silence_duration_ms = ms;
        }

        self.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_noop() {
        let mut params = VadParams::default();
        params.apply_json("").unwrap();
        params.apply_json("   ").unwrap();
        assert_eq!(params, VadParams::default());
    }

    #[test]
    fn test_partial_override() {
        let mut params = VadParams::default();
        params
            .apply_json(r#"{"min_silence_duration_ms": 5000}"#)
            .unwrap();
        assert_eq!(params.min_silence_duration_ms, 5000);
        assert_eq!(params.threshold, VadParams::default().threshold);
        assert_eq!(
            params.min_speech_duration_ms,
            VadParams::default().min_speech_duration_ms
        );
    }

    #[test]
    fn test_full_override() {
        let mut params = VadParams::default();
        params
            .apply_json(
                r#"{"threshold": 0.8, "min_speech_duration_ms": 100, "min_silence_duration_ms": 150}"#,
            )
            .unwrap();
        assert_eq!(params.threshold, 0.8);
        assert_eq!(params.min_speech_duration_ms, 100);
        assert_eq!(params.min_silence_duration_ms, 150);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut params = VadParams::default();
        params
            .apply_json(r#"{"threshold": 0.3, "future_option": true}"#)
            .unwrap();
        assert_eq!(params.threshold, 0.3);
    }

    #[test]
    fn test_speech_pad_rejected() {
        let mut params = VadParams::default();
        let err = params.apply_json(r#"{"speech_pad_ms": 100}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SpeechPadUnsupported));
        assert!(err.to_string().contains("min_silence_duration_ms"));
    }

    #[test]
    fn test_speech_pad_null_is_absent() {
        // JSON null deserializes to None, matching "field not provided".
        let mut params = VadParams::default();
        params.apply_json(r#"{"speech_pad_ms": null}"#).unwrap();
    }

    #[test]
    fn test_malformed_json_rejected() {
        let mut params = VadParams::default();
        let err = params.apply_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_out_of_range_override_rejected() {
        let mut params = VadParams::default();
        assert!(params.apply_json(r#"{"threshold": 1.5}"#).is_err());
        assert!(params
            .apply_json(r#"{"min_speech_duration_ms": 0}"#)
            .is_err());
        assert!(params
            .apply_json(r#"{"min_silence_duration_ms": 60001}"#)
            .is_err());
    }
}
