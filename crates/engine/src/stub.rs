//! Deterministic stub engine.
//!
//! Alternates between silence and speech on a fixed window count without
//! looking at the audio. Its chunk-to-result arithmetic matches the Silero
//! engine, which makes it the reference oracle for stream-level tests and a
//! usable dev fallback when the native backend is missing.

use crate::{Engine, EngineError, FrameResult, EXPECTED_SAMPLE_RATE};

/// Number of windows after which the stub toggles between silence and
/// speech. At 20 ms per window, 50 windows = 1 second of each phase.
pub const STUB_TOGGLE_INTERVAL: u32 = 50;

/// Fixed confidence reported for every stub result.
pub const STUB_CONFIDENCE: f32 = 0.42;

/// Stub inference window: 320 samples = 20 ms at 16 kHz.
pub const STUB_WINDOW_SAMPLES: usize = 320;

/// Content-blind engine that toggles speech/silence every
/// [`STUB_TOGGLE_INTERVAL`] windows.
#[derive(Debug, Default)]
pub struct StubEngine {
    buffered_samples: usize,
    counter: u32,
    speaking: bool,
}

impl StubEngine {
    /// Create a stub engine starting in the silence phase.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for StubEngine {
    fn process_chunk(
        &mut self,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<Vec<FrameResult>, EngineError> {
        if sample_rate != EXPECTED_SAMPLE_RATE {
            return Err(EngineError::WrongSampleRate {
                got: sample_rate,
                expected: EXPECTED_SAMPLE_RATE,
            });
        }
        if pcm.len() % 2 != 0 {
            return Err(EngineError::OddPcmLength(pcm.len()));
        }

        // Content is ignored; only the accumulated sample count matters.
        self.buffered_samples += pcm.len() / 2;

        let mut results = Vec::new();
        while self.buffered_samples >= STUB_WINDOW_SAMPLES {
            self.buffered_samples -= STUB_WINDOW_SAMPLES;
            self.counter += 1;
            if self.counter >= STUB_TOGGLE_INTERVAL {
                self.counter = 0;
                self.speaking = !self.speaking;
            }
            results.push(FrameResult {
                is_speech: self.speaking,
                confidence: STUB_CONFIDENCE,
            });
        }
        Ok(results)
    }

    fn reset(&mut self) {
        self.buffered_samples = 0;
        self.counter = 0;
        self.speaking = false;
    }

    fn set_threshold(&mut self, _threshold: f64) {
        // The stub phase is driven by the toggle counter, not a probability.
    }

    fn frame_duration_ms(&self) -> u32 {
        (STUB_WINDOW_SAMPLES as u32 * 1000) / EXPECTED_SAMPLE_RATE // 20
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// One 20 ms window at 16 kHz mono s16le.
    const WINDOW_BYTES: usize = STUB_WINDOW_SAMPLES * 2; // 640

    fn window() -> Vec<u8> {
        vec![0u8; WINDOW_BYTES]
    }

    #[test]
    fn test_alternates_speech_silence() {
        let mut engine = StubEngine::new();

        // The toggle fires on window #STUB_TOGGLE_INTERVAL, so everything
        // before it is silence.
        for i in 0..STUB_TOGGLE_INTERVAL - 1 {
            let results = engine.process_chunk(&window(), 16_000).unwrap();
            assert_eq!(results.len(), 1, "window {i}");
            assert!(!results[0].is_speech, "window {i}: expected silence");
            assert_eq!(results[0].confidence, STUB_CONFIDENCE);
        }

        let results = engine.process_chunk(&window(), 16_000).unwrap();
        assert!(results[0].is_speech, "expected speech after toggle");

        // Another full interval returns to silence.
        for _ in 1..STUB_TOGGLE_INTERVAL {
            engine.process_chunk(&window(), 16_000).unwrap();
        }
        let results = engine.process_chunk(&window(), 16_000).unwrap();
        assert!(!results[0].is_speech, "expected silence after second toggle");
    }

    #[test]
    fn test_reset_restores_initial_phase() {
        let mut engine = StubEngine::new();

        for _ in 0..=STUB_TOGGLE_INTERVAL {
            engine.process_chunk(&window(), 16_000).unwrap();
        }
        let results = engine.process_chunk(&window(), 16_000).unwrap();
        assert!(results[0].is_speech, "expected speech before reset");

        engine.reset();
        let results = engine.process_chunk(&window(), 16_000).unwrap();
        assert!(!results[0].is_speech, "expected silence after reset");
    }

    #[test]
    fn test_reset_equivalent_to_fresh_engine() {
        let mut used = StubEngine::new();
        for _ in 0..73 {
            used.process_chunk(&window(), 16_000).unwrap();
        }
        used.reset();

        let mut fresh = StubEngine::new();
        for i in 0..120 {
            let a = used.process_chunk(&window(), 16_000).unwrap();
            let b = fresh.process_chunk(&window(), 16_000).unwrap();
            assert_eq!(a, b, "window {i} after reset diverged");
        }
    }

    #[test]
    fn test_multiple_windows_per_chunk() {
        let mut engine = StubEngine::new();
        let chunk = vec![0u8; WINDOW_BYTES * 3];
        let results = engine.process_chunk(&chunk, 16_000).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_partial_window_buffered() {
        let mut engine = StubEngine::new();
        let half = vec![0u8; WINDOW_BYTES / 2];

        let results = engine.process_chunk(&half, 16_000).unwrap();
        assert!(results.is_empty());

        let results = engine.process_chunk(&half, 16_000).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_empty_chunk() {
        let mut engine = StubEngine::new();
        assert!(engine.process_chunk(&[], 16_000).unwrap().is_empty());
    }

    #[test]
    fn test_odd_pcm_length_rejected() {
        let mut engine = StubEngine::new();
        let odd = vec![0u8; WINDOW_BYTES + 1];
        let err = engine.process_chunk(&odd, 16_000).unwrap_err();
        assert!(matches!(err, EngineError::OddPcmLength(n) if n == WINDOW_BYTES + 1));
    }

    #[test]
    fn test_wrong_sample_rate_rejected() {
        let mut engine = StubEngine::new();
        let err = engine.process_chunk(&window(), 8_000).unwrap_err();
        assert!(matches!(
            err,
            EngineError::WrongSampleRate {
                got: 8_000,
                expected: 16_000
            }
        ));
    }

    #[test]
    fn test_frame_duration() {
        let engine = StubEngine::new();
        assert_eq!(engine.frame_duration_ms(), 20);
        assert_eq!(engine.expected_sample_rate(), 16_000);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut engine = StubEngine::new();
        engine.close();
        engine.close();
        // Still usable afterwards; the stub holds no backend resources.
        assert!(engine.process_chunk(&window(), 16_000).is_ok());
    }

    proptest! {
        /// Result count follows floor((buffered + samples) / window) and the
        /// residual buffer stays strictly below one window.
        #[test]
        fn prop_result_count_arithmetic(chunks in prop::collection::vec(0usize..1500, 1..20)) {
            let mut engine = StubEngine::new();
            let mut buffered = 0usize;
            for samples in chunks {
                let results = engine.process_chunk(&vec![0u8; samples * 2], 16_000).unwrap();
                let expected = (buffered + samples) / STUB_WINDOW_SAMPLES;
                prop_assert_eq!(results.len(), expected);
                buffered = (buffered + samples) % STUB_WINDOW_SAMPLES;
                prop_assert!(buffered < STUB_WINDOW_SAMPLES);
            }
        }

        /// Chunk boundaries never change the emitted result sequence.
        #[test]
        fn prop_partition_invariance(
            total_windows in 1usize..160,
            splits in prop::collection::vec(1usize..4000, 0..10),
        ) {
            let total_samples = total_windows * STUB_WINDOW_SAMPLES;

            let mut whole = StubEngine::new();
            let reference = whole
                .process_chunk(&vec![0u8; total_samples * 2], 16_000)
                .unwrap();

            let mut split_engine = StubEngine::new();
            let mut collected = Vec::new();
            let mut remaining = total_samples;
            for samples in splits {
                let take = samples.min(remaining);
                collected.extend(
                    split_engine
                        .process_chunk(&vec![0u8; take * 2], 16_000)
                        .unwrap(),
                );
                remaining -= take;
                if remaining == 0 {
                    break;
                }
            }
            if remaining > 0 {
                collected.extend(
                    split_engine
                        .process_chunk(&vec![0u8; remaining * 2], 16_000)
                        .unwrap(),
                );
            }

            prop_assert_eq!(collected, reference);
        }
    }
}
