//! VAD inference engines
//!
//! This crate provides the per-stream speech detection engines:
//! - [`StubEngine`]: deterministic toggle, used for tests and as a dev
//!   fallback when the native backend is unavailable
//! - `SileroEngine`: Silero VAD v5 via ONNX Runtime (feature `onnx`)
//!
//! Both share the same chunk-to-result arithmetic: callers feed PCM chunks
//! of arbitrary size and receive one [`FrameResult`] per completed inference
//! window, with leftovers buffered for the next call.

pub mod pcm;
mod stub;

#[cfg(feature = "onnx")]
mod model;
#[cfg(feature = "onnx")]
mod ort_lib;
#[cfg(feature = "onnx")]
mod silero;

pub use stub::{StubEngine, STUB_CONFIDENCE, STUB_TOGGLE_INTERVAL, STUB_WINDOW_SAMPLES};

#[cfg(feature = "onnx")]
pub use silero::SileroEngine;

use std::path::PathBuf;
use thiserror::Error;

/// The only sample rate accepted by this adapter. Silero VAD v5 is trained
/// on 16 kHz input and the stub mirrors it.
pub const EXPECTED_SAMPLE_RATE: u32 = 16_000;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported sample_rate {got}, engine requires {expected}")]
    WrongSampleRate { got: u32, expected: u32 },

    #[error("PCM buffer has odd length {0} (s16le requires 2 bytes per sample)")]
    OddPcmLength(usize),

    #[error("silero backend not available (built without the onnx feature)")]
    NativeUnavailable,

    #[error("onnx runtime init: {0}")]
    Init(String),

    #[error("inference: {0}")]
    Inference(String),
}

/// Output of a single inference window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameResult {
    /// Whether the window was classified as speech (already thresholded).
    pub is_speech: bool,
    /// Raw speech probability in `[0, 1]`.
    pub confidence: f32,
}

/// A per-stream VAD engine.
///
/// One instance serves exactly one stream; nothing is shared between
/// instances apart from the process-wide runtime initialisation.
pub trait Engine: Send {
    /// Buffer a PCM s16le chunk and run inference for each completed window.
    ///
    /// Returns one result per window consumed; an empty chunk (or one that
    /// does not complete a window) yields an empty vec without error.
    /// Leftover samples are retained for the next call.
    fn process_chunk(
        &mut self,
        pcm: &[u8],
        sample_rate: u32,
    ) -> Result<Vec<FrameResult>, EngineError>;

    /// Clear carried inference state and the sample buffer. The configured
    /// threshold is preserved.
    fn reset(&mut self);

    /// Update the speech probability cutoff in place.
    fn set_threshold(&mut self, threshold: f64);

    /// Duration of one inference window in milliseconds.
    fn frame_duration_ms(&self) -> u32;

    /// Sample rate this engine accepts.
    fn expected_sample_rate(&self) -> u32 {
        EXPECTED_SAMPLE_RATE
    }

    /// Release backend resources. Safe to call more than once.
    fn close(&mut self);
}

/// Options controlling native runtime resolution.
#[derive(Debug, Clone, Default)]
pub struct NativeOptions {
    /// Explicit ONNX Runtime shared library path, bypassing the search.
    pub ort_lib_path: Option<PathBuf>,
    /// Allow CWD-relative library lookup (disabled by default to prevent
    /// shared-library hijacking).
    pub dev_mode: bool,
}

/// Whether the Silero backend is compiled into this binary.
pub fn native_available() -> bool {
    cfg!(feature = "onnx")
}

/// Construct a Silero engine with the given speech threshold.
#[cfg(feature = "onnx")]
pub fn new_native_engine(
    threshold: f64,
    options: &NativeOptions,
) -> Result<Box<dyn Engine>, EngineError> {
    Ok(Box::new(SileroEngine::new(threshold, options)?))
}

/// Without the `onnx` feature there is no native engine to construct.
#[cfg(not(feature = "onnx"))]
pub fn new_native_engine(
    _threshold: f64,
    _options: &NativeOptions,
) -> Result<Box<dyn Engine>, EngineError> {
    Err(EngineError::NativeUnavailable)
}
