//! Silero VAD v5 engine backed by ONNX Runtime.
//!
//! The model consumes 512-sample windows of 16 kHz audio together with a
//! carried RNN state of shape [2, 1, 128] and yields a speech probability
//! per window. One session and one set of tensors are allocated per stream
//! and reused across inferences.

use ndarray::{Array1, Array2, Array3, ArrayView1};
use ort::{GraphOptimizationLevel, Session};

use crate::{pcm, Engine, EngineError, FrameResult, NativeOptions, EXPECTED_SAMPLE_RATE};

/// Samples per inference window: 512 = 32 ms at 16 kHz.
pub(crate) const SILERO_WINDOW_SAMPLES: usize = 512;

/// Hidden state dimension per layer; the combined tensor is [2, 1, 128].
const SILERO_STATE_SIZE: usize = 128;

/// Silero VAD v5 inference engine. One instance per stream.
pub struct SileroEngine {
    session: Option<Session>,

    // Input tensors, reused between calls.
    input: Array2<f32>, // [1, 512]
    state: Array3<f32>, // [2, 1, 128]
    sr: Array1<i64>,    // [16000]

    // Sample buffer accumulating chunks into full windows.
    buf: Vec<f32>,

    threshold: f64,
}

impl SileroEngine {
    /// Initialise the runtime (once per process), load the embedded model
    /// and allocate the reusable tensors.
    pub fn new(threshold: f64, options: &NativeOptions) -> Result<Self, EngineError> {
        if crate::model::SILERO_MODEL.is_empty() {
            return Err(EngineError::Init("embedded model data is empty".into()));
        }

        crate::ort_lib::ensure_runtime(options)?;

        let session = Session::builder()
            .map_err(|e| EngineError::Init(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EngineError::Init(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| EngineError::Init(e.to_string()))?
            .commit_from_memory(crate::model::SILERO_MODEL)
            .map_err(|e| EngineError::Init(format!("load silero model: {e}")))?;

        Ok(Self {
            session: Some(session),
            input: Array2::zeros((1, SILERO_WINDOW_SAMPLES)),
            // Hidden state starts zeroed; ndarray::zeros guarantees it, and
            // reset() restores the same condition.
            state: Array3::zeros((2, 1, SILERO_STATE_SIZE)),
            sr: Array1::from_vec(vec![i64::from(EXPECTED_SAMPLE_RATE)]),
            buf: Vec::with_capacity(SILERO_WINDOW_SAMPLES * 2),
            threshold,
        })
    }

    /// Run one inference on the window currently staged in `self.input`,
    /// carrying the RNN state forward.
    fn infer(&mut self) -> Result<f32, EngineError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| EngineError::Inference("engine is closed".into()))?;

        let inputs = ort::inputs![
            "input" => self.input.view(),
            "state" => self.state.view(),
            "sr" => self.sr.view(),
        ]
        .map_err(|e| EngineError::Inference(e.to_string()))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let prob = outputs
            .get("output")
            .ok_or_else(|| EngineError::Inference("missing output tensor".into()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::Inference(e.to_string()))?[[0, 0]];

        let next_state = outputs
            .get("stateN")
            .ok_or_else(|| EngineError::Inference("missing stateN tensor".into()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::Inference(e.to_string()))?
            .to_owned();
        drop(outputs);
        self.state.assign(&next_state);

        Ok(prob)
    }
}

impl Engine for SileroEngine {
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

        self.buf.extend(pcm::s16le_to_f32(pcm));

        let mut results = Vec::new();
        while self.buf.len() >= SILERO_WINDOW_SAMPLES {
            self.input
                .row_mut(0)
                .assign(&ArrayView1::from(&self.buf[..SILERO_WINDOW_SAMPLES]));
            let prob = self.infer()?;
            self.buf.drain(..SILERO_WINDOW_SAMPLES);
            results.push(FrameResult {
                is_speech: f64::from(prob) >= self.threshold,
                confidence: prob,
            });
        }
        Ok(results)
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
        self.buf.clear();
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn frame_duration_ms(&self) -> u32 {
        (SILERO_WINDOW_SAMPLES as u32 * 1000) / EXPECTED_SAMPLE_RATE // 32
    }

    fn close(&mut self) {
        // Dropping the session releases the backend; repeated calls no-op.
        self.session = None;
    }
}
