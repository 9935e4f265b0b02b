//! Speech boundary detection.
//!
//! Applies hysteresis to raw per-frame engine results: a START is emitted
//! only after a sustained run of speech frames, an END only after a
//! sustained run of silence frames. The threshold itself is applied inside
//! the engine; this layer only sees the boolean decisions.

use vad_adapter_config::VadParams;
use vad_adapter_engine::FrameResult;

/// Kind of a speech boundary event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryEventKind {
    Start,
    Ongoing,
    End,
}

/// A boundary event before timestamping; the stream handler stamps it with
/// the audio-time of the triggering frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryEvent {
    pub kind: BoundaryEventKind,
    pub confidence: f32,
}

/// Hysteresis state machine over per-frame speech decisions.
#[derive(Debug)]
pub struct BoundaryDetector {
    in_speech: bool,
    speech_frames: u32,
    silence_frames: u32,
    last_confidence: f32,

    // Derived from config: consecutive frames needed for a transition.
    min_speech_frames: u32,
    min_silence_frames: u32,
}

impl BoundaryDetector {
    /// Build a detector from stream parameters and the engine's window
    /// duration. Both frame counts are at least 1.
    pub fn new(params: &VadParams, frame_duration_ms: u32) -> Self {
        Self {
            in_speech: false,
            speech_frames: 0,
            silence_frames: 0,
            last_confidence: 0.0,
            min_speech_frames: min_frames(params.min_speech_duration_ms, frame_duration_ms),
            min_silence_frames: min_frames(params.min_silence_duration_ms, frame_duration_ms),
        }
    }

    /// Feed one frame result; returns at most one event.
    pub fn process(&mut self, result: FrameResult) -> Option<BoundaryEvent> {
        self.last_confidence = result.confidence;

        if result.is_speech {
            self.speech_frames += 1;
            self.silence_frames = 0;

            if !self.in_speech && self.speech_frames >= self.min_speech_frames {
                self.in_speech = true;
                return Some(BoundaryEvent {
                    kind: BoundaryEventKind::Start,
                    confidence: result.confidence,
                });
            }
            if self.in_speech {
                return Some(BoundaryEvent {
                    kind: BoundaryEventKind::Ongoing,
                    confidence: result.confidence,
                });
            }
        } else {
            self.silence_frames += 1;
            self.speech_frames = 0;

            if self.in_speech && self.silence_frames >= self.min_silence_frames {
                self.in_speech = false;
                return Some(BoundaryEvent {
                    kind: BoundaryEventKind::End,
                    confidence: result.confidence,
                });
            }
        }
        None
    }

    /// Whether the detector currently considers the stream inside speech.
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    /// Flush at client EOF: if speech is still open, synthesise the final
    /// END carrying the most recent confidence.
    pub fn flush(&mut self) -> Option<BoundaryEvent> {
        if !self.in_speech {
            return None;
        }
        self.in_speech = false;
        Some(BoundaryEvent {
            kind: BoundaryEventKind::End,
            confidence: self.last_confidence,
        })
    }
}

/// Consecutive frames covering `duration_ms`, rounded up, floored at 1.
fn min_frames(duration_ms: u64, frame_duration_ms: u32) -> u32 {
    duration_ms
        .div_ceil(u64::from(frame_duration_ms.max(1)))
        .max(1) as u32
}
