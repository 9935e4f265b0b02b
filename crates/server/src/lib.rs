//! VAD adapter gRPC server
//!
//! Serves the `vad.v1.VoiceActivityDetectionService` bidirectional stream:
//! per-stream format/config handshake, engine-driven inference, hysteresis
//! boundary detection and audio-time event timestamps. The dispatcher binds
//! the port before the engine is ready and flips the health status once the
//! engine factory resolves.

pub mod boundary;
pub mod dispatcher;
pub mod lazy;
pub mod service;

pub use boundary::{BoundaryDetector, BoundaryEvent, BoundaryEventKind};
pub use dispatcher::{Dispatcher, SERVICE_NAME};
pub use lazy::LazyVadService;
pub use service::{EngineFactory, VadService, MAX_PCM_CHUNK_BYTES};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
