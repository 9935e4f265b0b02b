//! Deferred service activation.
//!
//! The listening socket is bound before the engine factory is resolved, so
//! early RPCs must be answered. This wrapper holds an atomically replaceable
//! pointer to the real service: while unset, every call is rejected with
//! `Unavailable`; once activated, calls delegate.

use std::sync::Arc;

use parking_lot::RwLock;
use tonic::{Request, Response, Status, Streaming};

use vad_adapter_proto::v1::voice_activity_detection_service_server::VoiceActivityDetectionService;
use vad_adapter_proto::v1::DetectSpeechRequest;

use crate::service::{EventStream, VadService};

/// Lazily-activated front for [`VadService`].
#[derive(Clone, Default)]
pub struct LazyVadService {
    inner: Arc<RwLock<Option<Arc<VadService>>>>,
}

impl LazyVadService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the real service; subsequent RPCs delegate to it.
    pub fn activate(&self, service: VadService) {
        *self.inner.write() = Some(Arc::new(service));
    }
}

#[tonic::async_trait]
impl VoiceActivityDetectionService for LazyVadService {
    type DetectSpeechStream = EventStream;

    async fn detect_speech(
        &self,
        request: Request<Streaming<DetectSpeechRequest>>,
    ) -> Result<Response<Self::DetectSpeechStream>, Status> {
        // Clone the pointer out so the guard never lives across an await.
        let service = self.inner.read().clone();
        match service {
            Some(service) => service.detect_speech(request).await,
            None => Err(Status::unavailable(
                "VAD service is initializing, please retry in a moment",
            )),
        }
    }
}
