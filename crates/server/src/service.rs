//! DetectSpeech stream handling.
//!
//! Each stream gets its own engine instance, boundary detector and config
//! copy, so concurrent streams are fully isolated. The engine is created
//! lazily on the first non-empty PCM chunk, after format and payload
//! validation, so invalid clients never allocate the expensive backend.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, info, warn};

use vad_adapter_config::VadParams;
use vad_adapter_engine::{Engine, EXPECTED_SAMPLE_RATE};
use vad_adapter_proto::v1::{AudioFormat, DetectSpeechRequest, SpeechEvent, SpeechEventType};

use crate::boundary::{BoundaryDetector, BoundaryEvent, BoundaryEventKind};

/// Upper bound on a single PCM chunk. 1 MiB is about 32 seconds at 16 kHz
/// mono s16le. Also enforced at the transport level via the max message
/// size, with headroom for protobuf framing.
pub const MAX_PCM_CHUNK_BYTES: usize = 1 << 20;

/// Per-stream engine factory. Called once per stream on the first PCM
/// chunk; returning `None` terminates the stream with an internal error.
pub type EngineFactory = Arc<dyn Fn() -> Option<Box<dyn Engine>> + Send + Sync>;

/// Outbound event stream type for `DetectSpeech`.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SpeechEvent, Status>> + Send>>;

/// The VAD detection service. Holds the process-wide parameter defaults
/// (immutable after startup) and the per-stream engine factory.
pub struct VadService {
    params: VadParams,
    new_engine: EngineFactory,
}

impl VadService {
    pub fn new(params: VadParams, new_engine: EngineFactory) -> Self {
        Self { params, new_engine }
    }

    /// Open a detection stream: spawn the per-stream worker and hand the
    /// caller the outbound event receiver.
    pub async fn detect_speech(
        &self,
        request: Request<Streaming<DetectSpeechRequest>>,
    ) -> Result<Response<EventStream>, Status> {
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(16);

        let worker = StreamWorker::new(self.params, Arc::clone(&self.new_engine));
        tokio::spawn(worker.run(inbound, tx));

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}

/// Per-stream state machine driving one `DetectSpeech` stream.
struct StreamWorker {
    params: VadParams,
    new_engine: EngineFactory,

    engine: Option<Box<dyn Engine>>,
    detector: Option<BoundaryDetector>,

    // Cached from pre-PCM messages; only formats with sample_rate > 0 are
    // cached so a keepalive with an empty format cannot clobber a valid one.
    cached_format: Option<AudioFormat>,
    // Non-zero once the format handshake completed (first PCM chunk).
    sample_rate: u32,
    frame_duration_ms: u32,

    // Audio-time origin: wall clock at the first non-empty PCM chunk.
    anchor: Option<SystemTime>,
    // Advances by one per engine result, independent of chunk boundaries.
    frame_index: u64,

    // Sticky log-correlation ids; first non-empty value wins.
    session_id: String,
    stream_id: String,
}

impl StreamWorker {
    fn new(params: VadParams, new_engine: EngineFactory) -> Self {
        Self {
            params,
            new_engine,
            engine: None,
            detector: None,
            cached_format: None,
            sample_rate: 0,
            frame_duration_ms: 0,
            anchor: None,
            frame_index: 0,
            session_id: String::new(),
            stream_id: String::new(),
        }
    }

    async fn run(
        mut self,
        mut inbound: Streaming<DetectSpeechRequest>,
        tx: mpsc::Sender<Result<SpeechEvent, Status>>,
    ) {
        if let Err(status) = self.drive(&mut inbound, &tx).await {
            warn!(
                session_id = %self.session_id,
                stream_id = %self.stream_id,
                code = ?status.code(),
                message = status.message(),
                "stream terminated"
            );
            let _ = tx.send(Err(status)).await;
        }
        // Engine resources are released on every exit path.
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }
    }

    async fn drive(
        &mut self,
        inbound: &mut Streaming<DetectSpeechRequest>,
        tx: &mpsc::Sender<Result<SpeechEvent, Status>>,
    ) -> Result<(), Status> {
        loop {
            let request = match inbound.message().await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    // Client half-close: flush a pending END, then finish.
                    return self.flush_eof(tx).await;
                }
                Err(status) => {
                    // Transport error or cancellation: abort without the
                    // synthetic END.
                    warn!(
                        session_id = %self.session_id,
                        stream_id = %self.stream_id,
                        error = %status,
                        "transport error, aborting stream"
                    );
                    return Ok(());
                }
            };
            self.handle_message(request, tx).await?;
        }
    }

    async fn handle_message(
        &mut self,
        request: DetectSpeechRequest,
        tx: &mpsc::Sender<Result<SpeechEvent, Status>>,
    ) -> Result<(), Status> {
        if self.session_id.is_empty() && !request.session_id.is_empty() {
            self.session_id = request.session_id.clone();
        }
        if self.stream_id.is_empty() && !request.stream_id.is_empty() {
            self.stream_id = request.stream_id.clone();
        }

        let format_known = self.sample_rate != 0;
        if !format_known {
            // Cache only fully-specified formats, validating at cache time
            // so invalid fields are rejected before any PCM arrives.
            if let Some(format) = request.format.as_ref() {
                if format.sample_rate > 0 {
                    validate_format(format)?;
                    self.cached_format = Some(format.clone());
                }
            }
        } else if let Some(format) = request.format.as_ref() {
            // After the handshake, every message carrying a format must stay
            // consistent; any change mid-stream is a protocol error.
            validate_format(format)?;
            if format.sample_rate != 0 && format.sample_rate != self.sample_rate {
                return Err(Status::invalid_argument(format!(
                    "sample_rate changed mid-stream: initial={}, got={}",
                    self.sample_rate, format.sample_rate
                )));
            }
        }

        if request.pcm_data.is_empty() {
            // Config-only or keepalive message. Config stays open for
            // updates until the first PCM chunk, then freezes.
            if self.engine.is_none() {
                self.params
                    .apply_json(&request.config_json)
                    .map_err(|e| Status::invalid_argument(format!("stream config: {e}")))?;
            } else if !request.config_json.is_empty() {
                warn!(
                    session_id = %self.session_id,
                    stream_id = %self.stream_id,
                    "config_json ignored after audio started"
                );
            }
            return Ok(());
        }

        // Validate the payload before touching the engine.
        if request.pcm_data.len() % 2 != 0 {
            return Err(Status::invalid_argument(format!(
                "PCM buffer has odd length {} (s16le requires 2 bytes per sample)",
                request.pcm_data.len()
            )));
        }
        if request.pcm_data.len() > MAX_PCM_CHUNK_BYTES {
            return Err(Status::invalid_argument(format!(
                "PCM chunk too large: {} bytes (max {})",
                request.pcm_data.len(),
                MAX_PCM_CHUNK_BYTES
            )));
        }

        if !format_known {
            self.establish_format(&request)?;
        }

        if self.engine.is_none() {
            // First PCM: freeze config, then construct the engine.
            self.params
                .apply_json(&request.config_json)
                .map_err(|e| Status::invalid_argument(format!("stream config: {e}")))?;
            self.init_engine()?;
            info!(
                session_id = %self.session_id,
                stream_id = %self.stream_id,
                sample_rate = self.sample_rate,
                "stream opened"
            );
        } else if !request.config_json.is_empty() {
            warn!(
                session_id = %self.session_id,
                stream_id = %self.stream_id,
                "config_json ignored after audio started"
            );
        }

        // Anchor audio time at the first non-empty PCM chunk.
        let anchor = *self.anchor.get_or_insert_with(SystemTime::now);

        let results = match self.engine.as_mut() {
            Some(engine) => engine
                .process_chunk(&request.pcm_data, self.sample_rate)
                .map_err(|e| {
                    error!(
                        session_id = %self.session_id,
                        stream_id = %self.stream_id,
                        error = %e,
                        "engine error"
                    );
                    Status::internal("audio processing failed")
                })?,
            None => return Err(Status::internal("engine not initialized")),
        };

        let detector = match self.detector.as_mut() {
            Some(detector) => detector,
            None => return Err(Status::internal("boundary detector not initialized")),
        };

        let frame_ms = u64::from(self.frame_duration_ms);
        let mut frame_index = self.frame_index;
        for result in results {
            if let Some(event) = detector.process(result) {
                let at = anchor + Duration::from_millis(frame_index * frame_ms);
                send_event(tx, event, at).await?;
            }
            frame_index += 1;
        }
        self.frame_index = frame_index;

        Ok(())
    }

    /// Resolve the effective audio format on the first PCM chunk.
    fn establish_format(&mut self, request: &DetectSpeechRequest) -> Result<(), Status> {
        // Fields on the accompanying format are always validated, even when
        // the cached format supplies the sample rate, so an invalid
        // encoding cannot hide behind sample_rate=0.
        if let Some(format) = request.format.as_ref() {
            validate_format(format)?;
            if let Some(cached) = self.cached_format.as_ref() {
                if format.sample_rate != 0 && format.sample_rate != cached.sample_rate {
                    return Err(Status::invalid_argument(format!(
                        "sample_rate mismatch: cached={}, request={}",
                        cached.sample_rate, format.sample_rate
                    )));
                }
            }
        }

        let effective = self.cached_format.as_ref().or(request.format.as_ref());
        let format = effective.ok_or_else(|| {
            Status::invalid_argument(
                "audio format required: send format with PCM data or in a prior message",
            )
        })?;
        if format.sample_rate == 0 {
            return Err(Status::invalid_argument(
                "audio format must include sample_rate",
            ));
        }
        self.sample_rate = format.sample_rate;
        Ok(())
    }

    /// Construct the engine and the boundary detector from the frozen
    /// stream config. Called exactly once, after all validation passed.
    fn init_engine(&mut self) -> Result<(), Status> {
        let mut engine = (self.new_engine)()
            .ok_or_else(|| Status::internal("engine creation failed: factory returned nothing"))?;
        engine.set_threshold(self.params.threshold);

        let frame_duration_ms = engine.frame_duration_ms();
        if frame_duration_ms == 0 {
            return Err(Status::internal("engine returned invalid frame duration"));
        }
        self.frame_duration_ms = frame_duration_ms;
        self.detector = Some(BoundaryDetector::new(&self.params, frame_duration_ms));
        self.engine = Some(engine);
        Ok(())
    }

    /// Client half-close: if speech is still open, synthesise the final END
    /// at the next audio-time frame slot.
    async fn flush_eof(
        &mut self,
        tx: &mpsc::Sender<Result<SpeechEvent, Status>>,
    ) -> Result<(), Status> {
        let Some(detector) = self.detector.as_mut() else {
            return Ok(());
        };
        if let Some(event) = detector.flush() {
            let anchor = self.anchor.unwrap_or_else(SystemTime::now);
            let at = anchor
                + Duration::from_millis(self.frame_index * u64::from(self.frame_duration_ms));
            send_event(tx, event, at).await?;
        }
        Ok(())
    }
}

async fn send_event(
    tx: &mpsc::Sender<Result<SpeechEvent, Status>>,
    event: BoundaryEvent,
    at: SystemTime,
) -> Result<(), Status> {
    let kind = match event.kind {
        BoundaryEventKind::Start => SpeechEventType::Start,
        BoundaryEventKind::Ongoing => SpeechEventType::Ongoing,
        BoundaryEventKind::End => SpeechEventType::End,
    };
    tx.send(Ok(SpeechEvent {
        r#type: kind as i32,
        confidence: event.confidence,
        timestamp: Some(prost_types::Timestamp::from(at)),
    }))
    .await
    .map_err(|_| Status::cancelled("client disconnected"))
}

/// Validate every non-zero field of a format against the supported
/// constants. Zero-valued fields mean "unspecified" and pass.
fn validate_format(format: &AudioFormat) -> Result<(), Status> {
    if !format.encoding.is_empty() && format.encoding != "pcm_s16le" {
        return Err(Status::invalid_argument(format!(
            "unsupported encoding {:?}, only pcm_s16le is supported",
            format.encoding
        )));
    }
    if format.channels != 0 && format.channels != 1 {
        return Err(Status::invalid_argument(format!(
            "unsupported channels {}, only mono (1) is supported",
            format.channels
        )));
    }
    if format.bit_depth != 0 && format.bit_depth != 16 {
        return Err(Status::invalid_argument(format!(
            "unsupported bit_depth {}, only 16-bit is supported",
            format.bit_depth
        )));
    }
    if format.sample_rate != 0 && format.sample_rate != EXPECTED_SAMPLE_RATE {
        return Err(Status::invalid_argument(format!(
            "unsupported sample_rate {}, engine requires {}",
            format.sample_rate, EXPECTED_SAMPLE_RATE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_format_accepts_unspecified_fields() {
        let format = AudioFormat {
            sample_rate: 0,
            encoding: String::new(),
            channels: 0,
            bit_depth: 0,
        };
        assert!(validate_format(&format).is_ok());
    }

    #[test]
    fn test_validate_format_accepts_supported_constants() {
        let format = AudioFormat {
            sample_rate: 16_000,
            encoding: "pcm_s16le".to_string(),
            channels: 1,
            bit_depth: 16,
        };
        assert!(validate_format(&format).is_ok());
    }

    #[test]
    fn test_validate_format_rejects_mismatches() {
        let bad_encoding = AudioFormat {
            encoding: "opus".to_string(),
            ..Default::default()
        };
        let status = validate_format(&bad_encoding).unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("encoding"));

        let bad_channels = AudioFormat {
            channels: 2,
            ..Default::default()
        };
        assert!(validate_format(&bad_channels)
            .unwrap_err()
            .message()
            .contains("channels"));

        let bad_depth = AudioFormat {
            bit_depth: 24,
            ..Default::default()
        };
        assert!(validate_format(&bad_depth)
            .unwrap_err()
            .message()
            .contains("bit_depth"));

        let bad_rate = AudioFormat {
            sample_rate: 44_100,
            ..Default::default()
        };
        assert!(validate_format(&bad_rate)
            .unwrap_err()
            .message()
            .contains("sample_rate"));
    }
}
