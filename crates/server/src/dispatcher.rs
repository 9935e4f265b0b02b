//! Server bootstrap and lifecycle.
//!
//! The listener is bound and the gRPC server starts accepting streams
//! before the engine factory resolves. Until [`Dispatcher::activate`] is
//! called, detection RPCs answer `Unavailable` and the health service
//! reports `NOT_SERVING`; activation flips both in one step.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::server::NamedService;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;
use tracing::{info, warn};

use vad_adapter_proto::v1::voice_activity_detection_service_server::VoiceActivityDetectionServiceServer;

use crate::{LazyVadService, ServerError, VadService, MAX_PCM_CHUNK_BYTES};

/// Fully-qualified detection service name, as reported via gRPC health.
pub const SERVICE_NAME: &str =
    <VoiceActivityDetectionServiceServer<LazyVadService> as NamedService>::NAME;

/// Owns the serving task, the lazily-activated detection service and the
/// health reporter for one adapter process.
pub struct Dispatcher {
    addr: SocketAddr,
    lazy: LazyVadService,
    health: HealthReporter,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl Dispatcher {
    /// Bind the listener and start serving immediately.
    ///
    /// Inbound messages are capped at [`MAX_PCM_CHUNK_BYTES`] plus headroom
    /// for protobuf framing.
    pub async fn bind(listen_addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: listen_addr.to_string(),
            source,
        })?;

        let (mut health, health_service) = tonic_health::server::health_reporter();
        health
            .set_service_status("", ServingStatus::NotServing)
            .await;
        health
            .set_service_status(SERVICE_NAME, ServingStatus::NotServing)
            .await;

        let lazy = LazyVadService::new();
        let vad_service = VoiceActivityDetectionServiceServer::new(lazy.clone())
            .max_decoding_message_size(MAX_PCM_CHUNK_BYTES + 64 * 1024);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(
            Server::builder()
                .add_service(health_service)
                .add_service(vad_service)
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                }),
        );

        Ok(Self {
            addr,
            lazy,
            health,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    /// Local address of the bound listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Install the real detection service and flip health to `SERVING`.
    pub async fn activate(&mut self, service: VadService) {
        self.lazy.activate(service);
        self.health
            .set_service_status("", ServingStatus::Serving)
            .await;
        self.health
            .set_service_status(SERVICE_NAME, ServingStatus::Serving)
            .await;
    }

    /// Serve until `signal` completes or the server fails on its own.
    ///
    /// On the signal, health drops to `NOT_SERVING` and in-flight streams
    /// get `grace` to drain before a forced stop.
    pub async fn serve_until(
        mut self,
        signal: impl Future<Output = ()>,
        grace: Duration,
    ) -> Result<(), ServerError> {
        tokio::select! {
            // The serving task only finishes on its own when serving failed.
            result = &mut self.task => result??,
            _ = signal => {
                info!("shutdown requested, stopping gRPC server");
                self.health
                    .set_service_status(SERVICE_NAME, ServingStatus::NotServing)
                    .await;
                self.health
                    .set_service_status("", ServingStatus::NotServing)
                    .await;

                if let Some(tx) = self.shutdown_tx.take() {
                    let _ = tx.send(());
                }
                match tokio::time::timeout(grace, &mut self.task).await {
                    Ok(result) => result??,
                    Err(_) => {
                        warn!("graceful stop timed out, forcing stop");
                        self.task.abort();
                    }
                }
            }
        }
        Ok(())
    }
}
