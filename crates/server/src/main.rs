//! VAD adapter entry point.
//!
//! Startup order matters: the listener is bound and the gRPC server starts
//! accepting streams before the engine factory is resolved. Until then the
//! detection service answers `Unavailable` and the health service reports
//! `NOT_SERVING`; both flip atomically once the engine is ready.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use vad_adapter_config::{load_settings, EngineKind, Settings};
use vad_adapter_engine::{self as engine, Engine, NativeOptions, StubEngine};
use vad_adapter_server::{Dispatcher, EngineFactory, VadService};

/// Graceful drain budget after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&settings.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        engine = settings.engine.as_str(),
        listen_addr = %settings.listen_addr,
        threshold = settings.threshold,
        min_speech_duration_ms = settings.min_speech_duration_ms,
        min_silence_duration_ms = settings.min_silence_duration_ms,
        "starting adapter"
    );

    if let Err(e) = run(settings).await {
        error!(error = %e, "adapter terminated");
        std::process::exit(1);
    }

    info!("adapter stopped");
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    // Bind the port before engine init so clients can connect immediately.
    let mut dispatcher = Dispatcher::bind(&settings.listen_addr).await?;
    info!(addr = %dispatcher.local_addr(), "listener bound, port ready");
    info!("gRPC server started (NOT_SERVING while initializing)");

    // Resolve the engine factory, then activate the real service and flip
    // health in the same step.
    let (factory, engine_name) = resolve_engine_factory(&settings)?;
    dispatcher
        .activate(VadService::new(settings.vad_params(), factory))
        .await;
    info!(engine = engine_name, "adapter ready to serve requests");

    dispatcher
        .serve_until(shutdown_signal(), SHUTDOWN_GRACE)
        .await?;
    Ok(())
}

/// Resolve the configured engine policy to a per-stream factory.
///
/// `silero` probes the native backend and fails hard if the probe fails.
/// `auto` downgrades to the stub when the backend is not compiled in, or —
/// only in dev mode — when the probe fails.
fn resolve_engine_factory(
    settings: &Settings,
) -> Result<(EngineFactory, &'static str), Box<dyn std::error::Error>> {
    let auto_mode = settings.engine == EngineKind::Auto;

    let use_silero = match settings.engine {
        EngineKind::Silero => {
            if !engine::native_available() {
                return Err(
                    "engine \"silero\" requested but the native backend is not compiled in \
                     (build with --features onnx)"
                        .into(),
                );
            }
            true
        }
        EngineKind::Stub => false,
        EngineKind::Auto => {
            if engine::native_available() {
                true
            } else {
                warn!(
                    "auto-detected engine: stub (silero backend not compiled in, \
                     build with --features onnx for production)"
                );
                false
            }
        }
    };

    if !use_silero {
        return Ok((stub_factory(), "stub"));
    }

    let options = NativeOptions {
        ort_lib_path: settings.ort_lib_path.clone(),
        dev_mode: settings.dev_mode,
    };

    // Probe: verify the native engine can be created before taking traffic.
    match engine::new_native_engine(settings.threshold, &options) {
        Ok(mut probe) => {
            probe.close();
            info!(engine = "silero", "engine ready");
            let threshold = settings.threshold;
            let factory: EngineFactory = Arc::new(move || {
                engine::new_native_engine(threshold, &options)
                    .map_err(|e| error!(error = %e, "per-stream engine creation failed"))
                    .ok()
            });
            Ok((factory, "silero"))
        }
        Err(e) if auto_mode && settings.dev_mode => {
            warn!(error = %e, "native engine probe failed, falling back to stub engine (dev mode)");
            Ok((stub_factory(), "stub"))
        }
        Err(e) => {
            if auto_mode {
                error!("hint: enable dev_mode to allow fallback to the stub engine");
            }
            Err(format!("native engine probe failed: {e}").into())
        }
    }
}

fn stub_factory() -> EngineFactory {
    warn!("using stub engine, VAD results are deterministic and not based on audio content");
    Arc::new(|| Some(Box::new(StubEngine::new()) as Box<dyn Engine>))
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
