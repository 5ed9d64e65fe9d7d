//! ocrw CLI - wires stdin/stdout, logging, configuration and the Tesseract
//! backend into the worker loop.

use anyhow::Result;
use tracing::{debug, info};

use ocrw_backend::TesseractBackend;
use ocrw_config::WorkerConfig;
use ocrw_core::{BackendSession, CommandHandler};

pub async fn run() -> Result<()> {
    initialize_logging();

    let config = WorkerConfig::from_env()?;
    debug!("Loaded configuration: {:?}", config);

    let mut handler = CommandHandler::new(build_session(&config));

    info!("ocrw worker ready");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    ocrw_core::serve(&mut handler, stdin, stdout, shutdown_signal()).await
}

// --- Helper functions ---

/// Diagnostics go to stderr; stdout belongs to the protocol.
fn initialize_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(filter)
        .try_init();
}

fn build_session(config: &WorkerConfig) -> BackendSession<TesseractBackend> {
    let mut backend = TesseractBackend::new(config.tesseract_binary.clone());
    if let Some(dir) = &config.tessdata_dir {
        backend = backend.with_tessdata_dir(dir.clone());
    }

    let session = BackendSession::new(backend);
    match &config.staging_dir {
        Some(dir) => session.with_staging_dir(dir.clone()),
        None => session,
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => debug!("Received Ctrl-C"),
        _ = terminate => debug!("Received SIGTERM"),
    }
}
