//! hf-server: HTTP API and background transcoding.
//!
//! This crate ties the other hf-* crates into a running server:
//!
//! - Axum routes for upload, delete, HLS playback, status and SSE events
//! - [`scheduler::TranscodeScheduler`], one cancellable transcode per media ID
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod scheduler;

use std::net::SocketAddr;
use std::sync::Arc;

use hf_av::{FfmpegTranscoder, ToolRegistry, Transcoder};
use hf_core::config::Config;

use crate::context::AppContext;

/// Start the hlsforge server.
///
/// Discovers ffmpeg, builds the [`AppContext`] and serves HTTP until a
/// shutdown signal arrives, then cancels and waits for running transcodes.
pub async fn start(config: Config) -> hf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let tools = ToolRegistry::discover(&config.tools);
    // Version detection runs each tool synchronously.
    let registry = tools.clone();
    let infos = tokio::task::spawn_blocking(move || registry.check_all())
        .await
        .map_err(|e| hf_core::Error::Internal(format!("Tool check failed: {e}")))?;
    for info in infos {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::debug!("Tool not found: {}", info.name);
        }
    }

    let transcoder: Arc<dyn Transcoder> = match FfmpegTranscoder::new(&tools, config.transcode.clone()) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            // Keep serving; every transcode will be recorded as failed.
            tracing::warn!("{e}; uploads will fail to transcode until ffmpeg is installed");
            let fallback = tools.clone().with_tool("ffmpeg", "ffmpeg");
            Arc::new(FfmpegTranscoder::new(&fallback, config.transcode.clone())?)
        }
    };

    let media_root = &config.storage.media_root;
    tokio::fs::create_dir_all(media_root)
        .await
        .map_err(|e| hf_core::Error::storage("create media root", media_root, e))?;
    tracing::info!("Media root: {}", media_root.display());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| hf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, tools, transcoder);
    let app = router::build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| hf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| hf_core::Error::Internal(format!("Server error: {e}")))?;

    ctx.scheduler.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
