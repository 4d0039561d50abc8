//! stm-server: the HTTP face of servetome.
//!
//! Serves the library browsing endpoints and the HLS stream and session
//! endpoints on top of [`stm_stream::SessionRegistry`], and shuts down
//! cleanly on SIGINT/SIGTERM.

pub mod context;
pub mod error;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stm_av::{FfprobeProbe, MetadataProbe, ToolRegistry};
use stm_core::config::Config;
use tokio::signal;

use crate::context::AppContext;

/// Start the servetome server and run until a shutdown signal arrives.
pub async fn start(config: Config) -> stm_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Discover external tools.
    let tools = ToolRegistry::discover(&config.tools);
    for info in tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let probe: Arc<dyn MetadataProbe> = Arc::new(
        FfprobeProbe::new(tools.require("ffprobe")?.to_path_buf())
            .with_timeout(Duration::from_secs(config.tools.probe_timeout_secs)),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| stm_core::Error::Internal(format!("Invalid server address: {e}")))?;

    tokio::fs::create_dir_all(&config.transcode.root_dir).await?;
    tracing::info!(
        "Transcoding into {} ({}s segments, {} ahead)",
        config.transcode.root_dir.display(),
        config.transcode.segment_seconds,
        config.transcode.readahead_segments
    );

    let ctx = AppContext::new(config, tools, probe)?;
    let app = router::build_router(ctx);

    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| stm_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
