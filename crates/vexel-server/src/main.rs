//! vexel-server binary.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vexel_server::{AppState, ImageCrateProcessor, Orchestrator, ServerConfig, VtracerTracer};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    let orchestrator = Orchestrator::new(
        Arc::new(ImageCrateProcessor),
        Arc::new(VtracerTracer::default()),
        config.timeout(),
    );
    let addr = config.addr;
    info!(
        %addr,
        max_upload_bytes = config.max_upload_bytes,
        timeout_secs = config.timeout_secs,
        "starting vexel-server"
    );

    let app = vexel_server::create_app(AppState {
        orchestrator,
        config,
    });
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
