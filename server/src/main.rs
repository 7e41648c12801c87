//! retrocast server binary.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use retrocast_engine::Engine;
use retrocast_server::{build_router, init_logging, AppState, Args};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let args = Args::parse();
    let config = args.engine_config();
    info!(
        bind = %args.bind,
        core_path = %config.core_path.display(),
        ice_servers = config.ice_servers.len(),
        "retrocast starting"
    );

    let engine = Engine::new(config).context("Failed to create engine")?;
    let forwarder = engine.spawn_input_forwarder();

    let router = build_router(AppState::new(engine.clone()));
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down sessions");
    engine.shutdown().await;
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    info!("retrocast stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
