//! Gateway server binary: the sole writer of persisted entities, task
//! creation endpoint, SSE progress bridge, and worker webhook receiver.

use std::time::Duration;

use conveyor_gateway::{routes, AppState};
use conveyor_shared::config::ConveyorConfig;
use conveyor_shared::logging;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    info!("Starting conveyor gateway...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let environment = std::env::var("CONVEYOR_ENV").unwrap_or_else(|_| "development".into());
    let config = ConveyorConfig::load(&environment)?;
    let shutdown_timeout = config.shutdown_timeout();

    let state = AppState::bootstrap(config).await?;
    let app = routes::router(state);

    let bind_addr = std::env::var("CONVEYOR_GATEWAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Gateway listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    match tokio::time::timeout(shutdown_timeout, server).await {
        Ok(Ok(())) => info!("Gateway shut down cleanly"),
        Ok(Err(e)) => error!("Gateway server error: {e}"),
        Err(_) => error!(
            timeout_ms = shutdown_timeout.as_millis() as u64,
            "Graceful shutdown timed out, forcing exit"
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
