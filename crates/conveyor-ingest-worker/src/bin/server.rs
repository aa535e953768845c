//! Ingest worker binary: consumes `file_processing_queue` and runs file
//! upload, crawl, delete, and recrawl tasks against the vector store.

use std::sync::Arc;

use conveyor_ingest_worker::{consumer, IngestWorkerState};
use conveyor_shared::config::ConveyorConfig;
use conveyor_shared::logging;
use conveyor_shared::messaging::MessageBus;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();

    info!("Starting conveyor ingest worker...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));

    let environment = std::env::var("CONVEYOR_ENV").unwrap_or_else(|_| "development".into());
    let config = ConveyorConfig::load(&environment)?;
    let shutdown_timeout = config.shutdown_timeout();
    let prefetch = config.bus.prefetch;
    let file_queue = config.bus.file_queue.clone();

    let amqp_url = config.resolve_secret(&config.bus.url_env)?;
    let webhook_secret = config.resolve_secret(&config.webhook.secret_env)?;
    let gateway_url = std::env::var("CONVEYOR_GATEWAY_WEBHOOK_URL")
        .unwrap_or_else(|_| "http://localhost:8080".into());

    let worker = Arc::new(IngestWorkerState::bootstrap(config).await?);
    let bus = MessageBus::connect(&amqp_url).await?;

    let consumer_loop = tokio::spawn(consumer::run(
        worker,
        bus,
        file_queue,
        gateway_url,
        webhook_secret,
        prefetch,
    ));

    tokio::select! {
        _ = shutdown_signal() => info!("Ingest worker shutting down"),
        result = consumer_loop => {
            match result {
                Ok(Ok(())) => info!("Consumer loop exited"),
                Ok(Err(e)) => error!("Consumer loop error: {e}"),
                Err(e) => error!("Consumer task panicked: {e}"),
            }
        }
    }

    let _ = tokio::time::timeout(shutdown_timeout, tokio::task::yield_now()).await;

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
