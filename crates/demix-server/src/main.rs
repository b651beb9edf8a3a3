//! Demix Server - Main entry point

use anyhow::Result;
use demix_common::logging::{init_logging, Component, LogConfig};
use std::time::Duration;
use tracing::info;

use demix_server::{
    api::{self, AppState},
    bootstrap,
    config::Config,
    shutdown,
    worker::{self, Worker},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::for_component(Component::Server).with_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting demix server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Requests fail with 500 and /health reports 503 until the queue answers.
    let queue = bootstrap::connect_queue_or_lazy(&config.queue).await?;

    let store = bootstrap::object_store(&config.storage);
    if let Err(e) = store.ping().await {
        tracing::error!(error = %e, "Object store unreachable at startup");
    }
    bootstrap::ensure_buckets(store.as_ref()).await;

    let cancel = shutdown::shutdown_token();

    let workers = if config.worker.embedded {
        let worker = Worker::from_config(&config.worker, queue.clone(), store.clone())?;
        info!(
            concurrency = config.worker.concurrency,
            "Starting embedded worker loops"
        );
        worker::spawn_workers(&worker, config.worker.concurrency, &cancel)
    } else {
        Vec::new()
    };

    let state = AppState { queue, store };
    api::serve(&config, state, cancel.clone()).await?;

    if !workers.is_empty() {
        let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
        info!("Waiting up to {} seconds for workers to finish", timeout.as_secs());
        match tokio::time::timeout(timeout, worker::join_workers(workers)).await {
            Ok(summary) => info!(
                completed = summary.completed,
                abandoned = summary.abandoned,
                "Embedded workers stopped"
            ),
            Err(_) => tracing::warn!("Embedded workers did not stop in time"),
        }
    }

    info!("Server shut down gracefully");

    Ok(())
}
