//! Demix worker - consumes the work channel and separates songs

use anyhow::Result;
use clap::Parser;
use demix_common::logging::{init_logging, Component, LogConfig};
use tracing::info;

use demix_server::{
    bootstrap,
    config::Config,
    shutdown,
    worker::{self, Worker},
};

#[derive(Parser, Debug)]
#[command(name = "demix-worker", version, about = "Separate queued songs into tracks")]
struct Args {
    /// Number of concurrent worker loops
    #[arg(short, long, env = "WORKER_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Separator command line, without model, output and input arguments
    #[arg(long, env = "SEPARATOR_COMMAND")]
    separator_command: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LogConfig::for_component(Component::Worker).with_env()?;
    let _log_guard = init_logging(&log_config)?;

    let mut config = Config::load()?;
    if let Some(concurrency) = args.concurrency {
        config.worker.concurrency = concurrency;
    }
    if let Some(command) = args.separator_command {
        config.worker.separator_command = command;
    }
    config.validate()?;

    info!(
        concurrency = config.worker.concurrency,
        separator = %config.worker.separator_command,
        model = %config.worker.separator_model,
        "Starting demix worker"
    );

    let queue = bootstrap::connect_queue_or_lazy(&config.queue).await?;
    let store = bootstrap::object_store(&config.storage);

    let worker = Worker::from_config(&config.worker, queue, store)?;
    if !worker.check_backends().await {
        tracing::error!("Starting with unreachable backends");
    }

    let cancel = shutdown::shutdown_token();
    let handles = worker::spawn_workers(&worker, config.worker.concurrency, &cancel);
    let summary = worker::join_workers(handles).await;

    info!(
        completed = summary.completed,
        abandoned = summary.abandoned,
        "Worker shut down gracefully"
    );

    Ok(())
}
