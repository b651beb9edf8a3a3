//! Demix logs - prints the worker log channel as it fills

use anyhow::Result;
use clap::Parser;
use demix_common::logging::{init_logging, Component, LogConfig};
use std::io::Write;
use std::time::Duration;

use demix_server::{bootstrap, logtail, queue::QueueConfig, shutdown};

#[derive(Parser, Debug)]
#[command(name = "demix-logs", version, about = "Follow the demix worker log channel")]
struct Args {
    /// Prefix each line with the local time it was received
    #[arg(short, long)]
    timestamps: bool,

    /// Delay before retrying after a queue error, in milliseconds
    #[arg(long, default_value_t = 1000)]
    retry_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    // Diagnostics go to stderr; stdout carries the log lines.
    let log_config = LogConfig::for_component(Component::LogTail).with_env()?;
    let _log_guard = init_logging(&log_config)?;

    let queue_config = QueueConfig::from_env();
    queue_config.validate()?;

    let queue = bootstrap::connect_queue_or_lazy(&queue_config).await?;
    let cancel = shutdown::shutdown_token();

    let stdout = std::io::stdout();
    logtail::tail(
        queue.as_ref(),
        &cancel,
        Duration::from_millis(args.retry_ms),
        |line| {
            let mut out = stdout.lock();
            let written = if args.timestamps {
                writeln!(out, "{} {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"), line)
            } else {
                writeln!(out, "{}", line)
            };
            if let Err(e) = written.and_then(|_| out.flush()) {
                tracing::warn!(error = %e, "Failed to write log line");
            }
        },
    )
    .await;

    Ok(())
}
