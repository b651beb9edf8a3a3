//! Pipeline event log
//!
//! Worker events go to tracing and are mirrored as `[LEVEL] message` lines
//! onto the log channel, where the log tail picks them up.

use demix_common::types::{format_log_event, LogEventLevel, LOG_CHANNEL};
use std::sync::Arc;

use crate::queue::JobQueue;

#[derive(Clone)]
pub struct QueueLogger {
    queue: Arc<dyn JobQueue>,
}

impl QueueLogger {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        self.push(LogEventLevel::Info, message.as_ref()).await;
    }

    pub async fn error(&self, message: impl AsRef<str>) {
        tracing::error!("{}", message.as_ref());
        self.push(LogEventLevel::Error, message.as_ref()).await;
    }

    async fn push(&self, level: LogEventLevel, message: &str) {
        let line = format_log_event(level, message);
        if let Err(e) = self.queue.enqueue(LOG_CHANNEL, &line).await {
            tracing::warn!(error = %e, "Failed to push event onto log channel");
        }
    }
}
