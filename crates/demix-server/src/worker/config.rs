//! Worker configuration

use serde::{Deserialize, Serialize};

/// Default separator invocation; the model, output directory and input file
/// are appended by [`super::engine::CommandEngine`].
pub const DEFAULT_SEPARATOR_COMMAND: &str = "python3 -m demucs.separate";

pub const DEFAULT_SEPARATOR_MODEL: &str = "htdemucs";

pub const DEFAULT_SEPARATOR_OUTPUT_EXT: &str = "mp3";

pub const DEFAULT_WORKER_CONCURRENCY: usize = 1;

pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Delay before re-polling after the queue itself returned an error.
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of independent consumer loops
    pub concurrency: usize,
    /// Run consumer loops inside the API server process
    pub embedded: bool,
    pub separator_command: String,
    pub separator_model: String,
    /// Extension of the files the separator writes. Tracks are stored and
    /// served as `{part}.mp3`, so only `mp3` is accepted.
    pub separator_output_ext: String,
    pub webhook_timeout_secs: u64,
    pub error_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            embedded: false,
            separator_command: DEFAULT_SEPARATOR_COMMAND.to_string(),
            separator_model: DEFAULT_SEPARATOR_MODEL.to_string(),
            separator_output_ext: DEFAULT_SEPARATOR_OUTPUT_EXT.to_string(),
            webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
            error_backoff_ms: DEFAULT_ERROR_BACKOFF_MS,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency),
            embedded: std::env::var("WORKER_EMBEDDED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.embedded),
            separator_command: std::env::var("SEPARATOR_COMMAND")
                .unwrap_or(defaults.separator_command),
            separator_model: std::env::var("SEPARATOR_MODEL").unwrap_or(defaults.separator_model),
            separator_output_ext: std::env::var("SEPARATOR_OUTPUT_EXT")
                .unwrap_or(defaults.separator_output_ext),
            webhook_timeout_secs: std::env::var("WEBHOOK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.webhook_timeout_secs),
            error_backoff_ms: std::env::var("WORKER_ERROR_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.error_backoff_ms),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("Worker concurrency must be greater than 0");
        }

        if self.separator_command.split_whitespace().next().is_none() {
            anyhow::bail!("Separator command cannot be empty");
        }

        if self.separator_output_ext != "mp3" {
            anyhow::bail!(
                "Separator output extension must be 'mp3', got '{}'",
                self.separator_output_ext
            );
        }

        Ok(())
    }
}
