//! Completion webhooks
//!
//! Delivery is best effort and at most once: one POST, no retry, and the
//! outcome is reported back as a value instead of an error.

use serde::Serialize;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompletionPayload<'a> {
    pub status: &'static str,
    pub song_hash: &'a str,
}

impl<'a> CompletionPayload<'a> {
    pub fn completed(job_id: &'a str) -> Self {
        Self {
            status: "completed",
            song_hash: job_id,
        }
    }
}

/// What happened to a completion notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The job had no callback URL.
    Skipped,
    /// The callback answered; any HTTP status counts as delivered.
    Delivered { status: u16 },
    /// The request could not be sent or timed out.
    Failed { reason: String },
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    #[instrument(skip(self))]
    pub async fn notify(&self, callback_url: Option<&str>, job_id: &str) -> NotifyOutcome {
        let Some(url) = callback_url else {
            return NotifyOutcome::Skipped;
        };

        match self
            .client
            .post(url)
            .json(&CompletionPayload::completed(job_id))
            .send()
            .await
        {
            Ok(response) => NotifyOutcome::Delivered {
                status: response.status().as_u16(),
            },
            Err(e) => NotifyOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}
