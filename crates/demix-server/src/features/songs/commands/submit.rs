//! Submit song command
//!
//! Accepts a base64 encoded MP3, stores it in the songs bucket under a fresh
//! job id and enqueues a descriptor for the workers. Nothing is stored or
//! enqueued unless the payload decodes.

use demix_common::payload::decode_audio;
use demix_common::types::{JobDescriptor, SONGS_BUCKET, SONG_COUNTER};
use demix_common::DemixError;
use serde::{Deserialize, Serialize};

use crate::queue::{enqueue_job, JobQueue, QueueError};
use crate::storage::{ObjectStore, StorageError};

pub const ENQUEUED_REASON: &str = "Song enqueued for separation";

pub const SONG_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitSongCommand {
    pub mp3: Option<String>,
    /// URL to POST to once the song has been separated.
    #[serde(default)]
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitSongResponse {
    pub hash: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitSongError {
    #[error("No MP3 file provided")]
    MissingPayload,
    #[error("Failed to decode MP3 file")]
    InvalidPayload(String),
    #[error("Invalid webhook URL")]
    InvalidWebhook(String),
    #[error("Failed to upload MP3 file to storage")]
    Storage(#[from] StorageError),
    #[error("Failed to enqueue song")]
    Queue(#[from] QueueError),
}

impl SubmitSongError {
    /// Underlying cause, reported as `details` in the error body.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::MissingPayload => None,
            Self::InvalidPayload(reason) | Self::InvalidWebhook(reason) => Some(reason.clone()),
            Self::Storage(e) => Some(e.to_string()),
            Self::Queue(e) => Some(e.to_string()),
        }
    }
}

impl From<DemixError> for SubmitSongError {
    fn from(err: DemixError) -> Self {
        match err {
            DemixError::MissingPayload => Self::MissingPayload,
            DemixError::InvalidPayload(reason) => Self::InvalidPayload(reason),
            other => Self::InvalidPayload(other.to_string()),
        }
    }
}

impl SubmitSongCommand {
    /// Check the request and decode the song. No side effects.
    pub fn validate(&self) -> Result<Vec<u8>, SubmitSongError> {
        let audio = decode_audio(self.mp3.as_deref())?;

        if let Some(webhook) = self.webhook.as_deref().filter(|w| !w.trim().is_empty()) {
            let url = reqwest::Url::parse(webhook)
                .map_err(|e| SubmitSongError::InvalidWebhook(e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SubmitSongError::InvalidWebhook(format!(
                    "Unsupported scheme '{}'",
                    url.scheme()
                )));
            }
        }

        Ok(audio)
    }
}

#[tracing::instrument(skip_all)]
pub async fn handle(
    queue: &dyn JobQueue,
    store: &dyn ObjectStore,
    command: SubmitSongCommand,
) -> Result<SubmitSongResponse, SubmitSongError> {
    let audio = command.validate()?;
    let webhook = command.webhook.filter(|w| !w.trim().is_empty());

    let sequence = queue.next_id(SONG_COUNTER).await?;
    let job = JobDescriptor::new(JobDescriptor::job_id_for(sequence), webhook);

    let stored = store
        .put(SONGS_BUCKET, &job.input_key, audio, Some(SONG_CONTENT_TYPE))
        .await?;
    tracing::info!(
        job_id = %job.job_id,
        key = %stored.key,
        size = stored.size,
        "Song uploaded"
    );

    enqueue_job(queue, &job).await?;

    Ok(SubmitSongResponse {
        hash: job.job_id,
        reason: ENQUEUED_REASON.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::storage::MemoryStorage;
    use demix_common::payload::encode_audio;
    use demix_common::types::WORK_CHANNEL;

    fn command(audio: &[u8]) -> SubmitSongCommand {
        SubmitSongCommand {
            mp3: Some(encode_audio(audio)),
            webhook: None,
        }
    }

    async fn backends() -> (MemoryQueue, MemoryStorage) {
        let store = MemoryStorage::new();
        store.ensure_bucket(SONGS_BUCKET).await.unwrap();
        (MemoryQueue::new(), store)
    }

    #[test]
    fn test_validation_missing_payload() {
        let cmd = SubmitSongCommand::default();
        assert!(matches!(cmd.validate(), Err(SubmitSongError::MissingPayload)));
    }

    #[test]
    fn test_validation_bad_base64() {
        let cmd = SubmitSongCommand {
            mp3: Some("!!not base64!!".to_string()),
            webhook: None,
        };
        assert!(matches!(cmd.validate(), Err(SubmitSongError::InvalidPayload(_))));
    }

    #[test]
    fn test_validation_bad_webhook() {
        let mut cmd = command(b"audio");
        cmd.webhook = Some("ftp://example.com/hook".to_string());
        assert!(matches!(cmd.validate(), Err(SubmitSongError::InvalidWebhook(_))));

        cmd.webhook = Some("not a url".to_string());
        assert!(matches!(cmd.validate(), Err(SubmitSongError::InvalidWebhook(_))));
    }

    #[tokio::test]
    async fn test_submit_stores_and_enqueues() {
        let (queue, store) = backends().await;

        let response = handle(&queue, &store, command(b"audio")).await.unwrap();

        assert_eq!(response.hash, "song_1");
        assert_eq!(response.reason, ENQUEUED_REASON);
        assert_eq!(
            store.get(SONGS_BUCKET, "songs/song_1.mp3").await.unwrap(),
            b"audio"
        );
        let queued = queue.peek_all(WORK_CHANNEL).await.unwrap();
        assert_eq!(queued.len(), 1);
        let job: JobDescriptor = queued[0].parse().unwrap();
        assert_eq!(job, JobDescriptor::new("song_1", None));
    }

    #[tokio::test]
    async fn test_webhook_travels_with_descriptor() {
        let (queue, store) = backends().await;
        let mut cmd = command(b"audio");
        cmd.webhook = Some("http://client.local/done".to_string());

        handle(&queue, &store, cmd).await.unwrap();

        let job: JobDescriptor = queue.peek_all(WORK_CHANNEL).await.unwrap()[0]
            .parse()
            .unwrap();
        assert_eq!(job.callback_url.as_deref(), Some("http://client.local/done"));
    }

    #[tokio::test]
    async fn test_storage_failure_enqueues_nothing() {
        let (queue, store) = backends().await;
        store.set_fail_puts(true);

        let err = handle(&queue, &store, command(b"audio")).await.unwrap_err();

        assert!(matches!(err, SubmitSongError::Storage(_)));
        assert_eq!(queue.len(WORK_CHANNEL).await.unwrap(), 0);

        // The consumed id is not reused.
        store.set_fail_puts(false);
        let response = handle(&queue, &store, command(b"audio")).await.unwrap();
        assert_eq!(response.hash, "song_2");
    }

    #[tokio::test]
    async fn test_invalid_payload_has_no_side_effects() {
        let (queue, store) = backends().await;
        let ops_before = store.operation_count();

        let cmd = SubmitSongCommand {
            mp3: Some(String::new()),
            webhook: None,
        };
        assert!(handle(&queue, &store, cmd).await.is_err());

        assert_eq!(store.operation_count(), ops_before);
        assert_eq!(queue.next_id(SONG_COUNTER).await.unwrap(), 1);
    }
}
