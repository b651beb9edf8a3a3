use demix_common::types::{TrackPart, TRACKS_BUCKET};
use serde::{Deserialize, Serialize};

use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveTrackCommand {
    pub job_id: String,
    pub part: TrackPart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveTrackResponse {
    pub message: String,
}

/// Any store failure, including a missing object, is reported as a storage
/// error.
#[derive(Debug, thiserror::Error)]
#[error("Failed to remove track '{part}' for song '{job_id}': {source}")]
pub struct RemoveTrackError {
    pub job_id: String,
    pub part: TrackPart,
    pub source: StorageError,
}

#[tracing::instrument(skip(store), fields(job_id = %command.job_id, part = %command.part))]
pub async fn handle(
    store: &dyn ObjectStore,
    command: RemoveTrackCommand,
) -> Result<RemoveTrackResponse, RemoveTrackError> {
    let key = command.part.object_key(&command.job_id);

    if let Err(source) = store.delete(TRACKS_BUCKET, &key).await {
        return Err(RemoveTrackError {
            job_id: command.job_id,
            part: command.part,
            source,
        });
    }

    Ok(RemoveTrackResponse {
        message: format!(
            "Track '{}' for song '{}' has been removed.",
            command.part, command.job_id
        ),
    })
}
