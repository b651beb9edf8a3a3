//! Get track query
//!
//! Opens one separated part of a song in the tracks bucket for streaming.

use demix_common::types::{TrackPart, TRACKS_BUCKET};
use serde::{Deserialize, Serialize};

use crate::storage::{ObjectStore, ObjectStream, StorageError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTrackQuery {
    pub job_id: String,
    pub part: TrackPart,
}

pub struct TrackFile {
    pub file_name: String,
    pub body: ObjectStream,
}

#[derive(Debug, thiserror::Error)]
pub enum GetTrackError {
    #[error("Track '{part}' for song '{job_id}' not found.")]
    NotFound { job_id: String, part: TrackPart },
    #[error("Failed to fetch track: {0}")]
    Storage(StorageError),
}

#[tracing::instrument(skip(store), fields(job_id = %query.job_id, part = %query.part))]
pub async fn handle(store: &dyn ObjectStore, query: GetTrackQuery) -> Result<TrackFile, GetTrackError> {
    let key = query.part.object_key(&query.job_id);

    match store.get_stream(TRACKS_BUCKET, &key).await {
        Ok(body) => Ok(TrackFile {
            file_name: query.part.file_name(),
            body,
        }),
        Err(e) if e.is_not_found() || matches!(e, StorageError::BucketNotFound(_)) => {
            Err(GetTrackError::NotFound {
                job_id: query.job_id,
                part: query.part,
            })
        },
        Err(e) => Err(GetTrackError::Storage(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_fetch_existing_track() {
        let store = MemoryStorage::new();
        store.ensure_bucket(TRACKS_BUCKET).await.unwrap();
        store
            .put(TRACKS_BUCKET, "song_1/vocals.mp3", b"la la".to_vec(), None)
            .await
            .unwrap();

        let file = handle(
            &store,
            GetTrackQuery {
                job_id: "song_1".to_string(),
                part: TrackPart::Vocals,
            },
        )
        .await
        .unwrap();
        let chunks: Vec<_> = file.body.try_collect().await.unwrap();

        assert_eq!(file.file_name, "vocals.mp3");
        assert_eq!(chunks.concat(), b"la la");
    }

    #[tokio::test]
    async fn test_missing_track_is_not_found() {
        let store = MemoryStorage::new();
        store.ensure_bucket(TRACKS_BUCKET).await.unwrap();

        let err = handle(
            &store,
            GetTrackQuery {
                job_id: "song_1".to_string(),
                part: TrackPart::Other,
            },
        )
        .await
        .err()
        .unwrap();

        assert_eq!(err.to_string(), "Track 'other' for song 'song_1' not found.");
    }
}
