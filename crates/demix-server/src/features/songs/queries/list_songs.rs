//! List songs query
//!
//! Every object in the tracks bucket becomes one entry, keyed by the job id
//! in the first path segment. A fully separated song therefore appears once
//! per published part.

use demix_common::types::{job_id_from_track_key, TRACKS_BUCKET};
use serde::{Deserialize, Serialize};

use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongEntry {
    pub hash: String,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSongsResponse {
    pub songs: Vec<SongEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListSongsError {
    #[error("Failed to list songs: {0}")]
    Storage(#[from] StorageError),
}

pub async fn handle(store: &dyn ObjectStore) -> Result<ListSongsResponse, ListSongsError> {
    let objects = store.list(TRACKS_BUCKET, None).await?;

    let songs = objects
        .into_iter()
        .map(|obj| SongEntry {
            hash: job_id_from_track_key(&obj.key).to_string(),
            size: obj.size,
        })
        .collect();

    Ok(ListSongsResponse { songs })
}
