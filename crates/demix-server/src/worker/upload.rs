//! Artifact publication
//!
//! Each separated part is uploaded on its own. A missing or failing part is
//! logged and skipped; the others still go up. Uploads overwrite by key, so
//! publishing the same job twice leaves one object per part.

use demix_common::types::{TrackPart, TRACKS_BUCKET};

use super::engine::SeparatedOutput;
use super::events::QueueLogger;
use crate::storage::ObjectStore;

pub const TRACK_CONTENT_TYPE: &str = "audio/mpeg";

/// Per-part result of publishing one job's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<TrackPart>,
    pub missing: Vec<TrackPart>,
    pub failed: Vec<(TrackPart, String)>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.uploaded.len() == TrackPart::ALL.len()
    }
}

pub async fn upload_parts(
    store: &dyn ObjectStore,
    log: &QueueLogger,
    job_id: &str,
    output: &SeparatedOutput,
) -> UploadReport {
    let mut report = UploadReport::default();

    for part in TrackPart::ALL {
        let path = output.part_path(part);

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            log.error(format!(
                "Track {} not found for song {} at {}",
                part,
                job_id,
                path.display()
            ))
            .await;
            report.missing.push(part);
            continue;
        }

        let key = part.object_key(job_id);
        match store
            .put_file(TRACKS_BUCKET, &key, &path, Some(TRACK_CONTENT_TYPE))
            .await
        {
            Ok(result) => {
                tracing::debug!(part = %part, key = %key, size = result.size, "Uploaded track");
                log.info(format!("Uploaded {} track for song {}", part, job_id))
                    .await;
                report.uploaded.push(part);
            },
            Err(e) => {
                log.error(format!(
                    "Error uploading {} track for song {}: {}",
                    part, job_id, e
                ))
                .await;
                report.failed.push((part, e.to_string()));
            },
        }
    }

    report
}
