//! Common types used across demix

use serde::{Deserialize, Serialize};

use crate::error::DemixError;

// ============================================================================
// Storage and Queue Names
// ============================================================================

/// Bucket holding uploaded input songs.
pub const SONGS_BUCKET: &str = "songs";

/// Bucket holding separated per-instrument tracks.
pub const TRACKS_BUCKET: &str = "separated-tracks";

/// Channel carrying job descriptors from the API to workers.
pub const WORK_CHANNEL: &str = "toWorker";

/// Side channel carrying free-text log lines.
pub const LOG_CHANNEL: &str = "logging";

/// Counter used to assign job ids.
pub const SONG_COUNTER: &str = "song_count";

// ============================================================================
// Job Descriptor
// ============================================================================

/// Descriptor identifying one unit of queued separation work.
///
/// Serialized field names match the wire format consumed by workers:
/// `{"songhash": ..., "song_key": ..., "webhook": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(rename = "songhash")]
    pub job_id: String,

    #[serde(rename = "song_key")]
    pub input_key: String,

    #[serde(rename = "webhook", default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

impl JobDescriptor {
    /// Build a descriptor for a freshly stored song.
    pub fn new(job_id: impl Into<String>, callback_url: Option<String>) -> Self {
        let job_id = job_id.into();
        Self {
            input_key: input_key(&job_id),
            job_id,
            callback_url,
        }
    }

    /// Job id for the `n`-th value of the song counter.
    pub fn job_id_for(sequence: u64) -> String {
        format!("song_{}", sequence)
    }
}

/// Object key of the input artifact for a job.
pub fn input_key(job_id: &str) -> String {
    format!("songs/{}.mp3", job_id)
}

/// Descriptor as read off the queue, before validation.
///
/// Every field is optional so a malformed message can be reported as a
/// validation failure instead of a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobDescriptor {
    pub songhash: Option<String>,
    pub song_key: Option<String>,
    pub webhook: Option<String>,
}

impl TryFrom<RawJobDescriptor> for JobDescriptor {
    type Error = DemixError;

    fn try_from(raw: RawJobDescriptor) -> Result<Self, Self::Error> {
        let job_id = raw
            .songhash
            .filter(|s| !s.trim().is_empty())
            .ok_or(DemixError::MissingField("songhash"))?;
        let input_key = raw
            .song_key
            .filter(|s| !s.trim().is_empty())
            .ok_or(DemixError::MissingField("song_key"))?;

        Ok(Self {
            job_id,
            input_key,
            callback_url: raw.webhook.filter(|s| !s.trim().is_empty()),
        })
    }
}

impl std::str::FromStr for JobDescriptor {
    type Err = DemixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawJobDescriptor = serde_json::from_str(s)?;
        raw.try_into()
    }
}

// ============================================================================
// Track Parts
// ============================================================================

/// One named output part produced by the separation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackPart {
    Bass,
    Drums,
    Vocals,
    Other,
}

impl TrackPart {
    /// Every part a completed job is expected to publish, in upload order.
    pub const ALL: [TrackPart; 4] = [
        TrackPart::Bass,
        TrackPart::Drums,
        TrackPart::Vocals,
        TrackPart::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackPart::Bass => "bass",
            TrackPart::Drums => "drums",
            TrackPart::Vocals => "vocals",
            TrackPart::Other => "other",
        }
    }

    /// Object key of this part for a job in the tracks bucket.
    pub fn object_key(self, job_id: &str) -> String {
        format!("{}/{}.mp3", job_id, self.as_str())
    }

    /// File name used when the part is downloaded.
    pub fn file_name(self) -> String {
        format!("{}.mp3", self.as_str())
    }
}

impl std::fmt::Display for TrackPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackPart {
    type Err = DemixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bass" => Ok(TrackPart::Bass),
            "drums" => Ok(TrackPart::Drums),
            "vocals" => Ok(TrackPart::Vocals),
            "other" => Ok(TrackPart::Other),
            _ => Err(DemixError::InvalidTrack(s.to_string())),
        }
    }
}

/// Extract the job id from a key in the tracks bucket (`{job_id}/{part}.mp3`).
pub fn job_id_from_track_key(key: &str) -> &str {
    key.split('/').next().unwrap_or(key)
}

// ============================================================================
// Log Events
// ============================================================================

/// Severity prefix of a line pushed onto the log channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventLevel {
    Info,
    Error,
}

impl LogEventLevel {
    pub fn prefix(self) -> &'static str {
        match self {
            LogEventLevel::Info => "[INFO]",
            LogEventLevel::Error => "[ERROR]",
        }
    }
}

/// Format a free-text log line for the log channel.
pub fn format_log_event(level: LogEventLevel, message: &str) -> String {
    format!("{} {}", level.prefix(), message)
}
