//! Types shared by the song commands and queries

use demix_common::types::TrackPart;
use serde::Deserialize;

/// Message returned for a missing or unknown `track` parameter.
pub const INVALID_TRACK_MESSAGE: &str =
    "Invalid track name. Must be 'bass', 'vocals', 'drums', or 'other'.";

/// `?track=` query string of the track endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackParams {
    pub track: Option<String>,
}

/// Resolve the requested part name. `None` for a missing or unknown name.
pub fn parse_track(name: Option<&str>) -> Option<TrackPart> {
    name.and_then(|n| n.parse().ok())
}
