pub mod get_track;
pub mod list_songs;
pub mod queue_snapshot;

pub use get_track::{GetTrackError, GetTrackQuery, TrackFile};
pub use list_songs::{ListSongsError, ListSongsResponse, SongEntry};
pub use queue_snapshot::QueueSnapshotResponse;
