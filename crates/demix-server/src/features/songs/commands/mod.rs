pub mod remove_track;
pub mod submit;

pub use remove_track::{RemoveTrackCommand, RemoveTrackError, RemoveTrackResponse};
pub use submit::{SubmitSongCommand, SubmitSongError, SubmitSongResponse};
