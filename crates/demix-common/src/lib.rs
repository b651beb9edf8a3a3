//! Demix Common Library
//!
//! Shared types, utilities, and error handling for the demix workspace.
//!
//! # Overview
//!
//! - **Error Handling**: `DemixError` and the `Result` alias
//! - **Types**: job descriptors, track parts, bucket and channel names
//! - **Payload**: base64 decoding of uploaded audio
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use demix_common::types::{JobDescriptor, TrackPart};
//!
//! let job = JobDescriptor::new("song_1", None);
//! assert_eq!(job.input_key, "songs/song_1.mp3");
//! assert_eq!(TrackPart::Bass.object_key(&job.job_id), "song_1/bass.mp3");
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod payload;
pub mod types;

// Re-export commonly used types
pub use error::{DemixError, Result};
