//! Error types for demix

use thiserror::Error;

/// Result type alias for demix operations
pub type Result<T> = std::result::Result<T, DemixError>;

/// Main error type shared by the demix crates
#[derive(Error, Debug)]
pub enum DemixError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No MP3 file provided")]
    MissingPayload,

    #[error("Failed to decode MP3 file: {0}")]
    InvalidPayload(String),

    #[error("Invalid track name '{0}'. Must be 'bass', 'vocals', 'drums', or 'other'.")]
    InvalidTrack(String),

    #[error("Job descriptor is missing required field '{0}'")]
    MissingField(&'static str),
}
