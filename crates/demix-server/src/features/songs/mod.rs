//! Song separation API
//!
//! Submitting songs for separation, listing and downloading separated
//! tracks, removing tracks, and inspecting the pending work queue.

pub mod commands;
pub mod queries;
pub mod routes;
pub mod types;

pub use routes::songs_routes;
