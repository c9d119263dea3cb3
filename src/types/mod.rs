//! Shared types for Checkpoint

pub mod error;

pub use error::{CheckpointError, Result};
