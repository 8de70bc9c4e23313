//! Error types for Strata.

use thiserror::Error;

/// Top-level error type for Strata operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// World/chunk errors
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// World and chunk errors.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Chunk not resident
    #[error("Chunk not resident at ({x}, {y})")]
    ChunkNotResident {
        /// X coordinate
        x: i32,
        /// Y coordinate
        y: i32,
    },

    /// One or more chunk saves failed
    #[error("Failed to save {failed} chunk(s): {first}")]
    SaveFailed {
        /// Number of failed saves
        failed: usize,
        /// First failure message
        first: String,
    },
}

/// Result type alias for Strata operations.
pub type StrataResult<T> = Result<T, StrataError>;
