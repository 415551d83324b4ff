//! This module contains the error types for the persistence layer.

use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Reading or writing the state file failed.
    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The state could not be serialized or deserialized.
    #[error("Failed to serialize or deserialize state: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The state file was written with an unknown layout version.
    #[error("Unsupported state version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}
