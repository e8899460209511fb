//! Session lifecycle errors

use std::time::Duration;

use crate::engine::EngineError;

/// Errors from session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Timeout waiting for swarm metadata after {}s", timeout.as_secs())]
    MetadataTimeout { timeout: Duration },

    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("File index {index} out of range ({file_count} files)")]
    InvalidFileIndex { index: usize, file_count: usize },

    #[error("Engine error: {0}")]
    Engine(EngineError),
}

impl From<EngineError> for SessionError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::InvalidMagnet { reason } => SessionError::InvalidMagnet { reason },
            EngineError::FileIndexOutOfRange { index, file_count } => {
                SessionError::InvalidFileIndex { index, file_count }
            }
            other => SessionError::Engine(other),
        }
    }
}

impl SessionError {
    /// Whether the error stems from malformed caller input.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidMagnet { .. } | SessionError::InvalidFileIndex { .. }
        )
    }
}
