//! Swarmcast Core - Playback-aware scheduling over a content swarm
//!
//! This crate provides the building blocks for streaming media out of a
//! swarm that is still being downloaded: the engine capability traits, the
//! session registry, the piece priority scheduler, the media type table and
//! the session lifecycle controller.

pub mod config;
pub mod engine;
pub mod media;
pub mod scheduler;
pub mod session;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{ConfigError, SwarmcastConfig};
pub use engine::{EngineError, InfoHash, MagnetLink, PieceIndex, SwarmEngine, SwarmHandle};
pub use scheduler::{PriorityBand, PriorityPlan, PriorityScheduler};
pub use session::{SessionController, SessionError, SessionRegistry, SwarmSession};

/// Core errors that can bubble up from any Swarmcast subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SwarmcastError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmcastError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SwarmcastError::Session(e) => match e {
                SessionError::NotFound { id } => format!("Torrent {id} not found"),
                SessionError::MetadataTimeout { timeout } => format!(
                    "Timeout waiting for torrent info ({}s). The torrent may have few seeders or network issues.",
                    timeout.as_secs()
                ),
                SessionError::InvalidMagnet { reason } => format!("Invalid magnet link: {reason}"),
                SessionError::InvalidFileIndex { index, file_count } => {
                    format!("File index {index} out of range ({file_count} files)")
                }
                SessionError::Engine(_) => "Swarm engine error occurred".to_string(),
            },
            SwarmcastError::Engine(_) => "Swarm engine error occurred".to_string(),
            SwarmcastError::Configuration(e) => format!("Configuration error: {e}"),
            SwarmcastError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SwarmcastError::Configuration(_)
                | SwarmcastError::Session(SessionError::InvalidMagnet { .. })
                | SwarmcastError::Session(SessionError::InvalidFileIndex { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SwarmcastError>;
