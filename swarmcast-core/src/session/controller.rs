//! Session lifecycle: add, remove, status, position updates and shutdown

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::registry::Insertion;
use super::swarm::{FileEntry, file_entries, select_stream_file};
use super::{SessionError, SessionRegistry, SwarmSession};
use crate::config::SwarmcastConfig;
use crate::engine::{InfoHash, MagnetLink, SwarmEngine};
use crate::scheduler::PriorityPlan;

/// Result of adding a swarm.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedSwarm {
    #[serde(rename = "torrentId")]
    pub id: String,
    pub name: String,
    pub stream_url: String,
    pub file_index: usize,
    pub files: Vec<FileEntry>,
    /// The swarm was already active and no join happened
    #[serde(skip)]
    pub already_active: bool,
}

/// Download state reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmState {
    Downloading,
    Completed,
}

impl SwarmState {
    /// Completed iff every byte is local and there is something to download.
    pub fn from_progress(completed: u64, total: u64) -> Self {
        if total > 0 && completed >= total {
            SwarmState::Completed
        } else {
            SwarmState::Downloading
        }
    }
}

/// Per-session status row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmStatus {
    pub id: String,
    pub name: String,
    /// Percent of bytes completed, 0 when the total is unknown
    pub progress: f64,
    #[serde(rename = "status")]
    pub state: SwarmState,
    pub download_speed: u64,
    pub upload_speed: u64,
}

/// Outcome of a playback position update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackUpdate {
    #[serde(rename = "torrentId")]
    pub id: String,
    pub file_index: usize,
    #[serde(flatten)]
    pub plan: PriorityPlan,
}

/// Coordinates the engine, the registry and per-session schedulers.
pub struct SessionController {
    engine: Arc<dyn SwarmEngine>,
    registry: Arc<SessionRegistry>,
    config: SwarmcastConfig,
}

impl SessionController {
    pub fn new(engine: Arc<dyn SwarmEngine>, config: SwarmcastConfig) -> Self {
        Self {
            engine,
            registry: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SwarmcastConfig {
        &self.config
    }

    /// Joins a swarm and publishes a streamable session for it.
    ///
    /// Adding a swarm that is already active returns the existing session
    /// without joining again.
    ///
    /// # Errors
    /// - `SessionError::InvalidMagnet` - Magnet URI did not parse
    /// - `SessionError::InvalidFileIndex` - Explicit file index out of bounds
    /// - `SessionError::MetadataTimeout` - Metadata did not arrive in time
    /// - `SessionError::Engine` - The engine failed to join
    pub async fn add_swarm(
        &self,
        magnet_uri: &str,
        explicit_file_index: Option<usize>,
    ) -> Result<AddedSwarm, SessionError> {
        let magnet = MagnetLink::parse(magnet_uri)?;

        if let Some(existing) = self.registry.get(&magnet.info_hash) {
            let file_index = match explicit_file_index {
                Some(_) => select_stream_file(existing.files(), explicit_file_index)?,
                None => existing.selected_file_index(),
            };
            info!("Swarm {} already active", existing.id());
            return Ok(self.added(&existing, file_index, true));
        }

        info!(
            "Joining swarm {} ({})",
            magnet.info_hash,
            magnet.fallback_name()
        );
        let handle = self.engine.join(&magnet).await?;

        let timeout = self.config.session.metadata_timeout;
        let metadata = match tokio::time::timeout(timeout, handle.wait_for_metadata()).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                tracing::error!("Metadata retrieval for {} failed: {}", magnet.info_hash, e);
                handle.release();
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for metadata of {}",
                    timeout, magnet.info_hash
                );
                handle.release();
                return Err(SessionError::MetadataTimeout { timeout });
            }
        };

        let file_index = match select_stream_file(&file_entries(&metadata), explicit_file_index) {
            Ok(index) => index,
            Err(e) => {
                handle.release();
                return Err(e);
            }
        };

        let session = SwarmSession::new(
            handle,
            &metadata,
            file_index,
            self.config.scheduler.clone(),
        )?;
        if !session.files().is_empty() {
            session.update_playback_position(file_index, 0)?;
        }

        let session = match self.registry.insert_if_absent(session) {
            Insertion::Inserted(session) => {
                info!(
                    "Swarm {} ready: {} ({} files, streaming file {})",
                    session.id(),
                    session.name(),
                    session.files().len(),
                    file_index
                );
                session
            }
            Insertion::Existing(existing) => {
                // Lost a concurrent add for the same swarm; our handle was released on drop
                info!("Swarm {} was added concurrently", existing.id());
                existing
            }
        };

        Ok(self.added(&session, file_index, false))
    }

    fn added(&self, session: &SwarmSession, file_index: usize, already_active: bool) -> AddedSwarm {
        AddedSwarm {
            id: session.id().to_string(),
            name: session.name().to_string(),
            stream_url: self.stream_url(session.id(), file_index),
            file_index,
            files: session.files().to_vec(),
            already_active,
        }
    }

    /// Public URL serving one file of a session.
    pub fn stream_url(&self, id: InfoHash, file_index: usize) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.server.stream_origin(),
            self.config.session.stream_base,
            id,
            file_index
        )
    }

    /// Looks up an active session by its wire id.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - Unknown or malformed id
    pub fn session(&self, id: &str) -> Result<Arc<SwarmSession>, SessionError> {
        parse_session_id(id)
            .and_then(|info_hash| self.registry.get(&info_hash))
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })
    }

    /// Unregisters a session and releases its swarm.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - Unknown or malformed id
    pub fn remove_swarm(&self, id: &str) -> Result<(), SessionError> {
        let session = parse_session_id(id)
            .and_then(|info_hash| self.registry.remove(&info_hash))
            .ok_or_else(|| SessionError::NotFound { id: id.to_string() })?;

        session.release();
        info!("Removed swarm {} ({})", session.id(), session.name());
        Ok(())
    }

    /// Status of every active session, sorted by name then id.
    pub fn status(&self) -> Vec<SwarmStatus> {
        let mut rows: Vec<SwarmStatus> = self
            .registry
            .list()
            .iter()
            .map(|session| {
                let (completed, total) = session.completion();
                let rates = session.transfer_rates();
                let progress = if total == 0 {
                    0.0
                } else {
                    completed as f64 / total as f64 * 100.0
                };
                SwarmStatus {
                    id: session.id().to_string(),
                    name: session.name().to_string(),
                    progress,
                    state: SwarmState::from_progress(completed, total),
                    download_speed: rates.download_bps,
                    upload_speed: rates.upload_bps,
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    /// Moves a session's playback window. Negative positions clamp to 0.
    ///
    /// # Errors
    /// - `SessionError::NotFound` - Unknown or malformed id
    /// - `SessionError::InvalidFileIndex` - No such file in the session
    pub fn update_playback_position(
        &self,
        id: &str,
        file_index: usize,
        position_bytes: i64,
    ) -> Result<PlaybackUpdate, SessionError> {
        let session = self.session(id)?;
        let position = u64::try_from(position_bytes).unwrap_or(0);
        let plan = session.update_playback_position(file_index, position)?;
        Ok(PlaybackUpdate {
            id: session.id().to_string(),
            file_index,
            plan,
        })
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Releases every session and returns how many there were.
    pub fn shutdown(&self) -> usize {
        let sessions = self.registry.drain();
        for session in &sessions {
            session.release();
        }
        sessions.len()
    }
}

fn parse_session_id(id: &str) -> Option<InfoHash> {
    InfoHash::from_hex(id).ok()
}
