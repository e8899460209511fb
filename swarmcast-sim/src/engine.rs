//! Simulated swarm engine
//!
//! Implements the engine boundary in-process: metadata arrives after a fixed
//! delay and pieces complete at a configured byte rate, highest priority
//! first. Readers block until the pieces they need are complete, which makes
//! the engine a faithful stand-in for a real swarm in tests and demos.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use swarmcast_core::config::SimulationConfig;
use swarmcast_core::engine::{EngineError, InfoHash, MagnetLink, PiecePriority, SwarmEngine, SwarmHandle};
use tokio::time::Instant;

use crate::catalog::ContentCatalog;
use crate::swarm::{SimulatedHandle, SwarmState};

/// In-process engine serving torrents from a [`ContentCatalog`].
pub struct SimulatedSwarmEngine {
    catalog: Arc<ContentCatalog>,
    metadata_delay: Duration,
    download_rate: u64,
    tick_interval: Duration,
    paused: bool,
    swarms: Mutex<HashMap<InfoHash, Arc<SwarmState>>>,
}

impl SimulatedSwarmEngine {
    /// Creates an engine using the simulation settings for timing and rate.
    pub fn new(catalog: ContentCatalog, config: &SimulationConfig) -> Self {
        Self {
            catalog: Arc::new(catalog),
            metadata_delay: config.metadata_delay,
            download_rate: config.download_rate,
            tick_interval: config.tick_interval,
            paused: false,
            swarms: Mutex::new(HashMap::new()),
        }
    }

    /// Disables automatic piece progress; tests drive it with [`Self::complete_pieces`].
    pub fn paused(mut self) -> Self {
        self.paused = true;
        self
    }

    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = delay;
        self
    }

    pub fn with_download_rate(mut self, bytes_per_second: u64) -> Self {
        self.download_rate = bytes_per_second;
        self
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    /// Marks pieces of the most recent swarm for `info_hash` as complete.
    ///
    /// Returns the number of pieces that were newly completed.
    pub fn complete_pieces(&self, info_hash: InfoHash, pieces: RangeInclusive<u32>) -> usize {
        let Some(state) = self.swarms.lock().get(&info_hash).cloned() else {
            return 0;
        };
        pieces.filter(|piece| state.complete_piece(*piece)).count()
    }

    /// Snapshot of piece priorities for the most recent swarm of `info_hash`.
    pub fn priorities(&self, info_hash: InfoHash) -> Option<Vec<PiecePriority>> {
        self.swarms
            .lock()
            .get(&info_hash)
            .map(|state| state.priorities())
    }

    /// Whether the most recent swarm of `info_hash` was released.
    pub fn is_released(&self, info_hash: InfoHash) -> Option<bool> {
        self.swarms
            .lock()
            .get(&info_hash)
            .map(|state| state.is_released())
    }

    fn spawn_download(&self, state: Arc<SwarmState>) {
        let tick = self.tick_interval;
        let bytes_per_tick =
            (self.download_rate as u128 * tick.as_micros() / 1_000_000).max(1) as u64;

        tokio::spawn(async move {
            tokio::time::sleep_until(state.metadata_ready_at).await;
            let Some(torrent) = state.torrent.clone() else {
                return;
            };

            let mut interval = tokio::time::interval(tick);
            let mut budget = 0u64;
            loop {
                interval.tick().await;
                if state.is_released() {
                    break;
                }

                budget = budget.saturating_add(bytes_per_tick);
                loop {
                    let next = state.book.lock().next_piece();
                    let Some(piece) = next else {
                        tracing::info!("Simulated swarm {} complete", state.info_hash);
                        return;
                    };
                    let size = torrent.piece_size(piece);
                    if budget < size {
                        break;
                    }
                    budget -= size;
                    state.complete_piece(piece);
                }
            }
            tracing::debug!("Download task for {} stopped", state.info_hash);
        });
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarmEngine {
    async fn join(&self, magnet: &MagnetLink) -> Result<Box<dyn SwarmHandle>, EngineError> {
        let torrent = self.catalog.get(&magnet.info_hash).cloned().map(Arc::new);
        if torrent.is_none() {
            tracing::warn!(
                "No simulated content for {}; metadata will never arrive",
                magnet.info_hash
            );
        }

        let state = Arc::new(SwarmState::new(
            magnet.info_hash,
            torrent,
            Instant::now() + self.metadata_delay,
            self.download_rate,
        ));
        self.swarms.lock().insert(magnet.info_hash, state.clone());

        if !self.paused && state.torrent.is_some() {
            self.spawn_download(state.clone());
        }

        tracing::info!("Joined simulated swarm {}", magnet.info_hash);
        Ok(Box::new(SimulatedHandle { state }))
    }
}
