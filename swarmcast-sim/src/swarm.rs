//! Per-swarm simulation state, handle and reader

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use swarmcast_core::engine::{
    EngineError, FileReader, InfoHash, PieceIndex, PiecePriority, SwarmHandle, SwarmMetadata,
    TransferRates,
};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::catalog::SimulatedTorrent;

/// Completion and priority bookkeeping for one joined swarm.
pub(crate) struct PieceBook {
    completed: Vec<bool>,
    priorities: Vec<PiecePriority>,
    completed_bytes: u64,
}

impl PieceBook {
    fn new(piece_count: u32) -> Self {
        Self {
            completed: vec![false; piece_count as usize],
            priorities: vec![PiecePriority::Default; piece_count as usize],
            completed_bytes: 0,
        }
    }

    /// Highest-priority incomplete piece, lowest index among equals.
    pub(crate) fn next_piece(&self) -> Option<u32> {
        let mut best: Option<(u32, PiecePriority)> = None;
        for (index, done) in self.completed.iter().enumerate() {
            if *done {
                continue;
            }
            let priority = self.priorities[index];
            if best.is_none_or(|(_, best_priority)| priority > best_priority) {
                best = Some((index as u32, priority));
                if priority == PiecePriority::High {
                    break;
                }
            }
        }
        best.map(|(index, _)| index)
    }

    pub(crate) fn is_complete(&self, piece: u32) -> bool {
        self.completed.get(piece as usize).copied().unwrap_or(false)
    }

    pub(crate) fn all_complete(&self) -> bool {
        self.completed.iter().all(|done| *done)
    }
}

/// Shared state of one joined swarm.
pub(crate) struct SwarmState {
    pub(crate) info_hash: InfoHash,
    /// `None` when the catalog does not know the swarm; metadata never arrives
    pub(crate) torrent: Option<Arc<SimulatedTorrent>>,
    pub(crate) metadata_ready_at: Instant,
    pub(crate) book: Mutex<PieceBook>,
    /// Bumped on every completion and on release
    pub(crate) progress: watch::Sender<u64>,
    pub(crate) released: AtomicBool,
    pub(crate) download_rate: u64,
}

impl SwarmState {
    pub(crate) fn new(
        info_hash: InfoHash,
        torrent: Option<Arc<SimulatedTorrent>>,
        metadata_ready_at: Instant,
        download_rate: u64,
    ) -> Self {
        let piece_count = torrent.as_ref().map_or(0, |t| t.piece_count());
        let (progress, _) = watch::channel(0);
        Self {
            info_hash,
            torrent,
            metadata_ready_at,
            book: Mutex::new(PieceBook::new(piece_count)),
            progress,
            released: AtomicBool::new(false),
            download_rate,
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn metadata_ready(&self) -> bool {
        self.torrent.is_some() && Instant::now() >= self.metadata_ready_at
    }

    /// Marks a piece complete and wakes waiting readers. Returns false if it already was.
    pub(crate) fn complete_piece(&self, piece: u32) -> bool {
        let Some(torrent) = &self.torrent else {
            return false;
        };
        {
            let mut book = self.book.lock();
            match book.completed.get_mut(piece as usize) {
                Some(done) if !*done => *done = true,
                _ => return false,
            }
            book.completed_bytes += torrent.piece_size(piece);
        }
        self.progress.send_modify(|version| *version += 1);
        true
    }

    pub(crate) fn priorities(&self) -> Vec<PiecePriority> {
        self.book.lock().priorities.clone()
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("Released simulated swarm {}", self.info_hash);
            self.progress.send_modify(|version| *version += 1);
        }
    }
}

/// Handle given to Swarmcast for one joined swarm.
pub(crate) struct SimulatedHandle {
    pub(crate) state: Arc<SwarmState>,
}

#[async_trait]
impl SwarmHandle for SimulatedHandle {
    fn info_hash(&self) -> InfoHash {
        self.state.info_hash
    }

    async fn wait_for_metadata(&self) -> Result<SwarmMetadata, EngineError> {
        let mut progress = self.state.progress.subscribe();
        loop {
            if self.state.is_released() {
                return Err(EngineError::SwarmClosed);
            }
            match &self.state.torrent {
                Some(torrent) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(self.state.metadata_ready_at) => {
                            return Ok(torrent.metadata());
                        }
                        changed = progress.changed() => {
                            changed.map_err(|_| EngineError::SwarmClosed)?;
                        }
                    }
                }
                // No peers ever answer; only a release ends the wait
                None => progress
                    .changed()
                    .await
                    .map_err(|_| EngineError::SwarmClosed)?,
            }
        }
    }

    fn total_length(&self) -> u64 {
        match &self.state.torrent {
            Some(torrent) if self.state.metadata_ready() => torrent.total_length(),
            _ => 0,
        }
    }

    fn bytes_completed(&self) -> u64 {
        self.state.book.lock().completed_bytes
    }

    fn set_piece_priority(&self, piece: PieceIndex, priority: PiecePriority) {
        if let Some(slot) = self.state.book.lock().priorities.get_mut(piece.as_u32() as usize) {
            *slot = priority;
        }
    }

    fn piece_priority(&self, piece: PieceIndex) -> PiecePriority {
        self.state
            .book
            .lock()
            .priorities
            .get(piece.as_u32() as usize)
            .copied()
            .unwrap_or_default()
    }

    fn transfer_rates(&self) -> TransferRates {
        let downloading = self.state.metadata_ready()
            && !self.state.is_released()
            && !self.state.book.lock().all_complete();
        TransferRates {
            download_bps: if downloading { self.state.download_rate } else { 0 },
            upload_bps: 0,
        }
    }

    async fn open_reader(&self, file_index: usize) -> Result<Box<dyn FileReader>, EngineError> {
        if self.state.is_released() {
            return Err(EngineError::SwarmClosed);
        }
        let torrent = match &self.state.torrent {
            Some(torrent) if self.state.metadata_ready() => torrent.clone(),
            _ => return Err(EngineError::MetadataUnavailable),
        };
        let length = torrent
            .files
            .get(file_index)
            .map(|file| file.length)
            .ok_or(EngineError::FileIndexOutOfRange {
                index: file_index,
                file_count: torrent.files.len(),
            })?;

        Ok(Box::new(SimulatedFileReader {
            file_offset: torrent.file_offset(file_index),
            progress: self.state.progress.subscribe(),
            state: self.state.clone(),
            torrent,
            file_index,
            length,
            position: 0,
        }))
    }

    fn release(&self) {
        self.state.release();
    }
}

/// Sequential reader that waits for pieces before returning their bytes.
struct SimulatedFileReader {
    state: Arc<SwarmState>,
    torrent: Arc<SimulatedTorrent>,
    progress: watch::Receiver<u64>,
    file_index: usize,
    file_offset: u64,
    length: u64,
    position: u64,
}

impl SimulatedFileReader {
    async fn wait_for_piece(&mut self, piece: u32) -> Result<(), EngineError> {
        loop {
            self.progress.borrow_and_update();
            if self.state.is_released() {
                return Err(EngineError::SwarmClosed);
            }
            if self.state.book.lock().is_complete(piece) {
                return Ok(());
            }
            self.progress
                .changed()
                .await
                .map_err(|_| EngineError::SwarmClosed)?;
        }
    }
}

#[async_trait]
impl FileReader for SimulatedFileReader {
    fn length(&self) -> u64 {
        self.length
    }

    async fn seek(&mut self, position: u64) -> Result<u64, EngineError> {
        if position > self.length {
            return Err(EngineError::SeekOutOfRange {
                position,
                length: self.length,
            });
        }
        self.position = position;
        Ok(position)
    }

    async fn read_chunk(&mut self, max_len: usize) -> Result<Bytes, EngineError> {
        if self.state.is_released() {
            return Err(EngineError::SwarmClosed);
        }
        if self.position >= self.length || max_len == 0 {
            return Ok(Bytes::new());
        }

        let absolute = self.file_offset + self.position;
        let piece = (absolute / self.torrent.piece_length) as u32;
        self.wait_for_piece(piece).await?;

        // Never cross into a piece that may not be complete yet
        let piece_end = (piece as u64 + 1) * self.torrent.piece_length;
        let len = (max_len as u64)
            .min(piece_end - absolute)
            .min(self.length - self.position) as usize;

        let chunk = self.torrent.files[self.file_index]
            .read(self.position, len)
            .await?;
        self.position += chunk.len() as u64;
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book_with(priorities: &[PiecePriority], completed: &[u32]) -> PieceBook {
        let mut book = PieceBook::new(priorities.len() as u32);
        book.priorities = priorities.to_vec();
        for piece in completed {
            book.completed[*piece as usize] = true;
        }
        book
    }

    #[test]
    fn test_next_piece_prefers_priority_then_index() {
        use PiecePriority::{Default, High, Normal};

        let book = book_with(&[Default, Normal, High, High, Normal], &[]);
        assert_eq!(book.next_piece(), Some(2));

        let book = book_with(&[Default, Normal, High, High, Normal], &[2, 3]);
        assert_eq!(book.next_piece(), Some(1));

        let book = book_with(&[Default, Default, Default], &[0]);
        assert_eq!(book.next_piece(), Some(1));

        let book = book_with(&[Default, Default], &[0, 1]);
        assert_eq!(book.next_piece(), None);
        assert!(book.all_complete());
    }
}
