//! In-process engine double for unit tests
//!
//! Every piece is already local, reads never wait, and priority writes are
//! recorded so tests can assert on exactly what the scheduler asked for.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    EngineError, FileReader, InfoHash, MagnetLink, MetadataFile, PieceIndex, PiecePriority,
    SwarmEngine, SwarmHandle, SwarmMetadata, TransferRates,
};

/// Engine double keyed by info hash.
#[derive(Default)]
pub struct MockSwarmEngine {
    specs: Mutex<HashMap<InfoHash, MockSwarmSpec>>,
    joined: Mutex<Vec<Arc<MockSwarmState>>>,
    fail_joins: AtomicBool,
}

#[derive(Clone)]
struct MockSwarmSpec {
    metadata: Option<SwarmMetadata>,
    file_data: Vec<Bytes>,
}

impl MockSwarmEngine {
    /// Creates an engine with no known swarms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a swarm whose metadata is available immediately.
    ///
    /// Files are built from `(path, data)` pairs; the file length is the data length.
    pub fn with_swarm(self, info_hash: InfoHash, piece_length: u64, files: Vec<(&str, Bytes)>) -> Self {
        let total: u64 = files.iter().map(|(_, data)| data.len() as u64).sum();
        let piece_count = total.div_ceil(piece_length.max(1)) as u32;
        let metadata = SwarmMetadata {
            name: files
                .first()
                .map(|(path, _)| path.to_string())
                .unwrap_or_default(),
            piece_length,
            piece_count,
            files: files
                .iter()
                .map(|(path, data)| MetadataFile {
                    path: path.to_string(),
                    length: data.len() as u64,
                })
                .collect(),
        };
        let file_data = files.into_iter().map(|(_, data)| data).collect();
        self.specs.lock().insert(
            info_hash,
            MockSwarmSpec {
                metadata: Some(metadata),
                file_data,
            },
        );
        self
    }

    /// Registers a swarm with explicit metadata and no readable data.
    pub fn with_metadata(self, info_hash: InfoHash, metadata: SwarmMetadata) -> Self {
        let file_data = metadata
            .files
            .iter()
            .map(|file| Bytes::from(vec![0u8; file.length as usize]))
            .collect();
        self.specs.lock().insert(
            info_hash,
            MockSwarmSpec {
                metadata: Some(metadata),
                file_data,
            },
        );
        self
    }

    /// Makes every join fail.
    pub fn failing_joins(self) -> Self {
        self.fail_joins.store(true, Ordering::SeqCst);
        self
    }

    /// Most recently joined swarm state for an info hash.
    pub fn swarm(&self, info_hash: InfoHash) -> Option<Arc<MockSwarmState>> {
        self.joined
            .lock()
            .iter()
            .rev()
            .find(|state| state.info_hash == info_hash)
            .cloned()
    }

    /// Number of joins performed so far.
    pub fn join_count(&self) -> usize {
        self.joined.lock().len()
    }
}

#[async_trait]
impl SwarmEngine for MockSwarmEngine {
    async fn join(&self, magnet: &MagnetLink) -> Result<Box<dyn SwarmHandle>, EngineError> {
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(EngineError::JoinFailed {
                reason: "mock engine configured to fail".to_string(),
            });
        }

        // Unknown swarms never deliver metadata, like a swarm without peers
        let spec = self
            .specs
            .lock()
            .get(&magnet.info_hash)
            .cloned()
            .unwrap_or(MockSwarmSpec {
                metadata: None,
                file_data: Vec::new(),
            });

        let state = Arc::new(MockSwarmState {
            info_hash: magnet.info_hash,
            metadata: spec.metadata,
            file_data: spec.file_data,
            priorities: Mutex::new(HashMap::new()),
            priority_writes: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            released: AtomicBool::new(false),
        });
        self.joined.lock().push(state.clone());
        Ok(Box::new(MockSwarmHandle { state }))
    }
}

/// Observable state of one mock swarm.
pub struct MockSwarmState {
    pub info_hash: InfoHash,
    metadata: Option<SwarmMetadata>,
    file_data: Vec<Bytes>,
    priorities: Mutex<HashMap<u32, PiecePriority>>,
    priority_writes: AtomicUsize,
    completed: AtomicU64,
    released: AtomicBool,
}

impl MockSwarmState {
    /// Priority of every piece, index order.
    pub fn priorities(&self) -> Vec<PiecePriority> {
        let count = self.metadata.as_ref().map_or(0, |m| m.piece_count);
        let priorities = self.priorities.lock();
        (0..count)
            .map(|index| priorities.get(&index).copied().unwrap_or_default())
            .collect()
    }

    /// Total priority writes received.
    pub fn priority_writes(&self) -> usize {
        self.priority_writes.load(Ordering::SeqCst)
    }

    /// Sets the reported completed byte count.
    pub fn set_bytes_completed(&self, bytes: u64) {
        self.completed.store(bytes, Ordering::SeqCst);
    }

    /// Whether `release` has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct MockSwarmHandle {
    state: Arc<MockSwarmState>,
}

#[async_trait]
impl SwarmHandle for MockSwarmHandle {
    fn info_hash(&self) -> InfoHash {
        self.state.info_hash
    }

    async fn wait_for_metadata(&self) -> Result<SwarmMetadata, EngineError> {
        match &self.state.metadata {
            Some(metadata) => Ok(metadata.clone()),
            None => std::future::pending().await,
        }
    }

    fn total_length(&self) -> u64 {
        self.state
            .metadata
            .as_ref()
            .map_or(0, SwarmMetadata::total_length)
    }

    fn bytes_completed(&self) -> u64 {
        self.state.completed.load(Ordering::SeqCst)
    }

    fn set_piece_priority(&self, piece: PieceIndex, priority: PiecePriority) {
        self.state.priority_writes.fetch_add(1, Ordering::SeqCst);
        let mut priorities = self.state.priorities.lock();
        if priority == PiecePriority::Default {
            priorities.remove(&piece.as_u32());
        } else {
            priorities.insert(piece.as_u32(), priority);
        }
    }

    fn piece_priority(&self, piece: PieceIndex) -> PiecePriority {
        self.state
            .priorities
            .lock()
            .get(&piece.as_u32())
            .copied()
            .unwrap_or_default()
    }

    fn transfer_rates(&self) -> TransferRates {
        TransferRates {
            download_bps: 1024,
            upload_bps: 0,
        }
    }

    async fn open_reader(&self, file_index: usize) -> Result<Box<dyn FileReader>, EngineError> {
        if self.state.released.load(Ordering::SeqCst) {
            return Err(EngineError::SwarmClosed);
        }
        let data = self.state.file_data.get(file_index).cloned().ok_or(
            EngineError::FileIndexOutOfRange {
                index: file_index,
                file_count: self.state.file_data.len(),
            },
        )?;
        Ok(Box::new(MockFileReader {
            state: self.state.clone(),
            data,
            position: 0,
        }))
    }

    fn release(&self) {
        self.state.released.store(true, Ordering::SeqCst);
    }
}

struct MockFileReader {
    state: Arc<MockSwarmState>,
    data: Bytes,
    position: u64,
}

#[async_trait]
impl FileReader for MockFileReader {
    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    async fn seek(&mut self, position: u64) -> Result<u64, EngineError> {
        if position > self.length() {
            return Err(EngineError::SeekOutOfRange {
                position,
                length: self.length(),
            });
        }
        self.position = position;
        Ok(position)
    }

    async fn read_chunk(&mut self, max_len: usize) -> Result<Bytes, EngineError> {
        if self.state.released.load(Ordering::SeqCst) {
            return Err(EngineError::SwarmClosed);
        }
        let start = self.position as usize;
        let end = (start + max_len).min(self.data.len());
        let chunk = self.data.slice(start..end);
        self.position = end as u64;
        Ok(chunk)
    }
}
