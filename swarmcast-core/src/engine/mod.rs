//! Swarm engine capability boundary
//!
//! The engine that talks to peers, verifies pieces and persists data lives
//! behind these traits. Swarmcast only needs to join a swarm, learn its file
//! layout, steer piece priorities and read file bytes as they arrive.

pub mod magnet;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use std::fmt;
use std::ops::RangeInclusive;

use async_trait::async_trait;
use bytes::Bytes;

pub use magnet::MagnetLink;

/// SHA-1 hash identifying a unique swarm.
///
/// 20-byte hash of the swarm's info dictionary. Rendered as 40 lowercase hex
/// characters, which is also the session id on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40 character hex string.
    ///
    /// # Errors
    /// - `EngineError::InvalidMagnet` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, EngineError> {
        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash).map_err(|e| EngineError::InvalidMagnet {
            reason: format!("invalid info hash {hex_str:?}: {e}"),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Zero-based index of a piece within a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Download priority of a single piece as understood by the engine.
///
/// `Default` is whatever the engine would do on its own; Swarmcast only ever
/// raises pieces above it or hands them back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PiecePriority {
    #[default]
    Default,
    Normal,
    High,
}

/// One file inside a swarm as reported by its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFile {
    /// Path inside the swarm, `/` separated
    pub path: String,
    /// Length in bytes
    pub length: u64,
}

/// Layout information that becomes available once metadata arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmMetadata {
    pub name: String,
    pub piece_length: u64,
    pub piece_count: u32,
    /// Files in swarm order; their bytes are laid out back to back
    pub files: Vec<MetadataFile>,
}

impl SwarmMetadata {
    /// Sum of all file lengths.
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }
}

/// Instantaneous transfer rates for one swarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferRates {
    pub download_bps: u64,
    pub upload_bps: u64,
}

/// Errors raised across the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("Failed to join swarm: {reason}")]
    JoinFailed { reason: String },

    #[error("Swarm has been released")]
    SwarmClosed,

    #[error("Metadata not available yet")]
    MetadataUnavailable,

    #[error("File index {index} out of range ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Seek to {position} beyond file length {length}")]
    SeekOutOfRange { position: u64, length: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Joins swarms.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Starts participating in the swarm named by the magnet link.
    ///
    /// Returns as soon as the swarm is joined; metadata may arrive later or
    /// never, see [`SwarmHandle::wait_for_metadata`].
    ///
    /// # Errors
    /// - `EngineError::JoinFailed` - The engine refused or could not start the swarm
    async fn join(&self, magnet: &MagnetLink) -> Result<Box<dyn SwarmHandle>, EngineError>;
}

/// An engine-owned swarm that Swarmcast steers and reads from.
#[async_trait]
pub trait SwarmHandle: Send + Sync {
    /// Stable content identifier.
    fn info_hash(&self) -> InfoHash;

    /// Resolves once metadata is known. May never resolve; callers bound it.
    ///
    /// # Errors
    /// - `EngineError::SwarmClosed` - The swarm was released while waiting
    async fn wait_for_metadata(&self) -> Result<SwarmMetadata, EngineError>;

    /// Total bytes across all files, 0 before metadata.
    fn total_length(&self) -> u64;

    /// Bytes verified and stored locally.
    fn bytes_completed(&self) -> u64;

    /// Sets the download priority of one piece. Out-of-range indices are ignored.
    fn set_piece_priority(&self, piece: PieceIndex, priority: PiecePriority);

    /// Current priority of one piece.
    fn piece_priority(&self, piece: PieceIndex) -> PiecePriority;

    /// Applies one priority to a contiguous run of pieces.
    fn set_priority_range(&self, pieces: RangeInclusive<u32>, priority: PiecePriority) {
        for index in pieces {
            self.set_piece_priority(PieceIndex::new(index), priority);
        }
    }

    /// Current transfer rates; engines without rate tracking report zeros.
    fn transfer_rates(&self) -> TransferRates {
        TransferRates::default()
    }

    /// Opens a sequential, seekable reader over one file.
    ///
    /// # Errors
    /// - `EngineError::FileIndexOutOfRange` - No such file
    /// - `EngineError::MetadataUnavailable` - Metadata has not arrived
    /// - `EngineError::SwarmClosed` - The swarm was released
    async fn open_reader(&self, file_index: usize) -> Result<Box<dyn FileReader>, EngineError>;

    /// Stops all network activity for this swarm. Idempotent.
    fn release(&self);
}

/// Sequential reader over one file of a swarm.
///
/// Reads wait until the engine has the requested bytes locally. Dropping the
/// reader releases it.
#[async_trait]
pub trait FileReader: Send {
    /// Length of the file in bytes.
    fn length(&self) -> u64;

    /// Moves the read cursor to an absolute file offset.
    ///
    /// # Errors
    /// - `EngineError::SeekOutOfRange` - Position past the end of the file
    async fn seek(&mut self, position: u64) -> Result<u64, EngineError>;

    /// Reads up to `max_len` bytes at the cursor, waiting for availability.
    ///
    /// An empty chunk means end of file.
    ///
    /// # Errors
    /// - `EngineError::SwarmClosed` - The swarm was released mid-read
    /// - `EngineError::Io` - Local storage failed
    async fn read_chunk(&mut self, max_len: usize) -> Result<Bytes, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_display() {
        let hash = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
        ];
        let info_hash = InfoHash::new(hash);
        assert_eq!(
            info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_info_hash_hex_round_trip() {
        let parsed = InfoHash::from_hex("0123456789ABCDEF0123456789abcdef01234567").unwrap();
        assert_eq!(parsed.to_string(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_info_hash_rejects_bad_hex() {
        assert!(InfoHash::from_hex("xyz").is_err());
        assert!(InfoHash::from_hex("0123").is_err());
    }

    #[test]
    fn test_piece_priority_ordering() {
        assert!(PiecePriority::High > PiecePriority::Normal);
        assert!(PiecePriority::Normal > PiecePriority::Default);
        assert_eq!(PiecePriority::default(), PiecePriority::Default);
    }

    #[test]
    fn test_metadata_total_length() {
        let metadata = SwarmMetadata {
            name: "pack".to_string(),
            piece_length: 16,
            piece_count: 4,
            files: vec![
                MetadataFile {
                    path: "a.nfo".to_string(),
                    length: 10,
                },
                MetadataFile {
                    path: "b.mkv".to_string(),
                    length: 50,
                },
            ],
        };
        assert_eq!(metadata.total_length(), 60);
    }
}
