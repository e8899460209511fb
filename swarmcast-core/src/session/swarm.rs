//! One active content swarm and the state attached to it

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::SessionError;
use crate::config::SchedulerConfig;
use crate::engine::{FileReader, InfoHash, SwarmHandle, SwarmMetadata, TransferRates};
use crate::media;
use crate::scheduler::{FileExtent, PieceLayout, PlaybackWindow, PriorityPlan, PriorityScheduler};

/// A file inside a session, in swarm order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "size")]
    pub length: u64,
    pub index: usize,
    /// Offset of the first byte within the swarm's contiguous data
    #[serde(skip)]
    pub offset: u64,
}

impl FileEntry {
    fn extent(&self) -> FileExtent {
        FileExtent {
            offset: self.offset,
            length: self.length,
        }
    }
}

/// Builds the file list with cumulative offsets from swarm metadata.
pub fn file_entries(metadata: &SwarmMetadata) -> Vec<FileEntry> {
    let mut offset = 0u64;
    metadata
        .files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let entry = FileEntry {
                name: file.path.clone(),
                length: file.length,
                index,
                offset,
            };
            offset += file.length;
            entry
        })
        .collect()
}

/// Resolves which file to stream.
///
/// An explicit index must be in bounds. Without one, the first file with a
/// known video extension wins, falling back to the first file.
///
/// # Errors
/// - `SessionError::InvalidFileIndex` - Explicit index past the file list
pub fn select_stream_file(
    files: &[FileEntry],
    explicit_index: Option<usize>,
) -> Result<usize, SessionError> {
    match explicit_index {
        Some(index) if index < files.len() => Ok(index),
        Some(index) => Err(SessionError::InvalidFileIndex {
            index,
            file_count: files.len(),
        }),
        None => Ok(files
            .iter()
            .find(|file| media::is_video_file(&file.name))
            .map_or(0, |file| file.index)),
    }
}

/// One joined swarm with metadata, owned by the registry.
///
/// Owns the engine handle exclusively. The handle is released explicitly on
/// removal and again when the session is dropped; release is idempotent.
pub struct SwarmSession {
    id: InfoHash,
    name: String,
    handle: Box<dyn SwarmHandle>,
    layout: PieceLayout,
    files: Vec<FileEntry>,
    selected_file_index: usize,
    scheduler: Mutex<PriorityScheduler>,
    created_at: DateTime<Utc>,
}

impl SwarmSession {
    /// Creates a session from a joined handle and its metadata.
    ///
    /// # Errors
    /// - `SessionError::InvalidFileIndex` - Selected index past the file list
    pub fn new(
        handle: Box<dyn SwarmHandle>,
        metadata: &SwarmMetadata,
        selected_file_index: usize,
        scheduler_config: SchedulerConfig,
    ) -> Result<Self, SessionError> {
        let files = file_entries(metadata);
        if selected_file_index >= files.len() && !files.is_empty() {
            return Err(SessionError::InvalidFileIndex {
                index: selected_file_index,
                file_count: files.len(),
            });
        }

        Ok(Self {
            id: handle.info_hash(),
            name: metadata.name.clone(),
            handle,
            layout: PieceLayout {
                piece_length: metadata.piece_length,
                piece_count: metadata.piece_count,
            },
            files,
            selected_file_index,
            scheduler: Mutex::new(PriorityScheduler::new(scheduler_config)),
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> InfoHash {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn selected_file_index(&self) -> usize {
        self.selected_file_index
    }

    pub fn layout(&self) -> PieceLayout {
        self.layout
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Looks up a file by index.
    ///
    /// # Errors
    /// - `SessionError::InvalidFileIndex` - No such file
    pub fn file(&self, index: usize) -> Result<&FileEntry, SessionError> {
        self.files.get(index).ok_or(SessionError::InvalidFileIndex {
            index,
            file_count: self.files.len(),
        })
    }

    /// Records a playback position and rewrites piece priorities around it.
    ///
    /// Positions outside the file are clamped. Concurrent callers are
    /// serialized on the scheduler lock for the whole rewrite.
    ///
    /// # Errors
    /// - `SessionError::InvalidFileIndex` - No such file
    pub fn update_playback_position(
        &self,
        file_index: usize,
        position_bytes: u64,
    ) -> Result<PriorityPlan, SessionError> {
        let extent = self.file(file_index)?.extent();
        let mut scheduler = self.scheduler.lock();
        Ok(scheduler.update_playback_position(
            self.handle.as_ref(),
            self.layout,
            file_index,
            extent,
            position_bytes,
        ))
    }

    /// Last playback window reported for this session.
    pub fn playback_window(&self) -> Option<PlaybackWindow> {
        self.scheduler.lock().window().cloned()
    }

    /// Opens a reader over one file.
    ///
    /// # Errors
    /// - `SessionError::InvalidFileIndex` - No such file
    /// - `SessionError::Engine` - The engine could not provide a reader
    pub async fn open_reader(&self, file_index: usize) -> Result<Box<dyn FileReader>, SessionError> {
        self.file(file_index)?;
        Ok(self.handle.open_reader(file_index).await?)
    }

    /// Completed bytes and total bytes across the swarm.
    pub fn completion(&self) -> (u64, u64) {
        (self.handle.bytes_completed(), self.handle.total_length())
    }

    pub fn transfer_rates(&self) -> TransferRates {
        self.handle.transfer_rates()
    }

    /// Stops the engine's swarm. Safe to call more than once.
    pub fn release(&self) {
        self.handle.release();
    }
}

impl Drop for SwarmSession {
    fn drop(&mut self) {
        self.handle.release();
    }
}

impl std::fmt::Debug for SwarmSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("files", &self.files.len())
            .field("selected_file_index", &self.selected_file_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::engine::mock::MockSwarmEngine;
    use crate::engine::{MagnetLink, MetadataFile, PiecePriority, SwarmEngine};

    fn metadata(files: &[(&str, u64)]) -> SwarmMetadata {
        let total: u64 = files.iter().map(|(_, length)| length).sum();
        SwarmMetadata {
            name: "pack".to_string(),
            piece_length: 100,
            piece_count: total.div_ceil(100) as u32,
            files: files
                .iter()
                .map(|(path, length)| MetadataFile {
                    path: path.to_string(),
                    length: *length,
                })
                .collect(),
        }
    }

    #[test]
    fn test_file_entries_have_cumulative_offsets() {
        let entries = file_entries(&metadata(&[("a.nfo", 10), ("b.mkv", 500), ("c.srt", 5)]));
        let offsets: Vec<u64> = entries.iter().map(|entry| entry.offset).collect();
        assert_eq!(offsets, vec![0, 10, 510]);
        assert_eq!(entries[1].index, 1);
    }

    #[test]
    fn test_select_prefers_first_video() {
        let entries = file_entries(&metadata(&[("readme.txt", 10), ("movie.MKV", 500), ("b.mp4", 5)]));
        assert_eq!(select_stream_file(&entries, None).unwrap(), 1);
    }

    #[test]
    fn test_select_falls_back_to_first_file() {
        let entries = file_entries(&metadata(&[("a.txt", 10), ("b.iso", 500)]));
        assert_eq!(select_stream_file(&entries, None).unwrap(), 0);
    }

    #[test]
    fn test_select_honours_explicit_index() {
        let entries = file_entries(&metadata(&[("a.mp4", 10), ("b.txt", 500)]));
        assert_eq!(select_stream_file(&entries, Some(1)).unwrap(), 1);
        assert!(matches!(
            select_stream_file(&entries, Some(2)),
            Err(SessionError::InvalidFileIndex {
                index: 2,
                file_count: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_position_update_uses_file_offset() {
        let info_hash = InfoHash::new([9u8; 20]);
        let engine = MockSwarmEngine::new().with_swarm(
            info_hash,
            100,
            vec![
                ("sample.nfo", Bytes::from(vec![0u8; 250])),
                ("movie.mp4", Bytes::from(vec![1u8; 10_000])),
            ],
        );
        let magnet = MagnetLink::parse(&MagnetLink::build(info_hash, "pack", &[])).unwrap();
        let handle = engine.join(&magnet).await.unwrap();
        let metadata = handle.wait_for_metadata().await.unwrap();
        let session =
            SwarmSession::new(handle, &metadata, 1, SchedulerConfig::default()).unwrap();

        let plan = session.update_playback_position(1, 0).unwrap();

        assert_eq!(plan.high.map(|span| span.first), Some(2));
        let priorities = engine.swarm(info_hash).unwrap().priorities();
        assert_eq!(priorities[1], PiecePriority::Default);
        assert_eq!(priorities[2], PiecePriority::High);
        assert_eq!(session.playback_window().unwrap().file_index, 1);
    }

    #[tokio::test]
    async fn test_drop_releases_handle() {
        let info_hash = InfoHash::new([4u8; 20]);
        let engine = MockSwarmEngine::new().with_swarm(
            info_hash,
            100,
            vec![("movie.mp4", Bytes::from_static(b"abc"))],
        );
        let magnet = MagnetLink::parse(&MagnetLink::build(info_hash, "m", &[])).unwrap();
        let handle = engine.join(&magnet).await.unwrap();
        let metadata = handle.wait_for_metadata().await.unwrap();
        let session =
            SwarmSession::new(handle, &metadata, 0, SchedulerConfig::default()).unwrap();

        drop(session);

        assert!(engine.swarm(info_hash).unwrap().is_released());
    }

    #[tokio::test]
    async fn test_open_reader_rejects_unknown_file() {
        let info_hash = InfoHash::new([5u8; 20]);
        let engine = MockSwarmEngine::new().with_swarm(
            info_hash,
            100,
            vec![("movie.mp4", Bytes::from_static(b"abc"))],
        );
        let magnet = MagnetLink::parse(&MagnetLink::build(info_hash, "m", &[])).unwrap();
        let handle = engine.join(&magnet).await.unwrap();
        let metadata = handle.wait_for_metadata().await.unwrap();
        let session =
            SwarmSession::new(handle, &metadata, 0, SchedulerConfig::default()).unwrap();

        assert!(matches!(
            session.open_reader(3).await,
            Err(SessionError::InvalidFileIndex { .. })
        ));
        let mut reader = session.open_reader(0).await.unwrap();
        assert_eq!(reader.read_chunk(16).await.unwrap(), Bytes::from_static(b"abc"));
    }
}
