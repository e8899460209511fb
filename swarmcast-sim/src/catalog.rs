//! Content served by the simulated engine
//!
//! A catalog maps info hashes to torrents whose bytes come from memory, from a
//! seeded generator or from local files.

use std::collections::HashMap;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha1::{Digest, Sha1};
use swarmcast_core::engine::{EngineError, InfoHash, MagnetLink, MetadataFile, SwarmMetadata};
use swarmcast_core::media;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Piece length used for torrents built by the catalog.
pub const DEFAULT_PIECE_LENGTH: u64 = 256 * 1024;

/// Synthetic content is generated in blocks of this size, each from its own seed.
const SYNTHETIC_BLOCK: u64 = 64 * 1024;

const MIB: u64 = 1024 * 1024;

/// Where a simulated file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Bytes),
    /// Deterministic pseudo-random bytes
    Synthetic { seed: u64 },
    /// A file on local disk, read on demand
    Disk(PathBuf),
}

impl FileSource {
    /// Reads `len` bytes at `offset`; callers keep the range inside the file.
    async fn read(&self, offset: u64, len: usize) -> Result<Bytes, EngineError> {
        match self {
            FileSource::Memory(data) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data.slice(start..end))
            }
            FileSource::Synthetic { seed } => Ok(synthetic_bytes(*seed, offset, len)),
            FileSource::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buffer = vec![0u8; len];
                file.read_exact(&mut buffer).await?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

/// Deterministic bytes for a synthetic file region.
pub fn synthetic_bytes(seed: u64, offset: u64, len: usize) -> Bytes {
    let mut out = BytesMut::with_capacity(len);
    let end = offset + len as u64;
    let mut position = offset;
    let mut block = [0u8; SYNTHETIC_BLOCK as usize];

    while position < end {
        let block_index = position / SYNTHETIC_BLOCK;
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ block_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        rng.fill_bytes(&mut block);

        let block_start = block_index * SYNTHETIC_BLOCK;
        let from = (position - block_start) as usize;
        let to = ((end - block_start).min(SYNTHETIC_BLOCK)) as usize;
        out.extend_from_slice(&block[from..to]);
        position = block_start + to as u64;
    }

    out.freeze()
}

/// One file of a simulated torrent.
#[derive(Debug, Clone)]
pub struct SimulatedFile {
    pub path: String,
    pub length: u64,
    pub source: FileSource,
}

impl SimulatedFile {
    pub fn memory(path: &str, data: Bytes) -> Self {
        Self {
            path: path.to_string(),
            length: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub fn synthetic(path: &str, length: u64, seed: u64) -> Self {
        Self {
            path: path.to_string(),
            length,
            source: FileSource::Synthetic { seed },
        }
    }

    pub fn disk(path: &str, length: u64, location: PathBuf) -> Self {
        Self {
            path: path.to_string(),
            length,
            source: FileSource::Disk(location),
        }
    }

    /// Reads bytes from this file, clamped to its length.
    ///
    /// # Errors
    /// - `EngineError::Io` - Disk-backed file could not be read
    pub async fn read(&self, offset: u64, len: usize) -> Result<Bytes, EngineError> {
        let available = self.length.saturating_sub(offset);
        let len = (len as u64).min(available) as usize;
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.source.read(offset, len).await
    }
}

/// A torrent the simulated swarm can deliver.
#[derive(Debug, Clone)]
pub struct SimulatedTorrent {
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u64,
    pub files: Vec<SimulatedFile>,
}

impl SimulatedTorrent {
    /// Builds a torrent whose info hash is the SHA-1 of its layout.
    pub fn new(name: &str, piece_length: u64, files: Vec<SimulatedFile>) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(name.as_bytes());
        hasher.update(piece_length.to_be_bytes());
        for file in &files {
            hasher.update(file.path.as_bytes());
            hasher.update(file.length.to_be_bytes());
        }
        let hash = hasher.finalize();

        let mut hash_array = [0u8; 20];
        hash_array.copy_from_slice(&hash[..20]);
        let info_hash = InfoHash::new(hash_array);

        Self {
            info_hash,
            name: name.to_string(),
            piece_length,
            files,
        }
    }

    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }

    pub fn piece_count(&self) -> u32 {
        self.total_length().div_ceil(self.piece_length) as u32
    }

    /// Length of one piece; the last piece may be short.
    pub fn piece_size(&self, piece: u32) -> u64 {
        let start = piece as u64 * self.piece_length;
        self.total_length()
            .saturating_sub(start)
            .min(self.piece_length)
    }

    /// Offset of a file's first byte within the torrent data.
    pub fn file_offset(&self, file_index: usize) -> u64 {
        self.files
            .iter()
            .take(file_index)
            .map(|file| file.length)
            .sum()
    }

    pub fn metadata(&self) -> SwarmMetadata {
        SwarmMetadata {
            name: self.name.clone(),
            piece_length: self.piece_length,
            piece_count: self.piece_count(),
            files: self
                .files
                .iter()
                .map(|file| MetadataFile {
                    path: file.path.clone(),
                    length: file.length,
                })
                .collect(),
        }
    }

    /// Magnet link that resolves to this torrent.
    pub fn magnet_link(&self) -> String {
        MagnetLink::build(self.info_hash, &self.name, &[])
    }
}

/// Torrents known to a simulated engine, keyed by info hash.
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    torrents: HashMap<InfoHash, SimulatedTorrent>,
}

impl ContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a torrent, replacing any with the same info hash.
    pub fn insert(&mut self, torrent: SimulatedTorrent) -> InfoHash {
        let info_hash = torrent.info_hash;
        self.torrents.insert(info_hash, torrent);
        info_hash
    }

    pub fn with_torrent(mut self, torrent: SimulatedTorrent) -> Self {
        self.insert(torrent);
        self
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<&SimulatedTorrent> {
        self.torrents.get(info_hash)
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
    }

    /// Torrents sorted by name.
    pub fn torrents(&self) -> Vec<&SimulatedTorrent> {
        let mut torrents: Vec<_> = self.torrents.values().collect();
        torrents.sort_by(|a, b| a.name.cmp(&b.name));
        torrents
    }

    /// Synthetic demo content: one single-file movie and one multi-file pack.
    pub fn demo(seed: u64) -> Self {
        Self::new()
            .with_torrent(SimulatedTorrent::new(
                "Big Buck Bunny (2008)",
                DEFAULT_PIECE_LENGTH,
                vec![SimulatedFile::synthetic(
                    "Big.Buck.Bunny.2008.mp4",
                    64 * MIB,
                    seed,
                )],
            ))
            .with_torrent(SimulatedTorrent::new(
                "Sintel (2010)",
                DEFAULT_PIECE_LENGTH,
                vec![
                    SimulatedFile::memory(
                        "Sintel/README.txt",
                        Bytes::from_static(b"Sintel, an open movie by the Blender Foundation.\n"),
                    ),
                    SimulatedFile::synthetic("Sintel/Sintel.2010.mkv", 96 * MIB, seed + 1),
                    SimulatedFile::synthetic("Sintel/Sintel.2010.en.srt", 48 * 1024, seed + 2),
                ],
            ))
            .with_torrent(SimulatedTorrent::new(
                "Tears of Steel (2012)",
                DEFAULT_PIECE_LENGTH,
                vec![SimulatedFile::synthetic(
                    "Tears.of.Steel.2012.webm",
                    48 * MIB,
                    seed + 3,
                )],
            ))
    }

    /// Registers every video file under a directory as a single-file torrent.
    ///
    /// # Errors
    /// - `std::io::Error` - Failed to read the top-level directory
    pub async fn from_directory(dir: &Path) -> Result<Self, std::io::Error> {
        let mut catalog = Self::new();
        let count = catalog.scan_directory(dir).await?;
        tracing::info!("Registered {} local video file(s) from {}", count, dir.display());
        Ok(catalog)
    }

    fn scan_directory<'a>(
        &'a mut self,
        dir: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<usize, std::io::Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut count = 0;
            let mut entries = tokio::fs::read_dir(dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    match self.scan_directory(&path).await {
                        Ok(found) => count += found,
                        Err(e) => tracing::warn!("Failed to scan {}: {}", path.display(), e),
                    }
                    continue;
                }

                let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if !file_type.is_file() || !media::is_video_file(file_name) {
                    continue;
                }

                let length = entry.metadata().await?.len();
                let title = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(file_name)
                    .replace(['.', '_'], " ");
                let torrent = SimulatedTorrent::new(
                    &title,
                    DEFAULT_PIECE_LENGTH,
                    vec![SimulatedFile::disk(file_name, length, path.clone())],
                );
                tracing::debug!("Local file {} -> {}", path.display(), torrent.magnet_link());
                self.insert(torrent);
                count += 1;
            }

            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_bytes_are_deterministic_and_seekable() {
        let whole = synthetic_bytes(7, 0, 200_000);
        let middle = synthetic_bytes(7, 70_000, 1_000);

        assert_eq!(whole.len(), 200_000);
        assert_eq!(&whole[70_000..71_000], &middle[..]);
        assert_ne!(synthetic_bytes(8, 0, 64), whole.slice(0..64));
    }

    #[test]
    fn test_piece_geometry() {
        let torrent = SimulatedTorrent::new(
            "pack",
            100,
            vec![
                SimulatedFile::memory("a.txt", Bytes::from(vec![0u8; 150])),
                SimulatedFile::synthetic("b.mp4", 100, 1),
            ],
        );

        assert_eq!(torrent.total_length(), 250);
        assert_eq!(torrent.piece_count(), 3);
        assert_eq!(torrent.piece_size(2), 50);
        assert_eq!(torrent.file_offset(1), 150);
        assert_eq!(torrent.metadata().files[1].path, "b.mp4");
    }

    #[test]
    fn test_info_hash_follows_layout() {
        let a = SimulatedTorrent::new("a", 100, vec![SimulatedFile::synthetic("x.mp4", 10, 1)]);
        let b = SimulatedTorrent::new("a", 100, vec![SimulatedFile::synthetic("x.mp4", 10, 1)]);
        let c = SimulatedTorrent::new("a", 100, vec![SimulatedFile::synthetic("x.mp4", 11, 1)]);

        assert_eq!(a.info_hash, b.info_hash);
        assert_ne!(a.info_hash, c.info_hash);
        let magnet = MagnetLink::parse(&a.magnet_link()).unwrap();
        assert_eq!(magnet.info_hash, a.info_hash);
    }

    #[test]
    fn test_demo_catalog_has_video_files() {
        let catalog = ContentCatalog::demo(42);
        assert_eq!(catalog.len(), 3);
        for torrent in catalog.torrents() {
            assert!(torrent.files.iter().any(|file| media::is_video_file(&file.path)));
        }
    }

    #[tokio::test]
    async fn test_from_directory_registers_videos_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Some_Movie.mkv"), vec![1u8; 4096]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("clip.mp4"), vec![2u8; 10]).unwrap();

        let catalog = ContentCatalog::from_directory(dir.path()).await.unwrap();

        assert_eq!(catalog.len(), 2);
        let names: Vec<_> = catalog.torrents().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["Some Movie".to_string(), "clip".to_string()]);
    }

    #[tokio::test]
    async fn test_disk_source_reads_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.mp4");
        std::fs::write(&path, (0u8..=255).collect::<Vec<_>>()).unwrap();
        let file = SimulatedFile::disk("movie.mp4", 256, path);

        assert_eq!(&file.read(10, 4).await.unwrap()[..], &[10, 11, 12, 13]);
        assert_eq!(file.read(250, 100).await.unwrap().len(), 6);
        assert!(file.read(300, 10).await.unwrap().is_empty());
    }
}
