//! Chunk persistence and the load-or-generate path.
//!
//! A [`ChunkStore`] only moves bytes. [`ChunkLoader`] owns the policy: persisted
//! chunks are deserialized, missing or corrupt ones are regenerated, and only
//! modified chunks are written back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use strata_common::ChunkCoord;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkError};
use crate::generation::ChunkGenerator;

/// File extension of persisted chunks.
pub const CHUNK_EXTENSION: &str = "stch";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding or decoding failure
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),
    /// Persisted header names a different chunk
    #[error("Stored chunk {found} does not match requested {expected}")]
    CoordinateMismatch {
        /// Requested coordinate
        expected: ChunkCoord,
        /// Coordinate found in the header
        found: ChunkCoord,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Byte-level chunk persistence.
pub trait ChunkStore: Send + Sync {
    /// Whether bytes exist for the coordinate.
    fn exists(&self, coord: ChunkCoord) -> bool;

    /// Reads persisted bytes. `Ok(None)` when nothing is stored.
    fn read(&self, coord: ChunkCoord) -> StoreResult<Option<Vec<u8>>>;

    /// Replaces the persisted bytes for the coordinate.
    fn write(&self, coord: ChunkCoord, bytes: &[u8]) -> StoreResult<()>;
}

impl<S: ChunkStore + ?Sized> ChunkStore for Arc<S> {
    fn exists(&self, coord: ChunkCoord) -> bool {
        (**self).exists(coord)
    }

    fn read(&self, coord: ChunkCoord) -> StoreResult<Option<Vec<u8>>> {
        (**self).read(coord)
    }

    fn write(&self, coord: ChunkCoord, bytes: &[u8]) -> StoreResult<()> {
        (**self).write(coord, bytes)
    }
}

/// Stores each chunk as one file under a root directory.
#[derive(Debug, Clone)]
pub struct FileChunkStore {
    root: PathBuf,
}

impl FileChunkStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path for a chunk.
    #[must_use]
    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.root
            .join(coord.x.to_string())
            .join(format!("chunk_{}_{}.{CHUNK_EXTENSION}", coord.x, coord.y))
    }
}

impl ChunkStore for FileChunkStore {
    fn exists(&self, coord: ChunkCoord) -> bool {
        self.chunk_path(coord).is_file()
    }

    fn read(&self, coord: ChunkCoord) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.chunk_path(coord)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, coord: ChunkCoord, bytes: &[u8]) -> StoreResult<()> {
        let path = self.chunk_path(coord);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }
}

/// Keeps chunk bytes in memory.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<AHashMap<u64, Vec<u8>>>,
    writes: Mutex<usize>,
}

impl MemoryChunkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation.
    #[must_use]
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    /// Number of stored chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Overwrites stored bytes without counting a write.
    pub fn insert_raw(&self, coord: ChunkCoord, bytes: Vec<u8>) {
        self.chunks.lock().insert(coord.key(), bytes);
    }
}

impl ChunkStore for MemoryChunkStore {
    fn exists(&self, coord: ChunkCoord) -> bool {
        self.chunks.lock().contains_key(&coord.key())
    }

    fn read(&self, coord: ChunkCoord) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.chunks.lock().get(&coord.key()).cloned())
    }

    fn write(&self, coord: ChunkCoord, bytes: &[u8]) -> StoreResult<()> {
        self.chunks.lock().insert(coord.key(), bytes.to_vec());
        *self.writes.lock() += 1;
        Ok(())
    }
}

/// Loads chunks from a store, falling back to generation.
pub struct ChunkLoader {
    store: Box<dyn ChunkStore>,
    generator: ChunkGenerator,
}

impl ChunkLoader {
    /// Creates a loader over a store and a generator.
    #[must_use]
    pub fn new(store: Box<dyn ChunkStore>, generator: ChunkGenerator) -> Self {
        Self { store, generator }
    }

    /// The generator used for chunks with no usable persisted copy.
    #[must_use]
    pub const fn generator(&self) -> &ChunkGenerator {
        &self.generator
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    /// Returns a loaded chunk for `coord`.
    ///
    /// Persisted bytes win over generation. Unreadable or corrupt bytes are
    /// logged and replaced by a freshly generated chunk.
    pub fn load(&self, coord: ChunkCoord) -> Chunk {
        match self.read_persisted(coord) {
            Ok(Some(chunk)) => {
                debug!("Loaded chunk {coord} from store");
                chunk
            },
            Ok(None) => self.generator.generate(coord),
            Err(e) => {
                warn!("Discarding stored chunk {coord}: {e}");
                self.generator.generate(coord)
            },
        }
    }

    fn read_persisted(&self, coord: ChunkCoord) -> StoreResult<Option<Chunk>> {
        let Some(bytes) = self.store.read(coord)? else {
            return Ok(None);
        };
        let chunk = Chunk::deserialize(&bytes)?;
        if chunk.coord() != coord {
            return Err(StoreError::CoordinateMismatch {
                expected: coord,
                found: chunk.coord(),
            });
        }
        Ok(Some(chunk))
    }

    /// Persists `chunk` if it was modified.
    ///
    /// Returns `Ok(true)` when bytes were written. The modified flag is cleared
    /// only after a successful write.
    pub fn save(&self, chunk: &mut Chunk) -> StoreResult<bool> {
        if !chunk.is_modified() {
            return Ok(false);
        }
        let bytes = chunk.serialize()?;
        self.store.write(chunk.coord(), &bytes)?;
        chunk.mark_saved();
        Ok(true)
    }
}

impl std::fmt::Debug for ChunkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkLoader")
            .field("generator", &self.generator.kind())
            .finish_non_exhaustive()
    }
}
