//! Chunk data structure, lifecycle flags and serialization.

use serde::{Deserialize, Serialize};
use strata_common::{ChunkCoord, LocalCoord, MagicBytes, SchemaVersion, CHUNK_AREA, CHUNK_SIZE};
use thiserror::Error;

use crate::block::{slot_id, Block, Material};

/// Chunk errors.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Serialization failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
    /// Deserialization failed
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
    /// Invalid magic bytes
    #[error("Invalid chunk format")]
    InvalidFormat,
    /// Version mismatch
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version
        actual: String,
    },
    /// Compression failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),
}

/// Result type for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Chunk header for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHeader {
    /// Magic bytes for format identification
    pub magic: [u8; 4],
    /// Schema version
    pub version: SchemaVersion,
    /// Chunk X coordinate
    pub x: i32,
    /// Chunk Y coordinate
    pub y: i32,
    /// Chunk size in blocks
    pub size: u32,
    /// Compression type (0 = none, 1 = lz4)
    pub compression: u8,
}

impl ChunkHeader {
    /// Creates a new header.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            magic: MagicBytes::CHUNK.0,
            version: SchemaVersion::CHUNK_FILE,
            x: coord.x,
            y: coord.y,
            size: CHUNK_SIZE,
            compression: 1, // LZ4 by default
        }
    }

    /// Validates the header.
    pub fn validate(&self) -> ChunkResult<()> {
        if self.magic != MagicBytes::CHUNK.0 {
            return Err(ChunkError::InvalidFormat);
        }
        if !SchemaVersion::CHUNK_FILE.can_read(&self.version) {
            return Err(ChunkError::VersionMismatch {
                expected: SchemaVersion::CHUNK_FILE.to_string(),
                actual: self.version.to_string(),
            });
        }
        if self.compression != 1 {
            return Err(ChunkError::DeserializationFailed(format!(
                "unknown compression {}",
                self.compression
            )));
        }
        if self.size != CHUNK_SIZE {
            return Err(ChunkError::DeserializationFailed(format!(
                "chunk size {} does not match {CHUNK_SIZE}",
                self.size
            )));
        }
        Ok(())
    }
}

/// A square region of the world.
///
/// Freshly constructed chunks are unloaded. Generators and the deserializer
/// populate the grid and then call [`Chunk::finish_loading`]; writes made after
/// that point set the modified flag.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk coordinate
    coord: ChunkCoord,
    /// Block slots, `None` is air
    slots: Vec<Option<Material>>,
    /// Written to since loading completed
    modified: bool,
    /// Generation or deserialization completed
    loaded: bool,
    /// Streaming may evict this chunk
    allow_unload: bool,
    /// Tick at which the chunk was last seen by the viewport
    last_viewed_tick: u64,
    /// Derived: no solid slot
    all_air: bool,
    /// Slots waiting for a block update
    scheduled: Vec<LocalCoord>,
    /// Top-row columns that turned to air since the last drain
    vacated_top: Vec<u16>,
}

impl Chunk {
    /// Creates a new all-air, unloaded chunk.
    #[must_use]
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            slots: vec![None; CHUNK_AREA],
            modified: false,
            loaded: false,
            allow_unload: true,
            last_viewed_tick: 0,
            all_air: true,
            scheduled: Vec::new(),
            vacated_top: Vec::new(),
        }
    }

    /// Returns the chunk coordinate.
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Whether the chunk changed since it was loaded or last saved.
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Clears the modified flag after a successful save.
    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    /// Whether loading completed.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether streaming may evict this chunk.
    #[must_use]
    pub const fn allow_unload(&self) -> bool {
        self.allow_unload
    }

    /// Pins or unpins the chunk in memory.
    pub fn set_allow_unload(&mut self, allow: bool) {
        self.allow_unload = allow;
    }

    /// Tick at which the viewport last saw this chunk.
    #[must_use]
    pub const fn last_viewed_tick(&self) -> u64 {
        self.last_viewed_tick
    }

    /// Records that the viewport saw this chunk at `tick`.
    pub fn mark_viewed(&mut self, tick: u64) {
        self.last_viewed_tick = tick;
    }

    /// Cached "no solid blocks" flag, refreshed on load and on rare ticks.
    #[must_use]
    pub const fn is_all_air(&self) -> bool {
        self.all_air
    }

    /// Marks loading complete and derives caches.
    pub fn finish_loading(&mut self) {
        self.loaded = true;
        self.refresh_caches();
    }

    fn refresh_caches(&mut self) {
        self.all_air = self.slots.iter().all(Option::is_none);
    }

    /// Gets a slot at local coordinates.
    #[must_use]
    pub fn get(&self, local: LocalCoord) -> Option<Material> {
        if !local.in_bounds() {
            return None;
        }
        self.slots[local.to_index()]
    }

    /// Gets the solid block at local coordinates.
    #[must_use]
    pub fn block(&self, local: LocalCoord) -> Option<Block> {
        self.get(local).map(|material| Block {
            material,
            chunk: self.coord,
            local,
        })
    }

    /// Writes a slot and returns the previous contents.
    ///
    /// Writes after loading completed set the modified flag and schedule the
    /// slot and the one above it for a block update.
    pub fn set(&mut self, local: LocalCoord, slot: Option<Material>) -> Option<Material> {
        if !local.in_bounds() {
            return None;
        }
        let previous = std::mem::replace(&mut self.slots[local.to_index()], slot);
        if self.loaded {
            self.modified = true;
            if slot.is_some() {
                self.all_air = false;
            }
            self.schedule(local);
            if u32::from(local.y) + 1 < CHUNK_SIZE {
                self.schedule(LocalCoord::new(local.x, local.y + 1));
            } else if slot.is_none() && previous.is_some() {
                self.vacated_top.push(local.x);
            }
        }
        previous
    }

    /// Queues a slot for the next per-tick update.
    pub fn schedule(&mut self, local: LocalCoord) {
        if local.in_bounds() && !self.scheduled.contains(&local) {
            self.scheduled.push(local);
        }
    }

    /// Takes the top-row columns that became air since the last call.
    ///
    /// A gravity block resting on one of them in the chunk above needs a
    /// wake-up from the owner of both chunks.
    pub fn take_vacated_top(&mut self) -> Vec<u16> {
        std::mem::take(&mut self.vacated_top)
    }

    /// Number of slots waiting for a block update.
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    /// Returns a slice of all slots, row-major from the bottom row.
    #[must_use]
    pub fn slots(&self) -> &[Option<Material>] {
        &self.slots
    }

    /// Mutable slot access for generators. Does not touch the modified flag.
    pub fn slots_mut(&mut self) -> &mut [Option<Material>] {
        &mut self.slots
    }

    /// Per-tick update.
    ///
    /// Drains the scheduled slots. A gravity block with air beneath drops one
    /// slot and stays scheduled. Gravity blocks on the bottom row are returned
    /// so the world can hand them to the chunk below.
    pub fn tick(&mut self) -> Vec<LocalCoord> {
        let mut spills = Vec::new();
        for local in std::mem::take(&mut self.scheduled) {
            let Some(material) = self.get(local) else {
                continue;
            };
            if !material.has_gravity() {
                continue;
            }
            if local.y == 0 {
                spills.push(local);
                continue;
            }
            let below = LocalCoord::new(local.x, local.y - 1);
            if self.get(below).is_none() {
                self.set(local, None);
                self.set(below, Some(material));
            }
        }
        spills
    }

    /// Rare update: re-derives caches.
    pub fn tick_rare(&mut self) {
        self.refresh_caches();
    }

    /// Serializes the chunk to bytes.
    pub fn serialize(&self) -> ChunkResult<Vec<u8>> {
        let header = ChunkHeader::new(self.coord);

        let header_bytes = bincode::serialize(&header)
            .map_err(|e| ChunkError::SerializationFailed(e.to_string()))?;

        let slot_bytes: Vec<u8> = self.slots.iter().map(|slot| slot_id(*slot)).collect();
        let compressed = lz4_flex::compress_prepend_size(&slot_bytes);

        // Combine header + compressed slots
        let mut result = Vec::with_capacity(header_bytes.len() + compressed.len() + 4);
        result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&compressed);

        Ok(result)
    }

    /// Deserializes a chunk from bytes. The result is loaded and unmodified.
    pub fn deserialize(bytes: &[u8]) -> ChunkResult<Self> {
        if bytes.len() < 8 {
            return Err(ChunkError::DeserializationFailed("data too short".into()));
        }

        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() < 4 + header_len {
            return Err(ChunkError::DeserializationFailed(
                "header length mismatch".into(),
            ));
        }

        let header: ChunkHeader = bincode::deserialize(&bytes[4..4 + header_len])
            .map_err(|e| ChunkError::DeserializationFailed(e.to_string()))?;
        header.validate()?;

        let body = &bytes[4 + header_len..];
        if body.len() < 4 {
            return Err(ChunkError::DeserializationFailed("missing slot data".into()));
        }
        let (prefix, compressed) = body.split_at(4);
        let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
        if declared != CHUNK_AREA {
            return Err(ChunkError::DeserializationFailed(format!(
                "slot data size {declared} does not match {CHUNK_AREA}"
            )));
        }

        let mut slot_bytes = vec![0u8; CHUNK_AREA];
        let written = lz4_flex::block::decompress_into(compressed, &mut slot_bytes)
            .map_err(|e| ChunkError::CompressionFailed(e.to_string()))?;
        if written != CHUNK_AREA {
            return Err(ChunkError::DeserializationFailed(
                "slot data size mismatch".into(),
            ));
        }

        let slots = slot_bytes
            .iter()
            .map(|&id| match id {
                0 => Ok(None),
                id => Material::from_id(id).map(Some).ok_or_else(|| {
                    ChunkError::DeserializationFailed(format!("unknown material id {id}"))
                }),
            })
            .collect::<ChunkResult<Vec<_>>>()?;

        let mut chunk = Self::new(ChunkCoord::new(header.x, header.y));
        chunk.slots = slots;
        chunk.finish_loading();
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        chunk.finish_loading();
        chunk
    }

    #[test]
    fn test_new_chunk_is_unloaded() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0));
        assert!(!chunk.is_loaded());
        assert!(!chunk.is_modified());
        assert!(chunk.allow_unload());
        assert!(chunk.is_all_air());
    }

    #[test]
    fn test_writes_before_loading_do_not_mark_modified() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        chunk.set(LocalCoord::new(1, 1), Some(Material::Stone));
        assert!(!chunk.is_modified());
        chunk.finish_loading();
        assert!(!chunk.is_all_air());

        chunk.set(LocalCoord::new(2, 2), Some(Material::Dirt));
        assert!(chunk.is_modified());
        chunk.mark_saved();
        assert!(!chunk.is_modified());
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut chunk = loaded(ChunkCoord::new(0, 0));
        assert_eq!(chunk.get(LocalCoord::new(40, 0)), None);
        assert_eq!(chunk.set(LocalCoord::new(0, 40), Some(Material::Stone)), None);
        assert!(!chunk.is_modified());
    }

    #[test]
    fn test_sand_falls_within_chunk() {
        let mut chunk = loaded(ChunkCoord::new(0, 0));
        chunk.set(LocalCoord::new(3, 2), Some(Material::Sand));

        chunk.tick();
        assert_eq!(chunk.get(LocalCoord::new(3, 1)), Some(Material::Sand));
        assert_eq!(chunk.get(LocalCoord::new(3, 2)), None);

        chunk.tick();
        assert_eq!(chunk.get(LocalCoord::new(3, 0)), Some(Material::Sand));

        let spills = chunk.tick();
        assert_eq!(spills, vec![LocalCoord::new(3, 0)]);
    }

    #[test]
    fn test_stone_does_not_fall() {
        let mut chunk = loaded(ChunkCoord::new(0, 0));
        chunk.set(LocalCoord::new(3, 5), Some(Material::Stone));
        assert!(chunk.tick().is_empty());
        assert_eq!(chunk.get(LocalCoord::new(3, 5)), Some(Material::Stone));
        assert_eq!(chunk.scheduled_len(), 0);
    }

    #[test]
    fn test_rare_tick_refreshes_all_air() {
        let mut chunk = loaded(ChunkCoord::new(0, 0));
        chunk.set(LocalCoord::new(0, 0), Some(Material::Clay));
        chunk.set(LocalCoord::new(0, 0), None);
        assert!(!chunk.is_all_air());
        chunk.tick_rare();
        assert!(chunk.is_all_air());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut chunk = loaded(ChunkCoord::new(-4, 9));
        chunk.set(LocalCoord::new(0, 0), Some(Material::Gravel));
        chunk.set(LocalCoord::new(31, 31), Some(Material::Snow));

        let bytes = chunk.serialize().expect("serialize failed");
        let restored = Chunk::deserialize(&bytes).expect("deserialize failed");

        assert_eq!(restored.coord(), ChunkCoord::new(-4, 9));
        assert_eq!(restored.slots(), chunk.slots());
        assert!(restored.is_loaded());
        assert!(!restored.is_modified());
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        assert!(Chunk::deserialize(&[1, 2, 3]).is_err());
        assert!(Chunk::deserialize(&[0xFF; 64]).is_err());
    }

    #[test]
    fn test_deserialize_rejects_bad_magic() {
        let chunk = loaded(ChunkCoord::new(0, 0));
        let mut bytes = chunk.serialize().expect("serialize failed");
        bytes[4] ^= 0xFF;
        assert!(matches!(
            Chunk::deserialize(&bytes),
            Err(ChunkError::InvalidFormat)
        ));
    }

    #[test]
    fn test_deserialize_rejects_oversized_slot_prefix() {
        let chunk = loaded(ChunkCoord::new(2, 2));
        let mut bytes = chunk.serialize().expect("serialize failed");
        let header_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let prefix = 4 + header_len;
        bytes[prefix..prefix + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Chunk::deserialize(&bytes),
            Err(ChunkError::DeserializationFailed(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_newer_minor_version() {
        let header = ChunkHeader {
            version: SchemaVersion::new(
                SchemaVersion::CHUNK_FILE.major,
                SchemaVersion::CHUNK_FILE.minor + 1,
            ),
            ..ChunkHeader::new(ChunkCoord::new(0, 0))
        };
        assert!(matches!(
            header.validate(),
            Err(ChunkError::VersionMismatch { .. })
        ));
        assert!(ChunkHeader::new(ChunkCoord::new(0, 0)).validate().is_ok());
    }

    #[test]
    fn test_clearing_top_row_records_column() {
        let mut chunk = loaded(ChunkCoord::new(0, 0));
        chunk.set(LocalCoord::new(4, 31), Some(Material::Stone));
        assert!(chunk.take_vacated_top().is_empty());

        chunk.set(LocalCoord::new(4, 31), None);
        chunk.set(LocalCoord::new(6, 31), None);
        chunk.set(LocalCoord::new(4, 30), None);
        assert_eq!(chunk.take_vacated_top(), vec![4]);
        assert!(chunk.take_vacated_top().is_empty());
    }
}
