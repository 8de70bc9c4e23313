//! Coordinate types for world, chunk, and local positions.
//!
//! World coordinates are 64-bit block positions with `y` growing upwards.
//! Chunk coordinates index the square `CHUNK_SIZE` grid and always use floor
//! semantics, so `-1` lands in chunk `-1` at local offset `CHUNK_SIZE - 1`.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Width and height of a chunk in blocks.
pub const CHUNK_SIZE: u32 = 32;

/// Number of block slots in a chunk.
pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

const CHUNK_SIZE_I64: i64 = CHUNK_SIZE as i64;

/// Converts a world block coordinate to the index of the chunk containing it.
#[must_use]
pub const fn world_to_chunk(world: i64) -> i64 {
    world.div_euclid(CHUNK_SIZE_I64)
}

/// Converts a chunk index and a local offset back to a world block coordinate.
#[must_use]
pub const fn chunk_to_world(chunk: i64, local: i64) -> i64 {
    chunk * CHUNK_SIZE_I64 + local
}

/// Offset of a world block coordinate inside its chunk, in `[0, CHUNK_SIZE)`.
#[must_use]
pub const fn chunk_offset(world: i64) -> i64 {
    world.rem_euclid(CHUNK_SIZE_I64)
}

/// Packs two values into one map key.
///
/// `a` occupies the high 32 bits and `b` the low 32 bits.
///
/// # Panics
///
/// Panics if either value does not fit in an `i32`. Truncating instead would
/// alias distinct keys in the resident-chunk map.
#[must_use]
pub fn compact(a: i64, b: i64) -> u64 {
    assert!(
        i32::try_from(a).is_ok() && i32::try_from(b).is_ok(),
        "compact: ({a}, {b}) exceeds the 32-bit half width"
    );
    (u64::from(a as i32 as u32) << 32) | u64::from(b as i32 as u32)
}

/// Recovers the first value packed by [`compact`].
#[must_use]
pub const fn decompact_a(key: u64) -> i64 {
    (key >> 32) as u32 as i32 as i64
}

/// Recovers the second value packed by [`compact`].
#[must_use]
pub const fn decompact_b(key: u64) -> i64 {
    key as u32 as i32 as i64
}

/// World coordinate in blocks (global position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct WorldCoord {
    /// X coordinate in world space
    pub x: i64,
    /// Y coordinate in world space (up is positive)
    pub y: i64,
}

impl WorldCoord {
    /// Creates a new world coordinate.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Converts to the coordinate of the chunk containing this block.
    ///
    /// # Panics
    ///
    /// Panics if the chunk index does not fit in an `i32`.
    #[must_use]
    pub fn to_chunk_coord(self) -> ChunkCoord {
        let x = world_to_chunk(self.x);
        let y = world_to_chunk(self.y);
        assert!(
            i32::try_from(x).is_ok() && i32::try_from(y).is_ok(),
            "world coordinate ({}, {}) is outside the addressable chunk range",
            self.x,
            self.y
        );
        ChunkCoord::new(x as i32, y as i32)
    }

    /// Converts to the local coordinate within its chunk.
    #[must_use]
    pub const fn to_local_coord(self) -> LocalCoord {
        LocalCoord {
            x: chunk_offset(self.x) as u16,
            y: chunk_offset(self.y) as u16,
        }
    }
}

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Pod, Zeroable,
)]
#[repr(C)]
pub struct ChunkCoord {
    /// X coordinate in chunk space
    pub x: i32,
    /// Y coordinate in chunk space
    pub y: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// World coordinate of the chunk's bottom-left block.
    #[must_use]
    pub const fn to_world_coord(self) -> WorldCoord {
        WorldCoord {
            x: chunk_to_world(self.x as i64, 0),
            y: chunk_to_world(self.y as i64, 0),
        }
    }

    /// World coordinate of a block inside this chunk.
    #[must_use]
    pub const fn world_at(self, local: LocalCoord) -> WorldCoord {
        WorldCoord {
            x: chunk_to_world(self.x as i64, local.x as i64),
            y: chunk_to_world(self.y as i64, local.y as i64),
        }
    }

    /// Packed key used by the resident-chunk map.
    #[must_use]
    pub fn key(self) -> u64 {
        compact(i64::from(self.x), i64::from(self.y))
    }

    /// Rebuilds a coordinate from a key produced by [`ChunkCoord::key`].
    #[must_use]
    pub const fn from_key(key: u64) -> Self {
        Self {
            x: decompact_a(key) as i32,
            y: decompact_b(key) as i32,
        }
    }

    /// The chunk directly below this one.
    #[must_use]
    pub const fn below(self) -> Self {
        Self {
            x: self.x,
            y: self.y - 1,
        }
    }

    /// The chunk directly above this one.
    #[must_use]
    pub const fn above(self) -> Self {
        Self {
            x: self.x,
            y: self.y + 1,
        }
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Local coordinate within a chunk (0 to CHUNK_SIZE-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct LocalCoord {
    /// X coordinate within chunk
    pub x: u16,
    /// Y coordinate within chunk
    pub y: u16,
}

impl LocalCoord {
    /// Creates a new local coordinate.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Whether both components are inside the chunk.
    #[must_use]
    pub const fn in_bounds(self) -> bool {
        (self.x as u32) < CHUNK_SIZE && (self.y as u32) < CHUNK_SIZE
    }

    /// Converts to linear index for array access.
    #[must_use]
    pub const fn to_index(self) -> usize {
        (self.y as usize) * (CHUNK_SIZE as usize) + (self.x as usize)
    }

    /// Creates from linear index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        let size = CHUNK_SIZE as usize;
        Self {
            x: (index % size) as u16,
            y: (index / size) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_negative_world_coords_floor() {
        assert_eq!(world_to_chunk(-1), -1);
        assert_eq!(chunk_offset(-1), i64::from(CHUNK_SIZE) - 1);
        assert_eq!(world_to_chunk(-32), -1);
        assert_eq!(chunk_offset(-32), 0);
        assert_eq!(world_to_chunk(-33), -2);
    }

    #[test]
    fn test_world_to_chunk_coord() {
        let world = WorldCoord::new(100, -5);
        assert_eq!(world.to_chunk_coord(), ChunkCoord::new(3, -1));
        assert_eq!(world.to_local_coord(), LocalCoord::new(4, 27));
        assert_eq!(
            ChunkCoord::new(3, -1).world_at(LocalCoord::new(4, 27)),
            world
        );
    }

    #[test]
    fn test_chunk_key_round_trip() {
        for coord in [
            ChunkCoord::new(0, 0),
            ChunkCoord::new(-1, 7),
            ChunkCoord::new(i32::MIN, i32::MAX),
        ] {
            assert_eq!(ChunkCoord::from_key(coord.key()), coord);
        }
    }

    #[test]
    fn test_local_index_round_trip() {
        let local = LocalCoord::new(5, 9);
        assert_eq!(LocalCoord::from_index(local.to_index()), local);
        assert!(!LocalCoord::new(32, 0).in_bounds());
    }

    #[test]
    #[should_panic(expected = "exceeds the 32-bit half width")]
    fn test_compact_rejects_wide_values() {
        let _ = compact(i64::from(i32::MAX) + 1, 0);
    }

    #[test]
    #[should_panic(expected = "outside the addressable chunk range")]
    fn test_chunk_coord_rejects_far_world_coords() {
        let _ = WorldCoord::new(i64::MAX, 0).to_chunk_coord();
    }

    proptest! {
        #[test]
        fn prop_world_chunk_round_trip(w in any::<i64>()) {
            prop_assert_eq!(chunk_to_world(world_to_chunk(w), chunk_offset(w)), w);
        }

        #[test]
        fn prop_offset_in_range(w in any::<i64>()) {
            let offset = chunk_offset(w);
            prop_assert!((0..i64::from(CHUNK_SIZE)).contains(&offset));
        }

        #[test]
        fn prop_compact_round_trip(
            x in -1_000_000_i64..1_000_000,
            y in -1_000_000_i64..1_000_000,
        ) {
            let key = compact(x, y);
            prop_assert_eq!(decompact_a(key), x);
            prop_assert_eq!(decompact_b(key), y);
        }
    }
}
