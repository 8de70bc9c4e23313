//! # Strata World
//!
//! Terrain generation and chunk streaming.
//!
//! This crate handles:
//! - Seeded noise and biome-blended terrain
//! - Chunk generation strategies (empty, flat, noise with caves)
//! - Chunk persistence with a load-or-generate fallback
//! - Time-windowed streaming of resident chunks

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod biome;
pub mod block;
pub mod chunk;
pub mod generation;
pub mod noise;
pub mod store;
pub mod streaming;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::biome::{Biome, BiomeMap, BiomeParams};
    pub use crate::block::{Block, Material};
    pub use crate::chunk::*;
    pub use crate::generation::*;
    pub use crate::noise::{CaveNoise, ImprovedNoise};
    pub use crate::store::*;
    pub use crate::streaming::*;
    pub use crate::world::{World, WorldConfig};
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::{ChunkCoord, LocalCoord};

    #[test]
    fn test_chunk_creation() {
        let coord = ChunkCoord::new(0, 0);
        let chunk = Chunk::new(coord);
        assert_eq!(chunk.coord(), coord);
        assert!(!chunk.is_modified());
    }

    #[test]
    fn test_generated_chunk_serialization() {
        let coord = ChunkCoord::new(1, 2);
        let chunk = ChunkGenerator::with_seed(8).generate(coord);
        let bytes = chunk.serialize().expect("serialize failed");
        let loaded = Chunk::deserialize(&bytes).expect("deserialize failed");
        assert_eq!(loaded.coord(), coord);
        assert_eq!(loaded.get(LocalCoord::new(4, 4)), chunk.get(LocalCoord::new(4, 4)));
    }
}
