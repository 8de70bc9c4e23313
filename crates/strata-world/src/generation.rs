//! Procedural chunk generation.
//!
//! [`ChunkGenerator`] is a closed set of strategies. Every strategy is a pure
//! function of the world seed and the chunk coordinate and always returns a
//! loaded chunk.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use strata_common::{ChunkCoord, LocalCoord, CHUNK_SIZE};
use tracing::debug;

use crate::biome::{Biome, BiomeMap};
use crate::block::Material;
use crate::chunk::Chunk;
use crate::noise::{CaveNoise, ImprovedNoise};

/// Base carving threshold applied to the worm-scaled cave field.
pub const CAVE_THRESHOLD: f64 = 0.92;

/// Depth (in blocks below the surface) at which caves reach full density.
pub const CAVE_FULL_DEPTH: f64 = 16.0;

/// Amplitude of the worm-size noise.
const WORM_AMPLITUDE: f64 = 0.15;

/// Frequency of the worm-size noise.
const WORM_FREQUENCY: f64 = 0.1;

/// Which generation strategy a world uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Air everywhere.
    Empty,
    /// Solid fill below y = 0.
    Flat,
    /// Biome terrain with caves.
    #[default]
    Noise,
}

/// World generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// World seed
    pub seed: u64,
    /// Generation strategy
    pub kind: GeneratorKind,
    /// Fill material of the flat strategy
    pub flat_fill: Material,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            kind: GeneratorKind::Noise,
            flat_fill: Material::Stone,
        }
    }
}

/// Fixed layer stack: everything below y = 0 is one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatGenerator {
    /// Fill material
    pub fill: Material,
}

impl FlatGenerator {
    /// Generates a chunk at the given coordinate.
    #[must_use]
    pub fn generate(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        if coord.y < 0 {
            chunk.slots_mut().fill(Some(self.fill));
        }
        chunk.finish_loading();
        chunk
    }
}

/// Biome terrain with worm caves.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    /// Biome selection and height field
    biomes: BiomeMap,
    /// Cave thickness modulation
    worm_noise: ImprovedNoise,
    /// Cave placement field
    caves: CaveNoise,
}

impl NoiseGenerator {
    /// Creates a generator for a world seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            biomes: BiomeMap::new(seed),
            worm_noise: ImprovedNoise::new(seed.wrapping_add(2)),
            caves: CaveNoise::new(seed),
        }
    }

    /// Returns the biome field.
    #[must_use]
    pub const fn biomes(&self) -> &BiomeMap {
        &self.biomes
    }

    /// Carving threshold at `depth` blocks below the surface.
    ///
    /// `None` at or above the surface, where nothing is carved. Shallow depths
    /// divide the threshold by a small modifier, so caves rarely break the
    /// surface; from [`CAVE_FULL_DEPTH`] down it is [`CAVE_THRESHOLD`].
    #[must_use]
    pub fn carve_threshold(depth: i64) -> Option<f64> {
        if depth <= 0 {
            return None;
        }
        let modifier = (depth as f64 / CAVE_FULL_DEPTH).min(1.0);
        Some(CAVE_THRESHOLD / modifier)
    }

    /// Local cave thickness divisor, never below 1.
    #[must_use]
    pub fn worm_size(&self, world_x: i64, world_y: i64) -> f64 {
        let n = self.worm_noise.noise3(
            world_x as f64 * WORM_FREQUENCY,
            world_y as f64 * WORM_FREQUENCY,
            1.0,
        );
        (1.0 + (n * WORM_AMPLITUDE).abs()).max(1.0)
    }

    /// Whether the block at `(world_x, world_y)` is carved out, given the
    /// column's surface height.
    #[must_use]
    pub fn is_cave(&self, world_x: i64, world_y: i64, surface_height: i64) -> bool {
        let Some(threshold) = Self::carve_threshold(surface_height - world_y) else {
            return false;
        };
        let value = self.caves.sample(world_x as f64, world_y as f64);
        value / self.worm_size(world_x, world_y) > threshold
    }

    /// Generates a chunk at the given coordinate.
    #[must_use]
    pub fn generate(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        let origin = coord.to_world_coord();
        let heights = self.biomes.surface_heights(origin.x, CHUNK_SIZE as usize);
        let column_biomes: Vec<Biome> = (0..i64::from(CHUNK_SIZE))
            .map(|lx| self.biomes.biome_at(origin.x + lx))
            .collect();

        let slots = chunk.slots_mut();

        // First pass: terrain
        for local_x in 0..CHUNK_SIZE as u16 {
            let surface = heights[local_x as usize];
            let biome = column_biomes[local_x as usize];
            for local_y in 0..CHUNK_SIZE as u16 {
                let world_y = origin.y + i64::from(local_y);
                if world_y > surface {
                    break;
                }
                let idx = LocalCoord::new(local_x, local_y).to_index();
                slots[idx] = self.biomes.material_at(biome, surface, world_y);
            }
        }

        // Second pass: carve caves
        for local_x in 0..CHUNK_SIZE as u16 {
            let world_x = origin.x + i64::from(local_x);
            let surface = heights[local_x as usize];
            for local_y in 0..CHUNK_SIZE as u16 {
                let world_y = origin.y + i64::from(local_y);
                if world_y >= surface {
                    break;
                }
                if self.is_cave(world_x, world_y, surface) {
                    slots[LocalCoord::new(local_x, local_y).to_index()] = None;
                }
            }
        }

        chunk.finish_loading();
        chunk
    }
}

/// Chunk generation strategy.
#[derive(Debug, Clone)]
pub enum ChunkGenerator {
    /// Air-only chunks.
    Empty,
    /// Fixed layer stack.
    Flat(FlatGenerator),
    /// Biome terrain with caves.
    Noise(Box<NoiseGenerator>),
}

impl ChunkGenerator {
    /// Creates the generator described by `config`.
    #[must_use]
    pub fn new(config: &GeneratorConfig) -> Self {
        match config.kind {
            GeneratorKind::Empty => Self::Empty,
            GeneratorKind::Flat => Self::Flat(FlatGenerator {
                fill: config.flat_fill,
            }),
            GeneratorKind::Noise => Self::Noise(Box::new(NoiseGenerator::new(config.seed))),
        }
    }

    /// Creates a noise generator with the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::new(&GeneratorConfig {
            seed,
            ..Default::default()
        })
    }

    /// Which strategy this is.
    #[must_use]
    pub const fn kind(&self) -> GeneratorKind {
        match self {
            Self::Empty => GeneratorKind::Empty,
            Self::Flat(_) => GeneratorKind::Flat,
            Self::Noise(_) => GeneratorKind::Noise,
        }
    }

    /// Generates a fully loaded chunk. Never fails.
    #[must_use]
    pub fn generate(&self, coord: ChunkCoord) -> Chunk {
        match self {
            Self::Empty => {
                let mut chunk = Chunk::new(coord);
                chunk.finish_loading();
                chunk
            },
            Self::Flat(flat) => flat.generate(coord),
            Self::Noise(noise) => noise.generate(coord),
        }
    }

    /// Generates a batch of chunks on scoped worker threads.
    ///
    /// Output order matches `coords`.
    #[must_use]
    pub fn generate_many(&self, coords: &[ChunkCoord]) -> Vec<Chunk> {
        if coords.is_empty() {
            return Vec::new();
        }
        let workers = std::thread::available_parallelism()
            .map_or(1, NonZeroUsize::get)
            .min(coords.len());
        let per_worker = coords.len().div_ceil(workers);
        debug!(
            "Generating {} chunks on {} workers",
            coords.len(),
            workers
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = coords
                .chunks(per_worker)
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|&coord| self.generate(coord))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    /// Biome at a column.
    #[must_use]
    pub fn biome_at(&self, world_x: i64) -> Biome {
        match self {
            Self::Empty | Self::Flat(_) => Biome::DEFAULT,
            Self::Noise(noise) => noise.biomes.biome_at(world_x),
        }
    }

    /// Surface height of a column (the topmost solid row before carving).
    #[must_use]
    pub fn height_at(&self, world_x: i64) -> i64 {
        match self {
            Self::Empty => 0,
            Self::Flat(_) => -1,
            Self::Noise(noise) => noise.biomes.height_at(world_x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::chunk_to_world;

    #[test]
    fn test_generation_deterministic() {
        let gen1 = ChunkGenerator::with_seed(42);
        let gen2 = ChunkGenerator::with_seed(42);

        for coord in [ChunkCoord::new(0, 1), ChunkCoord::new(-3, 0), ChunkCoord::new(7, -2)] {
            let chunk1 = gen1.generate(coord);
            let chunk2 = gen2.generate(coord);
            assert_eq!(chunk1.slots(), chunk2.slots());
        }
    }

    #[test]
    fn test_different_seeds_different_terrain() {
        let gen1 = ChunkGenerator::with_seed(42);
        let gen2 = ChunkGenerator::with_seed(999);

        let differs = (0..8).any(|cx| {
            let coord = ChunkCoord::new(cx, 2);
            gen1.generate(coord).slots() != gen2.generate(coord).slots()
        });
        assert!(differs);
    }

    #[test]
    fn test_empty_generator() {
        let generator = ChunkGenerator::Empty;
        for coord in [ChunkCoord::new(0, 0), ChunkCoord::new(-5, -5), ChunkCoord::new(9, 100)] {
            let chunk = generator.generate(coord);
            assert!(chunk.is_loaded());
            assert!(chunk.slots().iter().all(Option::is_none));
        }
        assert_eq!(generator.height_at(1234), 0);
        assert_eq!(generator.biome_at(-99), Biome::DEFAULT);
    }

    #[test]
    fn test_flat_generator_layers() {
        let generator = ChunkGenerator::new(&GeneratorConfig {
            kind: GeneratorKind::Flat,
            flat_fill: Material::Dirt,
            ..Default::default()
        });

        let below = generator.generate(ChunkCoord::new(3, -1));
        assert!(below.is_loaded());
        assert!(below.slots().iter().all(|s| *s == Some(Material::Dirt)));

        let above = generator.generate(ChunkCoord::new(3, 0));
        assert!(above.slots().iter().all(Option::is_none));
        assert!(!below.is_modified());
    }

    #[test]
    fn test_carve_threshold_shape() {
        assert_eq!(NoiseGenerator::carve_threshold(0), None);
        assert_eq!(NoiseGenerator::carve_threshold(-3), None);

        let mut previous = f64::INFINITY;
        for depth in 1..=16 {
            let threshold = NoiseGenerator::carve_threshold(depth).expect("positive depth");
            assert!(threshold < previous, "threshold not decreasing at depth {depth}");
            previous = threshold;
        }
        for depth in [16, 17, 100, 10_000] {
            assert_eq!(NoiseGenerator::carve_threshold(depth), Some(CAVE_THRESHOLD));
        }
    }

    #[test]
    fn test_worm_size_at_least_one() {
        let noise = NoiseGenerator::new(3);
        for i in -200..200 {
            let w = noise.worm_size(i * 7, i * 3);
            assert!((1.0..=1.15 + 1e-9).contains(&w));
        }
    }

    #[test]
    fn test_caves_sparser_near_surface() {
        let noise = NoiseGenerator::new(8080);
        let surface = 100;
        let mut shallow = 0;
        let mut deep = 0;
        for x in 0..4000 {
            for depth in 1..=8 {
                if noise.is_cave(x, surface - depth, surface) {
                    shallow += 1;
                }
            }
            for depth in 40..=47 {
                if noise.is_cave(x, surface - depth, surface) {
                    deep += 1;
                }
            }
        }
        assert!(deep > 0, "no caves carved at depth");
        assert!(shallow < deep, "shallow {shallow} >= deep {deep}");
    }

    #[test]
    fn test_deep_chunks_are_carved() {
        let ChunkGenerator::Noise(noise) = ChunkGenerator::with_seed(42) else {
            panic!("expected noise generator");
        };
        let mut carved = 0;
        for cx in -16..16 {
            for cy in -1..=0 {
                let chunk = noise.generate(ChunkCoord::new(cx, cy));
                // Every biome keeps its surface above y = 31, so air here is a cave.
                carved += chunk.slots().iter().filter(|slot| slot.is_none()).count();
            }
        }
        assert!(carved > 0, "underground chunks contain no caves");
    }

    #[test]
    fn test_surface_block_matches_biome_layering() {
        let ChunkGenerator::Noise(noise) = ChunkGenerator::with_seed(77) else {
            panic!("expected noise generator");
        };
        let cx = -2;
        for cy in -1..8 {
            let chunk = noise.generate(ChunkCoord::new(cx, cy));
            for local_x in 0..CHUNK_SIZE as u16 {
                let world_x = chunk_to_world(i64::from(cx), i64::from(local_x));
                let surface = noise.biomes().height_at(world_x);
                let biome = noise.biomes().biome_at(world_x);
                for local_y in 0..CHUNK_SIZE as u16 {
                    let world_y = chunk_to_world(i64::from(cy), i64::from(local_y));
                    let slot = chunk.get(LocalCoord::new(local_x, local_y));
                    if world_y > surface {
                        assert_eq!(slot, None);
                    } else if world_y == surface {
                        assert_eq!(slot, noise.biomes().material_at(biome, surface, world_y));
                    }
                }
            }
        }
    }

    #[test]
    fn test_generate_many_matches_serial() {
        let generator = ChunkGenerator::with_seed(5);
        let coords: Vec<_> = (-3..3).map(|x| ChunkCoord::new(x, 1)).collect();
        let batch = generator.generate_many(&coords);
        assert_eq!(batch.len(), coords.len());
        for (chunk, coord) in batch.iter().zip(&coords) {
            assert_eq!(chunk.coord(), *coord);
            assert_eq!(chunk.slots(), generator.generate(*coord).slots());
        }
        assert!(generator.generate_many(&[]).is_empty());
    }
}
