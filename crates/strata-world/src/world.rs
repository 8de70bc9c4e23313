//! The resident world: block access, chunk residency and the tick pass.
//!
//! [`World`] exclusively owns the resident-chunk map. It is meant to live on a
//! single tick thread; other threads reach it through the engine's command
//! queue.

use std::path::PathBuf;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use strata_common::{
    ChunkCoord, LocalCoord, StrataResult, WorldCoord, WorldError, CHUNK_SIZE,
};
use tracing::{debug, info, warn};

use crate::biome::Biome;
use crate::block::{Block, Material};
use crate::chunk::Chunk;
use crate::generation::{ChunkGenerator, GeneratorConfig, GeneratorKind};
use crate::store::{ChunkLoader, ChunkStore, FileChunkStore, MemoryChunkStore};
use crate::streaming::{Spill, StreamingManager, StreamingReport, ViewRect, Viewport};

/// Configuration for a world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World seed for deterministic generation
    pub seed: u64,
    /// Generation strategy
    pub generator: GeneratorKind,
    /// Fill material of the flat strategy
    pub flat_fill: Material,
    /// Tick rate of the streaming pass
    pub ticks_per_second: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: Self::random_seed(),
            generator: GeneratorKind::Noise,
            flat_fill: Material::Stone,
            ticks_per_second: 30,
        }
    }
}

impl WorldConfig {
    /// Creates a config with the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    /// Generates a seed from the system time.
    #[must_use]
    pub fn random_seed() -> u64 {
        use std::time::SystemTime;
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    }

    /// Generator settings derived from this config.
    #[must_use]
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            seed: self.seed,
            kind: self.generator,
            flat_fill: self.flat_fill,
        }
    }
}

/// Resident chunks plus the machinery to load, tick and evict them.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    chunks: AHashMap<u64, Chunk>,
    loader: ChunkLoader,
    streaming: StreamingManager,
    /// Block positions changed since the last drain
    changes: Vec<WorldCoord>,
}

impl World {
    /// Creates a world persisting into `store`.
    #[must_use]
    pub fn new(config: WorldConfig, store: Box<dyn ChunkStore>) -> Self {
        info!(
            "Creating world: seed {}, generator {:?}, {} tps",
            config.seed, config.generator, config.ticks_per_second
        );
        let generator = ChunkGenerator::new(&config.generator_config());
        Self {
            streaming: StreamingManager::new(config.ticks_per_second),
            loader: ChunkLoader::new(store, generator),
            chunks: AHashMap::new(),
            changes: Vec::new(),
            config,
        }
    }

    /// Creates a world saving under `save_dir`.
    #[must_use]
    pub fn with_save_dir(config: WorldConfig, save_dir: impl Into<PathBuf>) -> Self {
        Self::new(config, Box::new(FileChunkStore::new(save_dir)))
    }

    /// Creates a world whose saves live only in memory.
    #[must_use]
    pub fn in_memory(config: WorldConfig) -> Self {
        Self::new(config, Box::new(MemoryChunkStore::new()))
    }

    /// World configuration.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// World seed.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.config.seed
    }

    /// Active generator.
    #[must_use]
    pub const fn generator(&self) -> &ChunkGenerator {
        self.loader.generator()
    }

    /// Streaming policy and tick counter.
    #[must_use]
    pub const fn streaming(&self) -> &StreamingManager {
        &self.streaming
    }

    /// Current tick number.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.streaming.current_tick()
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whether a chunk is resident.
    #[must_use]
    pub fn is_resident(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord.key())
    }

    /// Iterates over the resident chunks in no particular order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Biome of a column.
    #[must_use]
    pub fn biome_at(&self, world_x: i64) -> Biome {
        self.generator().biome_at(world_x)
    }

    /// Generated surface height of a column.
    #[must_use]
    pub fn height_at(&self, world_x: i64) -> i64 {
        self.generator().height_at(world_x)
    }

    /// Gets a resident chunk.
    #[must_use]
    pub fn get_chunk(&self, chunk_x: i32, chunk_y: i32) -> Option<&Chunk> {
        self.chunks.get(&ChunkCoord::new(chunk_x, chunk_y).key())
    }

    /// Runs the generator for a chunk without touching the resident set or
    /// the store.
    #[must_use]
    pub fn generate(&self, chunk_x: i32, chunk_y: i32) -> Chunk {
        self.generator().generate(ChunkCoord::new(chunk_x, chunk_y))
    }

    /// Returns the resident chunk, loading it first if needed.
    pub fn load_chunk(&mut self, coord: ChunkCoord) -> &Chunk {
        self.ensure_loaded(coord)
    }

    fn ensure_loaded(&mut self, coord: ChunkCoord) -> &mut Chunk {
        let tick = self.streaming.current_tick();
        let loader = &self.loader;
        self.chunks.entry(coord.key()).or_insert_with(|| {
            debug!("Loading chunk {coord}");
            let mut chunk = loader.load(coord);
            chunk.mark_viewed(tick);
            chunk
        })
    }

    /// Loads every missing chunk inside `rect`. Returns how many were added.
    ///
    /// Chunks with no persisted copy are generated as one parallel batch.
    pub fn load_area(&mut self, rect: &ViewRect) -> usize {
        let missing: Vec<ChunkCoord> = rect.coords().filter(|c| !self.is_resident(*c)).collect();
        if missing.is_empty() {
            return 0;
        }
        let (stored, fresh): (Vec<ChunkCoord>, Vec<ChunkCoord>) = missing
            .iter()
            .copied()
            .partition(|c| self.loader.store().exists(*c));

        let tick = self.streaming.current_tick();
        let generated = self.generator().generate_many(&fresh);
        for mut chunk in generated {
            chunk.mark_viewed(tick);
            self.chunks.insert(chunk.coord().key(), chunk);
        }
        for coord in stored {
            self.ensure_loaded(coord);
        }
        debug!("Loaded {} chunks around {:?}", missing.len(), rect);
        missing.len()
    }

    /// Gets the solid block at a world position.
    ///
    /// `None` for air and for positions in chunks that are not resident.
    #[must_use]
    pub fn get_block(&self, x: i64, y: i64) -> Option<Block> {
        let coord = WorldCoord::new(x, y);
        let chunk = self.chunks.get(&coord.to_chunk_coord().key())?;
        if !chunk.is_loaded() {
            return None;
        }
        chunk.block(coord.to_local_coord())
    }

    /// Writes a block, loading its chunk if needed. Returns the previous slot.
    pub fn set_block(&mut self, x: i64, y: i64, slot: Option<Material>) -> Option<Material> {
        let coord = WorldCoord::new(x, y);
        let chunk_coord = coord.to_chunk_coord();
        let local = coord.to_local_coord();

        let chunk = self.ensure_loaded(chunk_coord);
        let previous = chunk.set(local, slot);
        let vacated = chunk.take_vacated_top();
        self.changes.push(coord);
        self.wake_above(chunk_coord, &vacated);
        previous
    }

    /// Takes the block positions changed since the last call.
    pub fn drain_changes(&mut self) -> Vec<WorldCoord> {
        std::mem::take(&mut self.changes)
    }

    /// Records that the viewport saw a resident chunk at the current tick.
    pub fn mark_viewed(&mut self, coord: ChunkCoord) {
        let tick = self.streaming.current_tick();
        if let Some(chunk) = self.chunks.get_mut(&coord.key()) {
            chunk.mark_viewed(tick);
        }
    }

    /// Marks every resident chunk the viewport can see. Returns the count.
    pub fn observe(&mut self, viewport: &dyn Viewport) -> usize {
        let tick = self.streaming.current_tick();
        let mut seen = 0;
        for chunk in self.chunks.values_mut() {
            if !viewport.is_outside(chunk.coord()) {
                chunk.mark_viewed(tick);
                seen += 1;
            }
        }
        seen
    }

    /// Pins or unpins a resident chunk.
    pub fn set_allow_unload(&mut self, coord: ChunkCoord, allow: bool) -> StrataResult<()> {
        let chunk = self
            .chunks
            .get_mut(&coord.key())
            .ok_or(WorldError::ChunkNotResident {
                x: coord.x,
                y: coord.y,
            })?;
        chunk.set_allow_unload(allow);
        Ok(())
    }

    /// Advances one tick and runs the streaming pass.
    pub fn tick(&mut self, viewport: &dyn Viewport) -> StreamingReport {
        self.streaming.advance();
        let (report, spills) = self.streaming.run(&mut self.chunks, &self.loader, viewport);
        for spill in spills {
            self.apply_spill(spill);
        }
        let vacated: Vec<(ChunkCoord, Vec<u16>)> = self
            .chunks
            .values_mut()
            .filter_map(|chunk| {
                let columns = chunk.take_vacated_top();
                (!columns.is_empty()).then(|| (chunk.coord(), columns))
            })
            .collect();
        for (coord, columns) in vacated {
            self.wake_above(coord, &columns);
        }
        report
    }

    /// Schedules the bottom-row slots of the chunk above `coord` whose
    /// support in `coord`'s top row just turned to air.
    fn wake_above(&mut self, coord: ChunkCoord, columns: &[u16]) {
        if columns.is_empty() {
            return;
        }
        if let Some(above) = self.chunks.get_mut(&coord.above().key()) {
            for &x in columns {
                above.schedule(LocalCoord::new(x, 0));
            }
        }
    }

    /// Moves a falling block into the top row of the chunk below when that
    /// chunk is resident and the slot is free. Otherwise the block stays
    /// scheduled and retries next tick.
    fn apply_spill(&mut self, spill: Spill) {
        let Some(material) = self
            .chunks
            .get(&spill.from.key())
            .and_then(|c| c.get(spill.local))
        else {
            return;
        };
        let target_coord = spill.from.below();
        let top = LocalCoord::new(spill.local.x, (CHUNK_SIZE - 1) as u16);

        let accepted = match self.chunks.get_mut(&target_coord.key()) {
            Some(target) if target.is_loaded() && target.get(top).is_none() => {
                target.set(top, Some(material));
                true
            },
            _ => false,
        };
        if !accepted {
            if let Some(source) = self.chunks.get_mut(&spill.from.key()) {
                source.schedule(spill.local);
            }
            return;
        }
        if let Some(source) = self.chunks.get_mut(&spill.from.key()) {
            source.set(spill.local, None);
        }
        self.changes.push(spill.from.world_at(spill.local));
        self.changes.push(target_coord.world_at(top));
    }

    /// Whether the current tick is a rare tick.
    #[must_use]
    pub const fn is_rare_tick(&self) -> bool {
        self.streaming.is_rare_tick(self.streaming.current_tick())
    }

    /// Runs the rare update of every resident chunk.
    pub fn tick_rare(&mut self) {
        self.streaming.run_rare(&mut self.chunks);
    }

    /// Saves every modified resident chunk. Returns how many were written.
    ///
    /// All chunks are attempted; the first failure is reported after the pass.
    pub fn save_all(&mut self) -> StrataResult<usize> {
        let mut saved = 0;
        let mut failed = 0;
        let mut first = None;
        for chunk in self.chunks.values_mut() {
            match self.loader.save(chunk) {
                Ok(true) => saved += 1,
                Ok(false) => {},
                Err(e) => {
                    warn!("Failed to save chunk {}: {e}", chunk.coord());
                    failed += 1;
                    first.get_or_insert_with(|| e.to_string());
                },
            }
        }
        info!("Saved {saved} chunks");
        match first {
            Some(first) => Err(WorldError::SaveFailed { failed, first }.into()),
            None => Ok(saved),
        }
    }

    /// Saves modified chunks and empties the resident set.
    pub fn dispose(&mut self) -> StrataResult<usize> {
        let result = self.save_all();
        self.chunks.clear();
        self.changes.clear();
        result
    }
}
