//! Time-windowed chunk streaming.
//!
//! Each world tick walks the resident set once: chunks that never finished
//! loading are dropped, chunks the viewport has not seen for
//! [`UNLOAD_AFTER_SECONDS`] are saved if modified and evicted, and everything
//! else runs its per-tick update. Rare ticks are driven separately.

use ahash::AHashMap;
use strata_common::{ChunkCoord, LocalCoord};
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::store::ChunkLoader;

/// Seconds a chunk may stay unseen before it becomes evictable.
pub const UNLOAD_AFTER_SECONDS: u64 = 5;

/// Answers whether a chunk is currently visible.
pub trait Viewport {
    /// Whether the chunk lies outside the visible region.
    fn is_outside(&self, coord: ChunkCoord) -> bool;
}

/// Inclusive rectangle of chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRect {
    /// Lower-left corner
    pub min: ChunkCoord,
    /// Upper-right corner
    pub max: ChunkCoord,
}

impl ViewRect {
    /// Square of `radius` chunks around `center`.
    #[must_use]
    pub fn around(center: ChunkCoord, radius: u32) -> Self {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        Self {
            min: ChunkCoord::new(center.x.saturating_sub(r), center.y.saturating_sub(r)),
            max: ChunkCoord::new(center.x.saturating_add(r), center.y.saturating_add(r)),
        }
    }

    /// Whether the rectangle contains `coord`.
    #[must_use]
    pub const fn contains(&self, coord: ChunkCoord) -> bool {
        coord.x >= self.min.x && coord.x <= self.max.x && coord.y >= self.min.y && coord.y <= self.max.y
    }

    /// Every coordinate inside the rectangle, row by row.
    pub fn coords(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| ChunkCoord::new(x, y)))
    }
}

impl Viewport for ViewRect {
    fn is_outside(&self, coord: ChunkCoord) -> bool {
        !self.contains(coord)
    }
}

/// A viewport that sees nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offscreen;

impl Viewport for Offscreen {
    fn is_outside(&self, _coord: ChunkCoord) -> bool {
        true
    }
}

/// Counters from one streaming pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamingReport {
    /// Unloaded chunks dropped without saving
    pub dropped: usize,
    /// Chunks removed from the resident set
    pub evicted: usize,
    /// Evicted chunks that were written to the store
    pub saved: usize,
    /// Chunks that ran their per-tick update
    pub ticked: usize,
}

/// A gravity block that reached the bottom row of its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spill {
    /// Chunk the block is leaving
    pub from: ChunkCoord,
    /// Bottom-row position inside `from`
    pub local: LocalCoord,
}

/// Tick counter and eviction policy.
#[derive(Debug, Clone)]
pub struct StreamingManager {
    ticks_per_second: u32,
    current_tick: u64,
}

impl StreamingManager {
    /// Creates a manager for the given tick rate (at least 1).
    #[must_use]
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            ticks_per_second: ticks_per_second.max(1),
            current_tick: 0,
        }
    }

    /// Ticks per second.
    #[must_use]
    pub const fn ticks_per_second(&self) -> u32 {
        self.ticks_per_second
    }

    /// Current tick number.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Ticks between rare ticks.
    #[must_use]
    pub const fn rare_rate(&self) -> u64 {
        self.ticks_per_second as u64
    }

    /// Ticks a chunk may go unseen before it becomes evictable.
    #[must_use]
    pub const fn unload_after_ticks(&self) -> u64 {
        self.ticks_per_second as u64 * UNLOAD_AFTER_SECONDS
    }

    /// Whether `tick` is a rare tick.
    #[must_use]
    pub const fn is_rare_tick(&self, tick: u64) -> bool {
        tick != 0 && tick % self.rare_rate() == 0
    }

    /// Advances the tick counter and returns the new tick.
    pub fn advance(&mut self) -> u64 {
        self.current_tick += 1;
        self.current_tick
    }

    /// Whether `chunk` may be evicted at the current tick.
    #[must_use]
    pub fn should_evict(&self, chunk: &Chunk, viewport: &dyn Viewport) -> bool {
        chunk.allow_unload()
            && viewport.is_outside(chunk.coord())
            && self.current_tick.saturating_sub(chunk.last_viewed_tick()) > self.unload_after_ticks()
    }

    /// Runs one streaming pass over the resident set.
    ///
    /// Returns the pass counters and the gravity blocks that left the bottom
    /// row of their chunk.
    pub fn run(
        &self,
        chunks: &mut AHashMap<u64, Chunk>,
        loader: &ChunkLoader,
        viewport: &dyn Viewport,
    ) -> (StreamingReport, Vec<Spill>) {
        let mut report = StreamingReport::default();
        let mut spills = Vec::new();

        chunks.retain(|_, chunk| {
            if !chunk.is_loaded() {
                report.dropped += 1;
                return false;
            }

            if self.should_evict(chunk, viewport) {
                match loader.save(chunk) {
                    Ok(saved) => {
                        if saved {
                            report.saved += 1;
                        }
                        report.evicted += 1;
                        return false;
                    },
                    Err(e) => {
                        warn!("Failed to save chunk {}, keeping it resident: {e}", chunk.coord());
                    },
                }
            }

            report.ticked += 1;
            let from = chunk.coord();
            spills.extend(chunk.tick().into_iter().map(|local| Spill { from, local }));
            true
        });

        if report.dropped + report.evicted > 0 {
            debug!(
                "Tick {}: dropped {}, evicted {} ({} saved), ticked {}",
                self.current_tick, report.dropped, report.evicted, report.saved, report.ticked
            );
        }

        (report, spills)
    }

    /// Runs the rare update of every resident, loaded chunk.
    pub fn run_rare(&self, chunks: &mut AHashMap<u64, Chunk>) {
        for chunk in chunks.values_mut().filter(|c| c.is_loaded()) {
            chunk.tick_rare();
        }
    }
}
