//! Biome selection, blended surface height and material layering.
//!
//! Biomes are picked per world-x column from a slow macro noise. The surface
//! height of a column is the mean of the raw heights of every column within
//! [`INTERPOLATION_RADIUS`], each sampled with the biome selected at *that*
//! column, which smooths the seams between neighbouring biomes.

use crate::block::Material;
use crate::noise::ImprovedNoise;

/// Half-width of the height blending window, in columns.
pub const INTERPOLATION_RADIUS: i64 = 25;

/// Number of columns averaged per height sample.
const BLEND_WINDOW: usize = (INTERPOLATION_RADIUS * 2 + 1) as usize;

/// Octaves used for per-biome height noise.
const HEIGHT_OCTAVES: u32 = 4;

/// Octaves used for biome selection.
const MACRO_OCTAVES: u32 = 4;

/// Horizontal scale of the biome selection noise, in blocks.
const MACRO_SCALE: f64 = 1024.0;

/// Off-lattice y lane of the selection noise.
const MACRO_LANE: f64 = 0.283;

/// Macro-value thresholds, highest band first.
const MOUNTAINS_ABOVE: f64 = 0.6;
const PLAINS_ABOVE: f64 = 0.45;
const DESERT_ABOVE: f64 = 0.3;

/// Closed set of terrain biomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Biome {
    /// Rolling grassland.
    Plains,
    /// Low sand flats.
    Desert,
    /// Tall, rough peaks.
    Mountains,
}

/// Immutable terrain parameters of a biome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiomeParams {
    /// Base surface height in blocks.
    pub offset: f64,
    /// Horizontal frequency of the height noise.
    pub frequency: f64,
    /// Amplitude falloff between height octaves.
    pub persistence: f64,
    /// Height swing around `offset`, in blocks.
    pub amplitude: f64,
    /// Material below the topsoil.
    pub filler: Material,
    /// Topsoil as `(material, depth)` pairs, surface first.
    pub topsoil: &'static [(Material, u32)],
    /// Off-lattice noise lane keeping biome height fields independent.
    lane: f64,
}

const PLAINS: BiomeParams = BiomeParams {
    offset: 64.0,
    frequency: 1.0 / 96.0,
    persistence: 0.5,
    amplitude: 12.0,
    filler: Material::Stone,
    topsoil: &[(Material::Grass, 1), (Material::Dirt, 4)],
    lane: 0.173,
};

const DESERT: BiomeParams = BiomeParams {
    offset: 58.0,
    frequency: 1.0 / 128.0,
    persistence: 0.4,
    amplitude: 6.0,
    filler: Material::Stone,
    topsoil: &[
        (Material::Sand, 4),
        (Material::Sandstone, 6),
        (Material::Clay, 2),
    ],
    lane: 0.391,
};

const MOUNTAINS: BiomeParams = BiomeParams {
    offset: 112.0,
    frequency: 1.0 / 64.0,
    persistence: 0.55,
    amplitude: 48.0,
    filler: Material::Stone,
    topsoil: &[
        (Material::Snow, 2),
        (Material::Gravel, 1),
        (Material::Dirt, 2),
    ],
    lane: 0.617,
};

impl Biome {
    /// Every biome.
    pub const ALL: [Self; 3] = [Self::Plains, Self::Desert, Self::Mountains];

    /// Biome used wherever no selection noise applies.
    pub const DEFAULT: Self = Self::Plains;

    /// Terrain parameters of this biome.
    #[must_use]
    pub const fn params(self) -> &'static BiomeParams {
        match self {
            Self::Plains => &PLAINS,
            Self::Desert => &DESERT,
            Self::Mountains => &MOUNTAINS,
        }
    }

    /// Picks the biome band for a macro value in `[0, 1]`.
    ///
    /// Bands are ordered, so a larger macro value never selects a lower band
    /// except for the plains fallback at the very bottom.
    #[must_use]
    pub fn from_macro(value: f64) -> Self {
        if value > MOUNTAINS_ABOVE {
            Self::Mountains
        } else if value > PLAINS_ABOVE {
            Self::Plains
        } else if value > DESERT_ABOVE {
            Self::Desert
        } else {
            Self::Plains
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Plains => 0,
            Self::Desert => 1,
            Self::Mountains => 2,
        }
    }
}

/// Expands `(material, count)` pairs into one ordered run.
fn flatten_topsoil(pairs: &[(Material, u32)]) -> Vec<Material> {
    pairs
        .iter()
        .flat_map(|&(material, count)| std::iter::repeat(material).take(count as usize))
        .collect()
}

/// Seeded biome field for one world.
#[derive(Debug, Clone)]
pub struct BiomeMap {
    macro_noise: ImprovedNoise,
    height_noise: ImprovedNoise,
    topsoil_runs: [Vec<Material>; 3],
}

impl BiomeMap {
    /// Creates the biome field for a world seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            macro_noise: ImprovedNoise::new(seed.wrapping_add(1)),
            height_noise: ImprovedNoise::new(seed),
            topsoil_runs: Biome::ALL.map(|biome| flatten_topsoil(biome.params().topsoil)),
        }
    }

    /// Macro selection value of a column, normalized to `[0, 1]`.
    #[must_use]
    pub fn macro_value(&self, world_x: i64) -> f64 {
        let v = self
            .macro_noise
            .octave_noise(world_x as f64 / MACRO_SCALE, MACRO_LANE, 0.0, MACRO_OCTAVES, 0.5);
        ((v + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Biome selected at a column.
    #[must_use]
    pub fn biome_at(&self, world_x: i64) -> Biome {
        Biome::from_macro(self.macro_value(world_x))
    }

    /// Unblended height of `biome` at a column.
    #[must_use]
    pub fn raw_height(&self, biome: Biome, world_x: i64) -> f64 {
        let p = biome.params();
        let n = self.height_noise.octave_noise(
            world_x as f64 * p.frequency,
            p.lane,
            0.0,
            HEIGHT_OCTAVES,
            p.persistence,
        );
        p.offset + p.amplitude * n
    }

    /// Raw height of whichever biome is selected at the column.
    fn selected_raw_height(&self, world_x: i64) -> f64 {
        self.raw_height(self.biome_at(world_x), world_x)
    }

    /// Blended surface height of a column.
    #[must_use]
    pub fn height_at(&self, world_x: i64) -> i64 {
        let mut sum = 0.0;
        for k in -INTERPOLATION_RADIUS..=INTERPOLATION_RADIUS {
            sum += self.selected_raw_height(world_x + k);
        }
        (sum / BLEND_WINDOW as f64).floor() as i64
    }

    /// Blended surface heights for `count` consecutive columns from `start_x`.
    ///
    /// Each raw sample is computed once; values equal [`BiomeMap::height_at`]
    /// exactly.
    #[must_use]
    pub fn surface_heights(&self, start_x: i64, count: usize) -> Vec<i64> {
        let raw: Vec<f64> = (0..count + BLEND_WINDOW - 1)
            .map(|i| self.selected_raw_height(start_x - INTERPOLATION_RADIUS + i as i64))
            .collect();

        raw.windows(BLEND_WINDOW)
            .map(|window| {
                let mut sum = 0.0;
                for h in window {
                    sum += h;
                }
                (sum / BLEND_WINDOW as f64).floor() as i64
            })
            .collect()
    }

    /// Material of the block at `world_y` in a column whose surface is
    /// `surface_height`. Returns `None` above the surface.
    #[must_use]
    pub fn material_at(&self, biome: Biome, surface_height: i64, world_y: i64) -> Option<Material> {
        let delta = surface_height - world_y;
        if delta < 0 {
            return None;
        }
        let run = &self.topsoil_runs[biome.index()];
        let filler = biome.params().filler;
        if delta == 0 {
            return Some(run.first().copied().unwrap_or(filler));
        }
        Some(run.get(delta as usize).copied().unwrap_or(filler))
    }
}
