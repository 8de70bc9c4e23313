//! Seeded gradient noise.
//!
//! [`ImprovedNoise`] is the classic improved-noise construction over a seeded
//! 256-entry permutation, duplicated to 512 entries so lattice lookups never
//! wrap. [`CaveNoise`] is a separate ridged field used only for carving.
//!
//! Both are immutable after construction and can be shared across threads.

use ::noise::{MultiFractal, NoiseFn, Perlin, RidgedMulti};

/// Frequency of the cave field in blocks.
pub const CAVE_FREQUENCY: f64 = 0.01;

/// Seed salt separating the cave field from the terrain field.
const CAVE_SEED_SALT: u32 = 0x9E37_79B9;

/// Peak of a single-octave `RidgedMulti` sample; its floor is -1.
const RIDGED_SINGLE_OCTAVE_PEAK: f64 = 1.0 / 3.0;

/// Improved gradient noise over a seeded permutation table.
#[derive(Debug, Clone)]
pub struct ImprovedNoise {
    /// Permutation table, second half mirrors the first.
    perm: [u8; 512],
}

impl ImprovedNoise {
    /// Builds a noise field whose permutation is a Fisher-Yates shuffle of
    /// `0..256` driven by `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut base = [0u8; 256];
        for (i, slot) in base.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for i in (1..base.len()).rev() {
            let j = rng.usize(..=i);
            base.swap(i, j);
        }

        let mut perm = [0u8; 512];
        perm[..256].copy_from_slice(&base);
        perm[256..].copy_from_slice(&base);
        Self { perm }
    }

    #[inline]
    fn p(&self, i: usize) -> usize {
        self.perm[i] as usize
    }

    /// Samples single-octave noise. Output is in `[-1, 1]`.
    #[must_use]
    #[allow(clippy::many_single_char_names)]
    pub fn noise3(&self, x: f64, y: f64, z: f64) -> f64 {
        let xf = x.floor();
        let yf = y.floor();
        let zf = z.floor();

        // Lattice cell, wrapped into the table.
        let xi = (xf as i64 & 255) as usize;
        let yi = (yf as i64 & 255) as usize;
        let zi = (zf as i64 & 255) as usize;

        let x = x - xf;
        let y = y - yf;
        let z = z - zf;

        let u = fade(x);
        let v = fade(y);
        let w = fade(z);

        let a = self.p(xi) + yi;
        let aa = self.p(a) + zi;
        let ab = self.p(a + 1) + zi;
        let b = self.p(xi + 1) + yi;
        let ba = self.p(b) + zi;
        let bb = self.p(b + 1) + zi;

        let value = lerp(
            w,
            lerp(
                v,
                lerp(u, grad(self.p(aa), x, y, z), grad(self.p(ba), x - 1.0, y, z)),
                lerp(
                    u,
                    grad(self.p(ab), x, y - 1.0, z),
                    grad(self.p(bb), x - 1.0, y - 1.0, z),
                ),
            ),
            lerp(
                v,
                lerp(
                    u,
                    grad(self.p(aa + 1), x, y, z - 1.0),
                    grad(self.p(ba + 1), x - 1.0, y, z - 1.0),
                ),
                lerp(
                    u,
                    grad(self.p(ab + 1), x, y - 1.0, z - 1.0),
                    grad(self.p(bb + 1), x - 1.0, y - 1.0, z - 1.0),
                ),
            ),
        );

        value.clamp(-1.0, 1.0)
    }

    /// Sums `octaves` samples at doubling frequency with amplitude scaled by
    /// `persistence`, normalized by the total amplitude.
    ///
    /// The result stays in `[-1, 1]`. Zero octaves yields `0.0`.
    #[must_use]
    pub fn octave_noise(&self, x: f64, y: f64, z: f64, octaves: u32, persistence: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = 1.0;
        let mut amplitude = 1.0;
        let mut max_value = 0.0;

        for _ in 0..octaves {
            total += self.noise3(x * frequency, y * frequency, z * frequency) * amplitude;
            max_value += amplitude;
            amplitude *= persistence;
            frequency *= 2.0;
        }

        if max_value > 0.0 {
            (total / max_value).clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

#[inline]
fn fade(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(t: f64, a: f64, b: f64) -> f64 {
    a + t * (b - a)
}

#[inline]
fn grad(hash: usize, x: f64, y: f64, z: f64) -> f64 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = if h < 4 {
        y
    } else if h == 12 || h == 14 {
        x
    } else {
        z
    };
    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

/// Ridged multifractal field that decides where caves are carved.
///
/// Single octave at [`CAVE_FREQUENCY`], seeded apart from the terrain field.
#[derive(Clone)]
pub struct CaveNoise {
    field: RidgedMulti<Perlin>,
}

impl CaveNoise {
    /// Creates the cave field for a world seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let folded = (seed ^ (seed >> 32)) as u32;
        let field = RidgedMulti::<Perlin>::new(folded.wrapping_add(CAVE_SEED_SALT))
            .set_octaves(1)
            .set_frequency(CAVE_FREQUENCY);
        Self { field }
    }

    /// Samples the cave field at a world block position, in `[-1, 1]`.
    ///
    /// Ridges (values near 1) follow the zero contours of the underlying
    /// Perlin field.
    #[must_use]
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let raw = self.field.get([x, y]);
        ((raw + 1.0) * 2.0 / (1.0 + RIDGED_SINGLE_OCTAVE_PEAK) - 1.0).clamp(-1.0, 1.0)
    }
}

impl std::fmt::Debug for CaveNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaveNoise")
            .field("frequency", &CAVE_FREQUENCY)
            .finish_non_exhaustive()
    }
}
