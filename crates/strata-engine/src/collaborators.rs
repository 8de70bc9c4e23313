//! Physics and lighting collaborators driven by the auxiliary threads.

use std::f32::consts::{FRAC_PI_2, TAU};

/// Physics simulation stepped at a fixed rate.
pub trait PhysicsWorld: Send {
    /// Advances the simulation by `dt` seconds.
    fn step(&mut self, dt: f32);

    /// A block at `(x, y)` changed; colliders there are stale.
    fn block_changed(&mut self, x: i64, y: i64);
}

/// Lighting driven by the time of day.
pub trait LightingWorld: Send {
    /// Recomputes lighting for `time_of_day` in `[0, 1)` (0 = midnight,
    /// 0.5 = noon).
    fn update(&mut self, time_of_day: f32);
}

/// Physics that only counts what it was asked to do.
#[derive(Debug, Default, Clone)]
pub struct NullPhysics {
    steps: u64,
    simulated_secs: f64,
    changed_blocks: u64,
}

impl NullPhysics {
    /// Number of steps taken.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Total simulated time in seconds.
    #[must_use]
    pub fn simulated_secs(&self) -> f64 {
        self.simulated_secs
    }

    /// Number of block changes reported.
    #[must_use]
    pub fn changed_blocks(&self) -> u64 {
        self.changed_blocks
    }
}

impl PhysicsWorld for NullPhysics {
    fn step(&mut self, dt: f32) {
        self.steps += 1;
        self.simulated_secs += f64::from(dt);
    }

    fn block_changed(&mut self, _x: i64, _y: i64) {
        self.changed_blocks += 1;
    }
}

/// Global daylight following a sine curve over the day.
#[derive(Debug, Clone)]
pub struct DaylightCycle {
    time_of_day: f32,
    ambient: f32,
    updates: u64,
}

impl Default for DaylightCycle {
    fn default() -> Self {
        Self {
            time_of_day: 0.25,
            ambient: Self::light_level(0.25),
            updates: 0,
        }
    }
}

impl DaylightCycle {
    /// Light level for a time of day: 1.0 at noon, 0.1 at midnight.
    #[must_use]
    pub fn light_level(time_of_day: f32) -> f32 {
        let angle = time_of_day * TAU - FRAC_PI_2;
        let base = (angle.sin() + 1.0) / 2.0;
        0.1 + base * 0.9
    }

    /// Last time of day applied.
    #[must_use]
    pub fn time_of_day(&self) -> f32 {
        self.time_of_day
    }

    /// Current ambient light level.
    #[must_use]
    pub fn ambient(&self) -> f32 {
        self.ambient
    }

    /// Number of updates applied.
    #[must_use]
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl LightingWorld for DaylightCycle {
    fn update(&mut self, time_of_day: f32) {
        self.time_of_day = time_of_day.rem_euclid(1.0);
        self.ambient = Self::light_level(self.time_of_day);
        self.updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_physics_counts() {
        let mut physics = NullPhysics::default();
        physics.step(0.5);
        physics.step(0.25);
        physics.block_changed(1, 2);
        assert_eq!(physics.steps(), 2);
        assert!((physics.simulated_secs() - 0.75).abs() < 1e-9);
        assert_eq!(physics.changed_blocks(), 1);
    }

    #[test]
    fn test_daylight_levels() {
        assert!((DaylightCycle::light_level(0.5) - 1.0).abs() < 1e-5);
        assert!((DaylightCycle::light_level(0.0) - 0.1).abs() < 1e-5);

        let mut cycle = DaylightCycle::default();
        cycle.update(1.5);
        assert!((cycle.time_of_day() - 0.5).abs() < 1e-6);
        assert!(cycle.ambient() > 0.99);
        assert_eq!(cycle.updates(), 1);
    }
}
