//! Engine configuration.
//!
//! Provides the world, cadence and headless-run settings. Configuration can
//! be loaded from and saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use strata_common::{ChunkCoord, StrataError, StrataResult};
use strata_world::{GeneratorKind, Material, ViewRect, WorldConfig};
use tracing::{info, warn};

use crate::driver::DriverConfig;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "strata.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === World Settings ===
    /// World seed (None = derived from the clock)
    pub seed: Option<u64>,
    /// Generation strategy
    pub generator: GeneratorKind,
    /// Fill material for the flat generator
    pub flat_fill: Material,
    /// Directory holding saved chunks
    pub save_dir: PathBuf,

    // === Cadence Settings ===
    /// World ticks per second
    pub ticks_per_second: u32,
    /// Physics steps per second
    pub physics_hz: u32,
    /// Real seconds per in-game day
    pub day_length_secs: f32,

    // === Streaming Settings ===
    /// Viewport radius in chunks
    pub view_radius: u32,
    /// Chunk the viewport starts on
    pub view_center: (i32, i32),

    // === Headless Run ===
    /// How long the binary runs before shutting down, in seconds
    pub headless_run_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // World
            seed: None,
            generator: GeneratorKind::Noise,
            flat_fill: Material::Stone,
            save_dir: PathBuf::from("saves/world"),

            // Cadence
            ticks_per_second: 30,
            physics_hz: 60,
            day_length_secs: 600.0,

            // Streaming
            view_radius: 3,
            view_center: (0, 2),

            // Headless
            headless_run_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        Self::default()
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> StrataResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| StrataError::Serialization(e.to_string()))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.ticks_per_second = self.ticks_per_second.clamp(1, 240);
        self.physics_hz = self.physics_hz.clamp(1, 1000);
        self.day_length_secs = self.day_length_secs.clamp(1.0, 86_400.0);
        self.view_radius = self.view_radius.min(16);
    }

    /// World settings, resolving a missing seed from the clock.
    #[must_use]
    pub fn world_config(&self) -> WorldConfig {
        WorldConfig {
            seed: self.seed.unwrap_or_else(WorldConfig::random_seed),
            generator: self.generator,
            flat_fill: self.flat_fill,
            ticks_per_second: self.ticks_per_second,
        }
    }

    /// Initial viewport.
    #[must_use]
    pub fn viewport(&self) -> ViewRect {
        let (x, y) = self.view_center;
        ViewRect::around(ChunkCoord::new(x, y), self.view_radius)
    }

    /// Tick driver settings.
    #[must_use]
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            ticks_per_second: self.ticks_per_second,
            physics_hz: self.physics_hz,
            day_length_secs: self.day_length_secs,
            viewport: self.viewport(),
        }
    }
}
