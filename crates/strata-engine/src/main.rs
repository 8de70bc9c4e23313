//! # Strata
//!
//! Headless runner: streams a world around a slowly moving viewport for a
//! configured time, then saves and exits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use strata_common::ChunkCoord;
use strata_engine::config::CONFIG_FILE;
use strata_engine::{DaylightCycle, EngineConfig, NullPhysics, TickDriver, WorldCommand};
use strata_world::{ViewRect, World};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("strata=info".parse()?))
        .init();

    info!("Strata starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    let mut config = EngineConfig::load_from(&config_path);
    config.validate();

    let world = World::with_save_dir(config.world_config(), &config.save_dir);
    let driver = TickDriver::start(
        world,
        config.driver_config(),
        NullPhysics::default(),
        DaylightCycle::default(),
    );

    let (start_x, start_y) = config.view_center;
    let mut center = ChunkCoord::new(start_x, start_y);
    let deadline = Instant::now() + Duration::from_secs(config.headless_run_secs);
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_secs(1));

        center.x += 1;
        driver.send(WorldCommand::SetViewport(ViewRect::around(
            center,
            config.view_radius,
        )))?;

        let snapshot = driver.snapshot();
        let (ambient, steps) = (
            driver.with_lighting(|l| l.ambient()),
            driver.with_physics(|p| p.steps()),
        );
        info!(
            "Tick {}: {} chunks resident, evicted {} last tick, ambient {ambient:.2}, {steps} physics steps",
            snapshot.tick,
            snapshot.chunks.len(),
            snapshot.report.evicted,
        );
    }

    let mut world = driver.stop()?;
    let saved = world.dispose()?;
    info!("Saved {saved} chunks to {}", config.save_dir.display());

    info!("Strata shutdown complete");
    Ok(())
}
