//! # Strata Engine
//!
//! Runs a Strata world on its own tick thread.
//!
//! This crate ties together:
//! - Configuration loading
//! - The tick driver and its physics and lighting cadences
//! - Fixed-rate loop pacing

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod collaborators;
pub mod config;
pub mod driver;
pub mod timing;

pub use collaborators::{DaylightCycle, LightingWorld, NullPhysics, PhysicsWorld};
pub use config::EngineConfig;
pub use driver::{DriverConfig, DriverError, TickDriver, WorldCommand, WorldSnapshot};
