//! # Strata Common
//!
//! Shared types for the Strata terrain and streaming engine.
//!
//! This crate provides foundational types used across all Strata crates:
//! - Coordinate types and packing (world, chunk, local)
//! - Version information for on-disk schemas
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::version::*;
}

pub use prelude::*;
