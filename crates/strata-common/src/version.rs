//! On-disk format identification for chunk files.

use serde::{Deserialize, Serialize};

/// Version of a persisted format.
///
/// A reader accepts data with the same major version and a minor version no
/// newer than its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Incompatible layout changes
    pub major: u16,
    /// Additive changes older readers can skip
    pub minor: u16,
}

impl SchemaVersion {
    /// Chunk file version written by this build.
    pub const CHUNK_FILE: Self = Self::new(1, 0);

    /// Creates a version.
    #[must_use]
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Whether a reader at this version understands `data`.
    #[must_use]
    pub const fn can_read(&self, data: &Self) -> bool {
        self.major == data.major && self.minor >= data.minor
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Four-byte tag at the start of a persisted header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicBytes(pub [u8; 4]);

impl MagicBytes {
    /// Chunk file tag.
    pub const CHUNK: Self = Self(*b"STCH");
}
