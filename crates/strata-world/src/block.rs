//! Block materials and block handles.

use serde::{Deserialize, Serialize};
use strata_common::{ChunkCoord, LocalCoord, WorldCoord};

/// Solid block materials. Air is the absence of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Material {
    /// Grass topsoil.
    Grass = 1,
    /// Dirt.
    Dirt = 2,
    /// Stone, the default filler.
    Stone = 3,
    /// Sand (falls).
    Sand = 4,
    /// Sandstone.
    Sandstone = 5,
    /// Gravel (falls).
    Gravel = 6,
    /// Snow cap.
    Snow = 7,
    /// Clay.
    Clay = 8,
}

impl Material {
    /// Every material, in id order.
    pub const ALL: [Self; 8] = [
        Self::Grass,
        Self::Dirt,
        Self::Stone,
        Self::Sand,
        Self::Sandstone,
        Self::Gravel,
        Self::Snow,
        Self::Clay,
    ];

    /// Stable on-disk id. Never zero; zero encodes air.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Looks up a material by on-disk id.
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Grass),
            2 => Some(Self::Dirt),
            3 => Some(Self::Stone),
            4 => Some(Self::Sand),
            5 => Some(Self::Sandstone),
            6 => Some(Self::Gravel),
            7 => Some(Self::Snow),
            8 => Some(Self::Clay),
            _ => None,
        }
    }

    /// Whether unsupported blocks of this material fall.
    #[must_use]
    pub const fn has_gravity(self) -> bool {
        matches!(self, Self::Sand | Self::Gravel)
    }
}

/// Encodes a slot for serialization (0 = air).
#[must_use]
pub fn slot_id(slot: Option<Material>) -> u8 {
    slot.map_or(0, Material::id)
}

/// A solid block as seen through a world lookup.
///
/// Refers to its chunk by coordinate only. The handle is a snapshot: once the
/// owning chunk is evicted or the slot is rewritten it no longer describes the
/// world, and nothing here detects that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    /// Block material
    pub material: Material,
    /// Owning chunk
    pub chunk: ChunkCoord,
    /// Position inside the owning chunk
    pub local: LocalCoord,
}

impl Block {
    /// World position of this block.
    #[must_use]
    pub const fn world_coord(&self) -> WorldCoord {
        self.chunk.world_at(self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_ids_round_trip() {
        for material in Material::ALL {
            assert_ne!(material.id(), 0);
            assert_eq!(Material::from_id(material.id()), Some(material));
        }
        assert_eq!(Material::from_id(0), None);
        assert_eq!(Material::from_id(200), None);
    }

    #[test]
    fn test_gravity_materials() {
        assert!(Material::Sand.has_gravity());
        assert!(Material::Gravel.has_gravity());
        assert!(!Material::Stone.has_gravity());
    }

    #[test]
    fn test_block_world_coord() {
        let block = Block {
            material: Material::Dirt,
            chunk: ChunkCoord::new(-1, 2),
            local: LocalCoord::new(31, 0),
        };
        assert_eq!(block.world_coord(), WorldCoord::new(-1, 64));
    }
}
