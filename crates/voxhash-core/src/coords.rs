//! Coordinate systems for the hashed voxel grid.

use crate::constants::{BANKS_PER_BLOCK, BLOCK_COUNT};
use bytemuck::{Pod, Zeroable};
use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Hash-box key: integer box coordinates at some resolution level.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct VoxelKey {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl VoxelKey {
    /// Marks an unused bucket. Only `x` is inspected.
    pub const UNUSED: Self = Self {
        x: i16::MAX,
        y: 0,
        z: 0,
    };

    /// Create a new key
    #[inline]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Returns true if this is the unused sentinel
    #[inline]
    pub const fn is_unused(self) -> bool {
        self.x == i16::MAX
    }

    /// Narrow box coordinates to a key.
    ///
    /// Returns `None` if any axis does not fit `i16` or the result would
    /// collide with the sentinel.
    pub fn from_coords(coords: IVec3) -> Option<Self> {
        let x = i16::try_from(coords.x).ok()?;
        let y = i16::try_from(coords.y).ok()?;
        let z = i16::try_from(coords.z).ok()?;
        let key = Self::new(x, y, z);
        (!key.is_unused()).then_some(key)
    }

    /// Widen to glam IVec3
    #[inline]
    pub fn to_ivec3(self) -> IVec3 {
        IVec3::new(i32::from(self.x), i32::from(self.y), i32::from(self.z))
    }

    /// Layout used by the flat buffers
    #[inline]
    pub const fn to_array(self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }

    /// Inverse of [`Self::to_array`]
    #[inline]
    pub const fn from_array(a: [i16; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

/// Address of a fine voxel inside its hash box.
///
/// `block` selects one of the eight 4x4x4 compression blocks and `bit` one of
/// the 64 bits of that block (bank 0 holds bits 0..32, bank 1 bits 32..64).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocalVoxel {
    pub block: u32,
    pub bit: u32,
}

impl LocalVoxel {
    /// Create a new local address
    #[inline]
    pub const fn new(block: u32, bit: u32) -> Self {
        debug_assert!(block < BLOCK_COUNT);
        debug_assert!(bit < 32 * BANKS_PER_BLOCK);
        Self { block, bit }
    }

    /// Index of the 32-bit word holding this voxel
    #[inline]
    pub const fn word(self) -> usize {
        (self.block * BANKS_PER_BLOCK + self.bit / 32) as usize
    }

    /// Single-bit mask within [`Self::word`]
    #[inline]
    pub const fn mask(self) -> u32 {
        1 << (self.bit % 32)
    }

    /// Position in rank order (0..512)
    #[inline]
    pub const fn ordinal(self) -> u32 {
        self.block * 32 * BANKS_PER_BLOCK + self.bit
    }

    /// Inverse of [`Self::ordinal`]
    #[inline]
    pub const fn from_ordinal(ordinal: u32) -> Self {
        let per_block = 32 * BANKS_PER_BLOCK;
        Self::new(ordinal / per_block, ordinal % per_block)
    }
}
