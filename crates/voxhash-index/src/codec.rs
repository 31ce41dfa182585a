//! Point-to-voxel mapping, key hashing, and rank-indexed occupancy bitmaps.
//!
//! A hash box covers 8x8x8 fine voxels. Its occupancy bitmap is split into
//! eight 4x4x4 blocks of two 32-bit banks each, and the number of set bits
//! before a voxel is that voxel's offset into the box's color slice.
//!
//! All functions here mirror what the consumer evaluates when it queries the
//! index, so they work in `f32` exactly as the consumer does.

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use voxhash_core::constants::{BLOCKS_PER_AXIS, BLOCK_SIDE, BOX_SIDE, OCCUPANCY_WORDS};
use voxhash_core::{Error, LocalVoxel, Result, VoxelKey};

/// Integer hash-box coordinates of a point.
#[inline]
pub fn hash_box_coords(p: Vec3, delta: f32) -> IVec3 {
    (p / (delta * BOX_SIDE as f32)).floor().as_ivec3()
}

/// Hash-box key of a point, range-checked against the 16-bit key space.
///
/// `index` is only used to identify the offending point in errors.
pub fn hash_box_key(p: Vec3, delta: f32, index: usize) -> Result<VoxelKey> {
    if !p.is_finite() {
        return Err(Error::NonFinitePosition { index });
    }
    VoxelKey::from_coords(hash_box_coords(p, delta)).ok_or(Error::KeyOutOfRange { index })
}

/// World-space minimum corner of a hash box.
#[inline]
pub fn box_base(key: VoxelKey, delta: f32) -> Vec3 {
    key.to_ivec3().as_vec3() * (delta * BOX_SIDE as f32)
}

/// Locate a point inside the 8x8x8 grid of the box starting at `box_base`.
///
/// Indices are clamped to the box so that float rounding at the upper face
/// never spills into a neighbouring box.
pub fn local_voxel_index(p: Vec3, box_base: Vec3, delta: f32) -> LocalVoxel {
    let index = ((p - box_base) / delta)
        .floor()
        .as_ivec3()
        .clamp(IVec3::ZERO, IVec3::splat(BOX_SIDE as i32 - 1));
    let side = BLOCK_SIDE as i32;
    let block = index / side;
    let residual = index % side;

    let per_axis = BLOCKS_PER_AXIS as i32;
    let block_index = block.x * per_axis * per_axis + block.y * per_axis + block.z;
    let bank = i32::from(residual.x >= 2);
    let bit = bank * 32 + (residual.x & 1) * side * side + residual.y * side + residual.z;

    LocalVoxel::new(block_index as u32, bit as u32)
}

/// Integer finalizer used for the y and z axes.
#[inline]
pub const fn hash_int(i: i32) -> u32 {
    let mut x = i as u32;
    x = ((x >> 16) ^ x).wrapping_mul(0x045d_9f3b);
    x = ((x >> 16) ^ x).wrapping_mul(0x045d_9f3b);
    (x >> 16) ^ x
}

/// Home slot for a hash in a table of `table_size` primary slots.
#[inline]
pub const fn table_index(hash: u32, table_size: u32) -> u32 {
    hash % table_size
}

/// Hash function used to place keys in a bucket table.
///
/// The builder and every reader of a finished index must agree on it.
pub trait BucketHasher {
    /// Hash a key.
    fn hash(&self, key: VoxelKey) -> u32;
}

/// Default key hash.
///
/// The x axis enters unmixed so boxes adjacent along x get adjacent home
/// slots; y and z are avalanched by [`hash_int`] and shifted apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMixHasher;

impl BucketHasher for AxisMixHasher {
    #[inline]
    fn hash(&self, key: VoxelKey) -> u32 {
        (i32::from(key.x) as u32)
            ^ (hash_int(i32::from(key.y)) << 1)
            ^ (hash_int(i32::from(key.z)) << 2)
    }
}

/// Occupancy bitmap of one hash box (512 bits).
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct OccupancyBits(pub [u32; OCCUPANCY_WORDS]);

impl OccupancyBits {
    /// Check if a voxel is occupied
    #[inline]
    pub const fn get(&self, voxel: LocalVoxel) -> bool {
        self.0[voxel.word()] & voxel.mask() != 0
    }

    /// Mark a voxel occupied, returning whether it already was.
    #[inline]
    pub fn set(&mut self, voxel: LocalVoxel) -> bool {
        let word = &mut self.0[voxel.word()];
        let was_set = *word & voxel.mask() != 0;
        *word |= voxel.mask();
        was_set
    }

    /// Number of set bits strictly before `voxel` in rank order.
    pub fn rank(&self, voxel: LocalVoxel) -> u32 {
        let word = voxel.word();
        let below: u32 = self.0[..word].iter().map(|w| w.count_ones()).sum();
        below + (self.0[word] & (voxel.mask() - 1)).count_ones()
    }

    /// Total occupied voxels
    #[inline]
    pub fn count(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }

    /// Occupied voxels in ascending rank order.
    pub fn iter_set(&self) -> impl Iterator<Item = LocalVoxel> + '_ {
        self.0.iter().enumerate().flat_map(|(word, &bits)| {
            (0..32)
                .filter(move |bit| bits & (1 << bit) != 0)
                .map(move |bit| LocalVoxel::from_ordinal(word as u32 * 32 + bit))
        })
    }
}
