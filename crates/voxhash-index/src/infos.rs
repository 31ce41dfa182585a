//! Flat, upload-ready index layout.
//!
//! Every `Gpu*` struct is `#[repr(C)]` and `Pod`; the consumer decodes the
//! buffers without further metadata, so field order and widths are fixed.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use voxhash_core::constants::OCCUPANCY_WORDS;
use voxhash_core::{Bounds, PackedColor, VoxelKey};

use crate::compact::CompactionReport;
use crate::table::{Bucket, ChainStats, CollisionStrategy};

/// Encodes "no next bucket" in the flat buffers.
pub const NO_NEXT: u32 = u32::MAX;

/// Encode a bucket's link for the flat layout.
///
/// Chaining stores absolute indices, probing stores the forward distance
/// modulo the map length.
fn encode_link(bucket: &Bucket, index: usize, len: usize, strategy: CollisionStrategy) -> u32 {
    match (bucket.next, strategy) {
        (None, _) => NO_NEXT,
        (Some(next), CollisionStrategy::Chaining) => next.0,
        (Some(next), CollisionStrategy::Probing { .. }) => {
            ((next.get() + len - index) % len) as u32
        }
    }
}

/// Decode a flat link back to an absolute index.
#[inline]
pub fn follow_link(
    next: u32,
    index: usize,
    len: usize,
    strategy: CollisionStrategy,
) -> Option<usize> {
    if next == NO_NEXT {
        return None;
    }
    match strategy {
        CollisionStrategy::Chaining => Some(next as usize),
        CollisionStrategy::Probing { .. } => Some((index + next as usize) % len),
    }
}

/// Base map entry (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GpuHashBucket {
    pub key: [i16; 3],
    pub _pad: i16,
    pub next: u32,
    pub occupancy_ref: u32,
}

impl GpuHashBucket {
    /// Flatten a base-map bucket found at `index` of a table of `len` slots.
    pub fn from_bucket(
        bucket: &Bucket,
        index: usize,
        len: usize,
        strategy: CollisionStrategy,
    ) -> Self {
        Self {
            key: bucket.key.to_array(),
            _pad: 0,
            next: encode_link(bucket, index, len, strategy),
            occupancy_ref: if bucket.is_unused() { 0 } else { bucket.value },
        }
    }

    /// Key of this entry
    #[inline]
    pub const fn key(&self) -> VoxelKey {
        VoxelKey::from_array(self.key)
    }

    /// Returns true if no box claimed this slot
    #[inline]
    pub const fn is_unused(&self) -> bool {
        self.key().is_unused()
    }
}

/// Occupancy record of one hash box (68 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GpuOccupancy {
    pub bits: [u32; OCCUPANCY_WORDS],
    pub color_offset: u32,
}

/// Skip-level entry (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GpuSkipBucket {
    pub key: [i16; 3],
    pub _pad: i16,
    pub next: u32,
    pub child_mask: u32,
}

impl GpuSkipBucket {
    /// Flatten a skip-level bucket found at `index` of a table of `len` slots.
    pub fn from_bucket(
        bucket: &Bucket,
        index: usize,
        len: usize,
        strategy: CollisionStrategy,
    ) -> Self {
        Self {
            key: bucket.key.to_array(),
            _pad: 0,
            next: encode_link(bucket, index, len, strategy),
            child_mask: if bucket.is_unused() { 0 } else { bucket.value },
        }
    }

    /// Key of this entry
    #[inline]
    pub const fn key(&self) -> VoxelKey {
        VoxelKey::from_array(self.key)
    }

    /// Returns true if no cell claimed this slot
    #[inline]
    pub const fn is_unused(&self) -> bool {
        self.key().is_unused()
    }
}

/// One empty-skip level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipLevel {
    /// Primary slots; `map` may be longer when overflow could not be folded back.
    pub table_size: u32,
    pub map: Vec<GpuSkipBucket>,
}

impl SkipLevel {
    /// A level with a single unused slot
    pub fn empty(strategy: CollisionStrategy) -> Self {
        let bucket = GpuSkipBucket::from_bucket(&Bucket::UNUSED, 0, 1, strategy);
        Self {
            table_size: 1,
            map: vec![bucket],
        }
    }

    /// Raw bytes for upload
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.map)
    }
}

/// Grid the index was built on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    pub bounds: Bounds,
    /// Fine voxel edge length.
    pub delta: f32,
}

/// Diagnostics of one table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub nominal_size: u32,
    pub size_before_compaction: usize,
    pub size: usize,
    pub relocated: u32,
    pub chains: ChainStats,
    /// Fraction of primary slots in use after compaction.
    pub primary_usage: f32,
}

impl TableStats {
    pub(crate) fn new(
        nominal_size: u32,
        chains: ChainStats,
        compaction: CompactionReport,
        primary_usage: f32,
    ) -> Self {
        Self {
            nominal_size,
            size_before_compaction: compaction.size_before,
            size: compaction.size_after,
            relocated: compaction.moved,
            chains,
            primary_usage,
        }
    }
}

/// Diagnostics of a whole build. Informational only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub points: usize,
    pub occupied_boxes: usize,
    pub occupied_voxels: usize,
    pub base: TableStats,
    pub skip_levels: Vec<TableStats>,
}

/// The finished, immutable index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HashMapInfos {
    /// Primary slots of the base map.
    pub hash_map_size: u32,
    pub hash_map: Vec<GpuHashBucket>,
    pub occupancies: Vec<GpuOccupancy>,
    pub color_table: Vec<PackedColor>,
    /// Finest level first.
    pub empty_skip_levels: Vec<SkipLevel>,
    pub grid: GridInfo,
    /// Decides how `next` fields are to be read.
    pub collision: CollisionStrategy,
    pub stats: BuildStats,
}

impl HashMapInfos {
    /// Index of an empty point cloud: one unused slot per map.
    pub fn empty(grid: GridInfo, skip_levels: u32, collision: CollisionStrategy) -> Self {
        let single_slot = TableStats {
            nominal_size: 1,
            size_before_compaction: 1,
            size: 1,
            ..TableStats::default()
        };
        Self {
            hash_map_size: 1,
            hash_map: vec![GpuHashBucket::from_bucket(&Bucket::UNUSED, 0, 1, collision)],
            occupancies: Vec::new(),
            color_table: Vec::new(),
            empty_skip_levels: (0..skip_levels).map(|_| SkipLevel::empty(collision)).collect(),
            grid,
            collision,
            stats: BuildStats {
                base: single_slot,
                skip_levels: vec![single_slot; skip_levels as usize],
                ..BuildStats::default()
            },
        }
    }

    /// Number of occupied hash boxes
    #[inline]
    pub fn occupied_boxes(&self) -> usize {
        self.occupancies.len()
    }

    /// Number of occupied fine voxels
    #[inline]
    pub fn occupied_voxels(&self) -> usize {
        self.color_table.len()
    }

    /// Base map bytes for upload
    #[inline]
    pub fn hash_map_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.hash_map)
    }

    /// Occupancy records bytes for upload
    #[inline]
    pub fn occupancy_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.occupancies)
    }

    /// Color table bytes for upload
    #[inline]
    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.color_table)
    }

    /// Nominal size of every skip level, finest first
    pub fn empty_skip_sizes(&self) -> Vec<u32> {
        self.empty_skip_levels.iter().map(|l| l.table_size).collect()
    }

    /// Total bytes of all flat buffers
    pub fn memory_usage(&self) -> usize {
        self.hash_map_bytes().len()
            + self.occupancy_bytes().len()
            + self.color_bytes().len()
            + self
                .empty_skip_levels
                .iter()
                .map(|l| l.bytes().len())
                .sum::<usize>()
    }
}
