//! Core types, bounds, and errors for the voxhash point-cloud index.
//!
//! This crate provides the foundational types shared by the index builder:
//! - Hash-box keys and local fine-voxel addresses
//! - Packed colors
//! - Bounding boxes and grid resolution
//! - The common error type

pub mod coords;
pub mod error;
pub mod math;
pub mod types;

pub use coords::{LocalVoxel, VoxelKey};
pub use error::{Error, Result};
pub use math::Bounds;
pub use types::PackedColor;

/// Index-wide constants
pub mod constants {
    /// Fine voxels per hash box per axis
    pub const BOX_SIDE: u32 = 8;
    /// Total fine voxels in a hash box (8^3)
    pub const BOX_VOXELS: u32 = BOX_SIDE * BOX_SIDE * BOX_SIDE;
    /// Fine voxels per compression block per axis
    pub const BLOCK_SIDE: u32 = 4;
    /// Compression blocks per hash box per axis
    pub const BLOCKS_PER_AXIS: u32 = BOX_SIDE / BLOCK_SIDE;
    /// Compression blocks per hash box
    pub const BLOCK_COUNT: u32 = BLOCKS_PER_AXIS * BLOCKS_PER_AXIS * BLOCKS_PER_AXIS;
    /// 32-bit banks per compression block (64 bits per 4x4x4 block)
    pub const BANKS_PER_BLOCK: u32 = 2;
    /// 32-bit words in one occupancy bitmap
    pub const OCCUPANCY_WORDS: usize = (BLOCK_COUNT * BANKS_PER_BLOCK) as usize;
    /// Default target resolution along the longest bounding-box axis
    pub const DEFAULT_FINE_VOXELS_PER_AXIS: u32 = 4000;
    /// Default number of empty-skip levels above the base map
    pub const DEFAULT_SKIP_LEVELS: u32 = 6;
    /// Default load-factor heuristic: input points per primary slot
    pub const DEFAULT_POINTS_PER_BUCKET: u32 = 100;
}
