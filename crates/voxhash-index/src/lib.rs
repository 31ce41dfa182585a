//! Hashed sparse-voxel index for colored point clouds.
//!
//! Points are bucketed into 8x8x8 hash boxes stored in an open hash map.
//! Each box carries a 512-bit occupancy bitmap, and the rank of a voxel's
//! bit locates its averaged color in a shared color table. A stack of
//! coarser "empty-skip" maps records which regions hold any data.
//!
//! The result, [`HashMapInfos`], is a set of flat `Pod` buffers that can be
//! uploaded and queried without further metadata.

pub mod archive;
pub mod base;
pub mod builder;
pub mod codec;
pub mod compact;
pub mod infos;
pub mod query;
pub mod skip;
pub mod table;

pub use builder::{HashMapBuilder, IndexConfig};
pub use codec::{AxisMixHasher, BucketHasher, OccupancyBits};
pub use infos::{
    BuildStats, GpuHashBucket, GpuOccupancy, GpuSkipBucket, GridInfo, HashMapInfos, SkipLevel,
    TableStats, NO_NEXT,
};
pub use query::IndexReader;
pub use table::{ChainStats, CollisionStrategy};
