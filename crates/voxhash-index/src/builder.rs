//! End-to-end index construction from a colored point cloud.

use std::time::Instant;

use glam::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use voxhash_core::constants::{
    DEFAULT_FINE_VOXELS_PER_AXIS, DEFAULT_POINTS_PER_BUCKET, DEFAULT_SKIP_LEVELS,
};
use voxhash_core::{Bounds, Error, LocalVoxel, PackedColor, Result, VoxelKey};

use crate::base::BaseIndexBuilder;
use crate::codec::{box_base, hash_box_key, local_voxel_index, AxisMixHasher, BucketHasher};
use crate::infos::{BuildStats, GridInfo, HashMapInfos, TableStats};
use crate::skip::EmptySkipBuilder;
use crate::table::CollisionStrategy;

/// Build parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Fine voxels along the longest bounding-box axis.
    pub fine_voxels_per_axis: u32,
    /// Number of empty-skip levels above the base map.
    pub skip_levels: u32,
    /// Input points per primary slot when sizing the base map.
    pub points_per_bucket: u32,
    /// Fixed number of primary slots, overriding `points_per_bucket`.
    pub table_size: Option<u32>,
    pub collision: CollisionStrategy,
    /// Fold overflow buckets back into unused primary slots.
    pub compact: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            fine_voxels_per_axis: DEFAULT_FINE_VOXELS_PER_AXIS,
            skip_levels: DEFAULT_SKIP_LEVELS,
            points_per_bucket: DEFAULT_POINTS_PER_BUCKET,
            table_size: None,
            collision: CollisionStrategy::Chaining,
            compact: true,
        }
    }
}

impl IndexConfig {
    /// Primary slots of the base map for `points` input points.
    pub fn nominal_table_size(&self, points: usize) -> Result<u32> {
        let size = match self.table_size {
            Some(size) => size as usize,
            None if self.points_per_bucket == 0 => 0,
            None => points.div_ceil(self.points_per_bucket as usize),
        };
        if size == 0 {
            return Err(Error::DegenerateTableSize { points });
        }
        u32::try_from(size).map_err(|_| Error::CapacityExceeded("hash map size"))
    }
}

/// Where a single point lands.
#[derive(Clone, Copy, Debug)]
struct PointCell {
    key: VoxelKey,
    voxel: LocalVoxel,
}

fn locate_points(positions: &[Vec3], delta: f32) -> Result<Vec<PointCell>> {
    positions
        .par_iter()
        .enumerate()
        .map(|(index, &p)| {
            let key = hash_box_key(p, delta, index)?;
            Ok(PointCell {
                key,
                voxel: local_voxel_index(p, box_base(key, delta), delta),
            })
        })
        .collect()
}

/// Builds a [`HashMapInfos`] from positions and colors.
///
/// # Example
///
/// ```
/// use glam::{DVec3, Vec3};
/// use voxhash_core::{Bounds, PackedColor};
/// use voxhash_index::{HashMapBuilder, IndexConfig};
///
/// let positions = [Vec3::new(0.5, 0.5, 0.5), Vec3::new(3.5, 1.5, 0.5)];
/// let colors = [PackedColor::WHITE; 2];
/// let bounds = Bounds::new(DVec3::ZERO, DVec3::splat(4.0));
///
/// let config = IndexConfig { fine_voxels_per_axis: 4, ..IndexConfig::default() };
/// let infos = HashMapBuilder::new(config).build(&positions, &colors, bounds).unwrap();
/// assert_eq!(infos.occupied_voxels(), 2);
/// assert!(infos.reader().is_occupied(positions[1]));
/// ```
#[derive(Clone, Debug, Default)]
pub struct HashMapBuilder<H = AxisMixHasher> {
    config: IndexConfig,
    hasher: H,
}

impl HashMapBuilder {
    /// Builder with the default key hash.
    pub const fn new(config: IndexConfig) -> Self {
        Self {
            config,
            hasher: AxisMixHasher,
        }
    }
}

impl<H: BucketHasher> HashMapBuilder<H> {
    /// Builder with a custom key hash. Readers must use the same one.
    pub const fn with_hasher(config: IndexConfig, hasher: H) -> Self {
        Self { config, hasher }
    }

    /// Index the point cloud.
    ///
    /// `positions` and `colors` are parallel channels. An empty cloud yields a
    /// minimal index with one unused slot per map.
    pub fn build(
        &self,
        positions: &[Vec3],
        colors: &[PackedColor],
        bounds: Bounds,
    ) -> Result<HashMapInfos> {
        if positions.len() != colors.len() {
            return Err(Error::MissingChannelData {
                positions: positions.len(),
                colors: colors.len(),
            });
        }

        let config = &self.config;
        let delta = bounds.grid_delta(config.fine_voxels_per_axis)? as f32;
        if !delta.is_normal() {
            return Err(Error::InvalidResolution(config.fine_voxels_per_axis));
        }
        let grid = GridInfo { bounds, delta };

        if positions.is_empty() {
            warn!("Building voxel hash index from an empty point cloud");
            return Ok(HashMapInfos::empty(
                grid,
                config.skip_levels,
                config.collision,
            ));
        }

        let start = Instant::now();
        let nominal = config.nominal_table_size(positions.len())?;
        debug!(
            points = positions.len(),
            delta,
            nominal,
            skip_levels = config.skip_levels,
            "Building voxel hash index"
        );

        let cells = {
            let _span = tracing::debug_span!("build.locate").entered();
            locate_points(positions, delta)?
        };

        let mut base = BaseIndexBuilder::new(nominal, config.collision)?;
        let mut skip = EmptySkipBuilder::new(config.skip_levels, nominal, config.collision)?;
        {
            let _span = tracing::debug_span!("build.insert").entered();
            for (cell, color) in cells.iter().zip(colors) {
                base.insert(cell.key, cell.voxel, color.to_vec3(), &self.hasher)?;
                skip.insert(cell.key, &self.hasher)?;
            }
        }

        let (base, skip_levels) = {
            let _span = tracing::debug_span!("build.finish", compact = config.compact).entered();
            (base.finish(config.compact)?, skip.finish(config.compact)?)
        };

        let stats = BuildStats {
            points: positions.len(),
            occupied_boxes: base.occupancies.len(),
            occupied_voxels: base.color_table.len(),
            base: TableStats::new(
                base.hash_map_size,
                base.stats,
                base.compaction,
                base.primary_usage,
            ),
            skip_levels: skip_levels
                .iter()
                .map(|l| {
                    TableStats::new(l.level.table_size, l.stats, l.compaction, l.primary_usage)
                })
                .collect(),
        };

        for (level, table) in stats.skip_levels.iter().enumerate() {
            debug!(
                level,
                nominal = table.nominal_size,
                size = table.size,
                collisions = table.chains.collisions,
                "Skip level built"
            );
        }
        info!(
            points = stats.points,
            boxes = stats.occupied_boxes,
            voxels = stats.occupied_voxels,
            collisions = stats.base.chains.collisions,
            longest_chain = stats.base.chains.longest_chain,
            map_size = stats.base.size,
            nominal = stats.base.nominal_size,
            before_compaction = stats.base.size_before_compaction,
            usage = stats.base.primary_usage,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Built voxel hash index"
        );

        Ok(HashMapInfos {
            hash_map_size: base.hash_map_size,
            hash_map: base.hash_map,
            occupancies: base.occupancies,
            color_table: base.color_table,
            empty_skip_levels: skip_levels.into_iter().map(|l| l.level).collect(),
            grid,
            collision: config.collision,
            stats,
        })
    }
}
