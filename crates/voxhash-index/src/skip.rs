//! Coarser hash maps that record which children of a cell hold any data.
//!
//! Level `l` cells are `2^(l+1)` hash boxes wide. Each cell stores an 8-bit
//! child mask; child `c` (a hash box for level 0, a level `l-1` cell above
//! that) sets bit `(c.x & 1) | (c.y & 1) << 1 | (c.z & 1) << 2`.

use glam::IVec3;
use voxhash_core::{Error, Result, VoxelKey};

use crate::codec::BucketHasher;
use crate::compact::{compact, CompactionReport};
use crate::infos::{GpuSkipBucket, SkipLevel};
use crate::table::{BucketTable, ChainStats, CollisionStrategy};

/// Primary slots of skip level `level` given the base map's size.
#[inline]
pub fn level_nominal_size(base_nominal: u32, level: u32) -> u32 {
    base_nominal
        .checked_shr(2 * (level + 1))
        .unwrap_or(0)
        .max(1)
}

/// Octant bit of a child cell inside its parent.
#[inline]
pub const fn child_octant(child: IVec3) -> u32 {
    ((child.x & 1) | ((child.y & 1) << 1) | ((child.z & 1) << 2)) as u32
}

/// Parent cell coordinates one level up (floor division by two).
#[inline]
pub const fn parent_coords(child: IVec3) -> IVec3 {
    IVec3::new(child.x >> 1, child.y >> 1, child.z >> 1)
}

/// Builds every skip level in lockstep with the base map.
#[derive(Debug)]
pub struct EmptySkipBuilder {
    levels: Vec<BucketTable>,
    last_box: Option<VoxelKey>,
}

/// One flattened skip level plus its diagnostics.
#[derive(Debug)]
pub struct SkipLevelIndex {
    pub level: SkipLevel,
    pub stats: ChainStats,
    pub compaction: CompactionReport,
    pub primary_usage: f32,
}

impl EmptySkipBuilder {
    /// Create `level_count` empty levels sized relative to the base map.
    pub fn new(level_count: u32, base_nominal: u32, strategy: CollisionStrategy) -> Result<Self> {
        let levels = (0..level_count)
            .map(|level| BucketTable::new(level_nominal_size(base_nominal, level), strategy))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            levels,
            last_box: None,
        })
    }

    /// Per-level tables
    #[inline]
    pub fn levels(&self) -> &[BucketTable] {
        &self.levels
    }

    /// Mark the hash box `box_key` as holding data on every level.
    pub fn insert<H: BucketHasher>(&mut self, box_key: VoxelKey, hasher: &H) -> Result<()> {
        if self.last_box == Some(box_key) {
            return Ok(());
        }
        self.last_box = Some(box_key);

        let mut child = box_key.to_ivec3();
        for table in &mut self.levels {
            let parent = parent_coords(child);
            // Halving an i16 lands in -16384..=16383, never on the sentinel
            let key = VoxelKey::from_coords(parent);
            debug_assert!(key.is_some(), "skip cell {parent} outside the key range");
            let key = key.ok_or(Error::CapacityExceeded("skip cell key"))?;
            let (index, _) = table.find_or_insert(key, hasher, 0)?;
            if let Some(bucket) = table.bucket_mut(index) {
                bucket.value |= 1 << child_octant(child);
            }
            child = parent;
        }
        Ok(())
    }

    /// Compact (if requested) and flatten every level.
    pub fn finish(self, compact_tables: bool) -> Result<Vec<SkipLevelIndex>> {
        self.levels
            .into_iter()
            .map(|mut table| -> Result<SkipLevelIndex> {
                let compaction = if compact_tables {
                    compact(&mut table)?
                } else {
                    CompactionReport {
                        moved: 0,
                        size_before: table.len(),
                        size_after: table.len(),
                    }
                };
                let map = table
                    .buckets()
                    .iter()
                    .enumerate()
                    .map(|(index, bucket)| {
                        GpuSkipBucket::from_bucket(bucket, index, table.len(), table.strategy())
                    })
                    .collect();
                Ok(SkipLevelIndex {
                    level: SkipLevel {
                        table_size: table.nominal_size(),
                        map,
                    },
                    stats: *table.stats(),
                    compaction,
                    primary_usage: table.primary_usage(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AxisMixHasher;

    #[test]
    fn octants_cover_all_bits() {
        let mut mask = 0u32;
        for x in 0..2 {
            for y in 0..2 {
                for z in 0..2 {
                    mask |= 1 << child_octant(IVec3::new(x, y, z));
                }
            }
        }
        assert_eq!(mask, 0xff);
        // Negative cells use the same parity as their floor-divided parent
        assert_eq!(child_octant(IVec3::new(-1, -2, -3)), 0b101);
        assert_eq!(parent_coords(IVec3::new(-1, -2, -3)), IVec3::new(-1, -1, -2));
    }

    #[test]
    fn level_sizes_shrink() {
        assert_eq!(level_nominal_size(1000, 0), 250);
        assert_eq!(level_nominal_size(1000, 1), 62);
        assert_eq!(level_nominal_size(1000, 4), 1);
        assert_eq!(level_nominal_size(1000, 40), 1);
    }

    #[test]
    fn masks_accumulate_per_level() {
        let hasher = AxisMixHasher;
        let mut skip = EmptySkipBuilder::new(3, 64, CollisionStrategy::Chaining).unwrap();
        skip.insert(VoxelKey::new(0, 0, 0), &hasher).unwrap();
        skip.insert(VoxelKey::new(1, 1, 0), &hasher).unwrap();
        skip.insert(VoxelKey::new(1, 1, 0), &hasher).unwrap();
        skip.insert(VoxelKey::new(2, 0, 0), &hasher).unwrap();

        let levels = skip.levels();
        let mask = |level: usize, key: VoxelKey| {
            let table = &levels[level];
            let index = table.find(key, &hasher).unwrap().unwrap();
            table.bucket(index).unwrap().value
        };
        assert_eq!(mask(0, VoxelKey::new(0, 0, 0)), 0b0000_1001);
        assert_eq!(mask(0, VoxelKey::new(1, 0, 0)), 0b0000_0001);
        assert_eq!(mask(1, VoxelKey::new(0, 0, 0)), 0b0000_0011);
        assert_eq!(mask(2, VoxelKey::new(0, 0, 0)), 0b0000_0001);
        assert_eq!(levels[0].live_count(), 2);
        assert_eq!(levels[2].live_count(), 1);
    }

    #[test]
    fn extreme_keys_fit_every_level() {
        let hasher = AxisMixHasher;
        let mut skip = EmptySkipBuilder::new(16, 64, CollisionStrategy::Chaining).unwrap();
        let low = VoxelKey::new(i16::MIN, i16::MIN, i16::MIN);
        let high = VoxelKey::new(i16::MAX - 1, i16::MAX, i16::MAX);
        skip.insert(low, &hasher).unwrap();
        skip.insert(high, &hasher).unwrap();

        let levels = skip.levels();
        let cell = |level: usize, key: VoxelKey| {
            let shift = level as i32 + 1;
            let c = key.to_ivec3();
            VoxelKey::from_coords(IVec3::new(c.x >> shift, c.y >> shift, c.z >> shift)).unwrap()
        };
        for (level, table) in levels.iter().enumerate() {
            for key in [low, high] {
                assert!(table.find(cell(level, key), &hasher).unwrap().is_some());
            }
        }
        // Top level: both corners collapse to -1 and 0 on every axis
        assert_eq!(cell(15, low), VoxelKey::new(-1, -1, -1));
        assert_eq!(cell(15, high), VoxelKey::new(0, 0, 0));
    }

    #[test]
    fn finish_flattens_every_level() {
        let hasher = AxisMixHasher;
        let mut skip = EmptySkipBuilder::new(2, 16, CollisionStrategy::Chaining).unwrap();
        for x in -4..4 {
            skip.insert(VoxelKey::new(x, 0, 0), &hasher).unwrap();
        }
        let levels = skip.finish(true).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].level.table_size, 4);
        assert_eq!(levels[1].level.table_size, 1);
        let live = |l: &SkipLevelIndex| l.level.map.iter().filter(|b| !b.is_unused()).count();
        assert_eq!(live(&levels[0]), 4);
        assert_eq!(live(&levels[1]), 2);
        // A single primary slot forces the second cell into overflow
        assert_eq!(levels[1].level.map.len(), 2);
    }
}
