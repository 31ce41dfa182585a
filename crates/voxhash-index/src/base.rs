//! Primary hash map of hash boxes with occupancy bitmaps and color tables.

use glam::Vec3;
use voxhash_core::{Error, LocalVoxel, PackedColor, Result, VoxelKey};

use crate::codec::{BucketHasher, OccupancyBits};
use crate::compact::{compact, CompactionReport};
use crate::infos::{GpuHashBucket, GpuOccupancy};
use crate::table::{BucketTable, ChainStats, CollisionStrategy};

/// Running mean of the colors that landed in one fine voxel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAccum {
    pub mean: Vec3,
    pub count: u32,
}

impl ColorAccum {
    /// Start from a first sample
    #[inline]
    pub const fn new(sample: Vec3) -> Self {
        Self {
            mean: sample,
            count: 1,
        }
    }

    /// Fold another sample into the mean
    #[inline]
    pub fn push(&mut self, sample: Vec3) {
        self.count += 1;
        self.mean += (sample - self.mean) / self.count as f32;
    }
}

/// Builds the base map one point at a time.
#[derive(Debug)]
pub struct BaseIndexBuilder {
    table: BucketTable,
    records: Vec<OccupancyBits>,
    colors: Vec<Vec<ColorAccum>>,
}

/// Flattened base map, ready to be bundled into the output.
#[derive(Debug)]
pub struct BaseIndex {
    pub hash_map_size: u32,
    pub hash_map: Vec<GpuHashBucket>,
    pub occupancies: Vec<GpuOccupancy>,
    pub color_table: Vec<PackedColor>,
    pub stats: ChainStats,
    pub compaction: CompactionReport,
    pub primary_usage: f32,
}

impl BaseIndexBuilder {
    /// Create a builder with `nominal_size` primary slots.
    pub fn new(nominal_size: u32, strategy: CollisionStrategy) -> Result<Self> {
        Ok(Self {
            table: BucketTable::new(nominal_size, strategy)?,
            records: Vec::new(),
            colors: Vec::new(),
        })
    }

    /// Occupancy bitmap and per-voxel colors of a box, if present.
    pub fn box_contents<H: BucketHasher>(
        &self,
        key: VoxelKey,
        hasher: &H,
    ) -> Result<Option<(&OccupancyBits, &[ColorAccum])>> {
        let Some(index) = self.table.find(key, hasher)? else {
            return Ok(None);
        };
        let record = self.table.buckets()[index.get()].value as usize;
        Ok(Some((&self.records[record], &self.colors[record])))
    }

    /// Record one point.
    pub fn insert<H: BucketHasher>(
        &mut self,
        key: VoxelKey,
        voxel: LocalVoxel,
        color: Vec3,
        hasher: &H,
    ) -> Result<()> {
        let next_record = u32::try_from(self.records.len())
            .map_err(|_| Error::CapacityExceeded("occupancy reference"))?;
        let (index, fresh) = self.table.find_or_insert(key, hasher, next_record)?;
        if fresh {
            self.records.push(OccupancyBits::default());
            self.colors.push(Vec::new());
        }

        let record = self.table.buckets()[index.get()].value as usize;
        let bits = &mut self.records[record];
        let rank = bits.rank(voxel) as usize;
        let samples = &mut self.colors[record];
        if bits.set(voxel) {
            samples[rank].push(color);
        } else {
            samples.insert(rank, ColorAccum::new(color));
        }
        Ok(())
    }

    /// Compact the table (if requested) and flatten everything into the
    /// output layout. Color slices are laid out in final bucket order.
    pub fn finish(mut self, compact_table: bool) -> Result<BaseIndex> {
        let compaction = if compact_table {
            compact(&mut self.table)?
        } else {
            CompactionReport {
                moved: 0,
                size_before: self.table.len(),
                size_after: self.table.len(),
            }
        };

        let mut occupancies: Vec<GpuOccupancy> = self
            .records
            .iter()
            .map(|bits| GpuOccupancy {
                bits: bits.0,
                color_offset: 0,
            })
            .collect();
        let total: usize = self.colors.iter().map(Vec::len).sum();
        let mut color_table = Vec::with_capacity(total);
        let mut hash_map = Vec::with_capacity(self.table.len());

        for (index, bucket) in self.table.buckets().iter().enumerate() {
            if !bucket.is_unused() {
                let record = bucket.value as usize;
                occupancies[record].color_offset = u32::try_from(color_table.len())
                    .map_err(|_| Error::CapacityExceeded("color offset"))?;
                color_table.extend(
                    self.colors[record]
                        .iter()
                        .map(|accum| PackedColor::from_vec3(accum.mean)),
                );
            }
            hash_map.push(GpuHashBucket::from_bucket(
                bucket,
                index,
                self.table.len(),
                self.table.strategy(),
            ));
        }

        Ok(BaseIndex {
            hash_map_size: self.table.nominal_size(),
            hash_map,
            occupancies,
            color_table,
            stats: *self.table.stats(),
            compaction,
            primary_usage: self.table.primary_usage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{box_base, hash_box_key, local_voxel_index, AxisMixHasher};
    use approx::assert_relative_eq;

    fn insert_point(builder: &mut BaseIndexBuilder, p: Vec3, color: Vec3, delta: f32) {
        let key = hash_box_key(p, delta, 0).unwrap();
        let voxel = local_voxel_index(p, box_base(key, delta), delta);
        builder.insert(key, voxel, color, &AxisMixHasher).unwrap();
    }

    #[test]
    fn running_mean() {
        let mut accum = ColorAccum::new(Vec3::X);
        accum.push(Vec3::Y);
        accum.push(Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(accum.count, 3);
        assert_relative_eq!(accum.mean.x, 2.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(accum.mean.y, 2.0 / 3.0, epsilon = 1e-6);
        assert_relative_eq!(accum.mean.z, 0.0);
    }

    #[test]
    fn identical_samples_keep_their_value() {
        let color = Vec3::new(0.2, 0.4, 0.9);
        let mut accum = ColorAccum::new(color);
        for _ in 0..50 {
            accum.push(color);
        }
        assert_eq!(accum.mean, color);
    }

    #[test]
    fn colors_follow_rank_order() {
        let mut builder = BaseIndexBuilder::new(4, CollisionStrategy::Chaining).unwrap();
        // Insert out of rank order; the last voxel of the box comes first
        insert_point(&mut builder, Vec3::splat(7.5), Vec3::Z, 1.0);
        insert_point(&mut builder, Vec3::splat(0.5), Vec3::X, 1.0);
        insert_point(&mut builder, Vec3::new(0.5, 0.5, 1.5), Vec3::Y, 1.0);

        let (bits, colors) = builder
            .box_contents(VoxelKey::new(0, 0, 0), &AxisMixHasher)
            .unwrap()
            .unwrap();
        assert_eq!(bits.count(), 3);
        let means: Vec<_> = colors.iter().map(|c| c.mean).collect();
        assert_eq!(means, vec![Vec3::X, Vec3::Y, Vec3::Z]);
    }

    #[test]
    fn finish_lays_out_color_slices() {
        let mut builder = BaseIndexBuilder::new(8, CollisionStrategy::Chaining).unwrap();
        insert_point(&mut builder, Vec3::splat(0.5), Vec3::X, 1.0);
        insert_point(&mut builder, Vec3::splat(1.5), Vec3::Y, 1.0);
        insert_point(&mut builder, Vec3::splat(8.5), Vec3::Z, 1.0);

        let base = builder.finish(true).unwrap();
        assert_eq!(base.hash_map_size, 8);
        assert_eq!(base.hash_map.len(), 8);
        assert_eq!(base.occupancies.len(), 2);
        assert_eq!(base.color_table.len(), 3);

        let mut offsets: Vec<_> = base.occupancies.iter().map(|o| o.color_offset).collect();
        offsets.sort_unstable();
        // One box holds two voxels, the other one
        assert!(offsets == vec![0, 2] || offsets == vec![0, 1]);
        for bucket in base.hash_map.iter().filter(|b| !b.is_unused()) {
            let occupancy = &base.occupancies[bucket.occupancy_ref as usize];
            let count = OccupancyBits(occupancy.bits).count() as usize;
            assert!(occupancy.color_offset as usize + count <= base.color_table.len());
        }
    }
}
