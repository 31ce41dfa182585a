//! CPU-side lookups over a finished index.
//!
//! These walk the flat buffers exactly as the consumer does, so they double
//! as the reference for what a renderer will see.

use glam::{IVec3, Vec3};
use voxhash_core::{PackedColor, VoxelKey};

use crate::codec::{
    box_base, hash_box_coords, hash_box_key, local_voxel_index, table_index, AxisMixHasher,
    BucketHasher, OccupancyBits,
};
use crate::infos::{follow_link, GpuHashBucket, GpuOccupancy, GpuSkipBucket, HashMapInfos};
use crate::table::CollisionStrategy;

/// Common view of base and skip-level entries.
trait FlatBucket {
    fn key(&self) -> VoxelKey;
    fn next(&self) -> u32;
}

impl FlatBucket for GpuHashBucket {
    fn key(&self) -> VoxelKey {
        Self::key(self)
    }

    fn next(&self) -> u32 {
        self.next
    }
}

impl FlatBucket for GpuSkipBucket {
    fn key(&self) -> VoxelKey {
        Self::key(self)
    }

    fn next(&self) -> u32 {
        self.next
    }
}

/// Find `key` in a flat map. Gives up after `map.len()` links.
fn find_in<B: FlatBucket, H: BucketHasher>(
    map: &[B],
    table_size: u32,
    strategy: CollisionStrategy,
    key: VoxelKey,
    hasher: &H,
) -> Option<usize> {
    if table_size == 0 || key.is_unused() {
        return None;
    }
    let mut current = table_index(hasher.hash(key), table_size) as usize;
    for _ in 0..=map.len() {
        let bucket = map.get(current)?;
        if bucket.key() == key {
            return Some(current);
        }
        current = follow_link(bucket.next(), current, map.len(), strategy)?;
    }
    None
}

/// Length of the chain starting at `start`, `None` if it does not end
/// within `map.len()` links.
fn chain_len<B: FlatBucket>(map: &[B], start: usize, strategy: CollisionStrategy) -> Option<usize> {
    let mut current = start;
    for steps in 0..=map.len() {
        match follow_link(map.get(current)?.next(), current, map.len(), strategy) {
            Some(next) => current = next,
            None => return Some(steps),
        }
    }
    None
}

/// Read access to a [`HashMapInfos`] with the hasher it was built with.
#[derive(Debug, Clone, Copy)]
pub struct IndexReader<'a, H = AxisMixHasher> {
    infos: &'a HashMapInfos,
    hasher: H,
}

impl HashMapInfos {
    /// Reader using the default hasher.
    pub const fn reader(&self) -> IndexReader<'_> {
        IndexReader {
            infos: self,
            hasher: AxisMixHasher,
        }
    }

    /// Reader using a custom hasher; it must match the one used to build.
    pub const fn reader_with<H: BucketHasher>(&self, hasher: H) -> IndexReader<'_, H> {
        IndexReader {
            infos: self,
            hasher,
        }
    }
}

impl<'a, H: BucketHasher> IndexReader<'a, H> {
    /// Occupancy record of a hash box.
    pub fn find_box(&self, key: VoxelKey) -> Option<&'a GpuOccupancy> {
        let infos = self.infos;
        let index = find_in(
            &infos.hash_map,
            infos.hash_map_size,
            infos.collision,
            key,
            &self.hasher,
        )?;
        infos
            .occupancies
            .get(infos.hash_map[index].occupancy_ref as usize)
    }

    /// Color slice of a hash box, in rank order.
    pub fn box_colors(&self, key: VoxelKey) -> Option<&'a [PackedColor]> {
        let occupancy = self.find_box(key)?;
        let start = occupancy.color_offset as usize;
        let count = OccupancyBits(occupancy.bits).count() as usize;
        self.infos.color_table.get(start..start + count)
    }

    /// Check if the fine voxel containing `p` holds data.
    pub fn is_occupied(&self, p: Vec3) -> bool {
        self.color_at(p).is_some()
    }

    /// Averaged color of the fine voxel containing `p`.
    pub fn color_at(&self, p: Vec3) -> Option<PackedColor> {
        let delta = self.infos.grid.delta;
        let key = hash_box_key(p, delta, 0).ok()?;
        let occupancy = self.find_box(key)?;
        let bits = OccupancyBits(occupancy.bits);
        let voxel = local_voxel_index(p, box_base(key, delta), delta);
        if !bits.get(voxel) {
            return None;
        }
        let offset = occupancy.color_offset as usize + bits.rank(voxel) as usize;
        self.infos.color_table.get(offset).copied()
    }

    /// Coordinates of the skip-level cell containing `p`.
    pub fn skip_cell(&self, level: u32, p: Vec3) -> IVec3 {
        let shift = (level + 1).min(31);
        let coords = hash_box_coords(p, self.infos.grid.delta);
        IVec3::new(coords.x >> shift, coords.y >> shift, coords.z >> shift)
    }

    /// Child mask of the skip-level cell containing `p`; 0 if the cell is
    /// absent or the level does not exist.
    pub fn skip_child_mask(&self, level: u32, p: Vec3) -> u32 {
        let Some(skip) = self.infos.empty_skip_levels.get(level as usize) else {
            return 0;
        };
        if !p.is_finite() {
            return 0;
        }
        let Some(key) = VoxelKey::from_coords(self.skip_cell(level, p)) else {
            return 0;
        };
        find_in(
            &skip.map,
            skip.table_size,
            self.infos.collision,
            key,
            &self.hasher,
        )
        .map_or(0, |index| skip.map[index].child_mask)
    }

    /// Returns true if the skip-level cell containing `p` holds no data.
    pub fn is_empty_at(&self, level: u32, p: Vec3) -> bool {
        self.skip_child_mask(level, p) == 0
    }

    /// Longest chain over the base map and every skip level, `None` if some
    /// chain does not terminate.
    pub fn longest_chain(&self) -> Option<usize> {
        let infos = self.infos;
        let base = (0..infos.hash_map.len())
            .map(|start| chain_len(&infos.hash_map, start, infos.collision))
            .collect::<Option<Vec<_>>>()?;
        let mut longest = base.into_iter().max().unwrap_or(0);
        for level in &infos.empty_skip_levels {
            for start in 0..level.map.len() {
                longest = longest.max(chain_len(&level.map, start, infos.collision)?);
            }
        }
        Some(longest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{HashMapBuilder, IndexConfig};
    use crate::infos::NO_NEXT;
    use glam::DVec3;
    use voxhash_core::Bounds;

    fn small_index(collision: CollisionStrategy) -> (HashMapInfos, Vec<Vec3>) {
        let positions: Vec<Vec3> = (0..40)
            .map(|i| Vec3::new(i as f32 * 1.7, (i % 5) as f32 * 3.1, (i % 3) as f32 * 9.0))
            .collect();
        let colors: Vec<PackedColor> = (0..40)
            .map(|i| PackedColor::from_rgba8(i * 6, 255 - i * 6, 17, 255))
            .collect();
        let config = IndexConfig {
            fine_voxels_per_axis: 72,
            table_size: Some(3),
            collision,
            ..IndexConfig::default()
        };
        let bounds = Bounds::new(DVec3::ZERO, DVec3::splat(72.0));
        let infos = HashMapBuilder::new(config)
            .build(&positions, &colors, bounds)
            .unwrap();
        (infos, positions)
    }

    #[test]
    fn finds_every_box_and_nothing_else() {
        for collision in [
            CollisionStrategy::Chaining,
            CollisionStrategy::Probing { max_distance: 2 },
        ] {
            let (infos, positions) = small_index(collision);
            let reader = infos.reader();
            for bucket in infos.hash_map.iter().filter(|b| !b.is_unused()) {
                let occupancy = reader.find_box(bucket.key()).unwrap();
                let colors = reader.box_colors(bucket.key()).unwrap();
                assert_eq!(colors.len(), OccupancyBits(occupancy.bits).count() as usize);
            }
            assert!(reader.find_box(VoxelKey::new(-100, 7, 7)).is_none());
            assert!(reader.find_box(VoxelKey::UNUSED).is_none());
            for p in &positions {
                assert!(reader.is_occupied(*p));
            }
        }
    }

    #[test]
    fn unoccupied_voxel_in_occupied_box() {
        let (infos, _) = small_index(CollisionStrategy::Chaining);
        let reader = infos.reader();
        // (0, 0, 0) is occupied, its neighbour along z is not
        assert!(reader.is_occupied(Vec3::splat(0.1)));
        assert_eq!(reader.color_at(Vec3::new(0.1, 0.1, 1.1)), None);
        assert_eq!(reader.color_at(Vec3::new(f32::NAN, 0.0, 0.0)), None);
    }

    #[test]
    fn skip_queries_outside_levels_are_empty() {
        let (infos, positions) = small_index(CollisionStrategy::Chaining);
        let reader = infos.reader();
        let levels = infos.empty_skip_levels.len() as u32;
        assert!(!reader.is_empty_at(levels - 1, positions[0]));
        assert_eq!(reader.skip_child_mask(levels, positions[0]), 0);
        assert_eq!(reader.skip_child_mask(0, Vec3::splat(f32::INFINITY)), 0);
    }

    #[test]
    fn corrupted_links_end_the_walk() {
        let (mut infos, positions) = small_index(CollisionStrategy::Chaining);
        assert!(infos.reader().longest_chain().is_some());

        // Point every live bucket at itself
        for (index, bucket) in infos.hash_map.iter_mut().enumerate() {
            if !bucket.is_unused() {
                bucket.next = index as u32;
            }
        }
        assert_eq!(infos.reader().longest_chain(), None);
        // Lookups still hit their home bucket and never spin
        let _ = infos.reader().is_occupied(positions[0]);

        for bucket in &mut infos.hash_map {
            bucket.next = infos.hash_map_size + 1000;
        }
        assert_eq!(infos.reader().longest_chain(), None);
        for bucket in &mut infos.hash_map {
            bucket.next = NO_NEXT;
        }
        for level in &mut infos.empty_skip_levels {
            for bucket in &mut level.map {
                bucket.next = NO_NEXT;
            }
        }
        assert_eq!(infos.reader().longest_chain(), Some(0));
    }

    #[test]
    fn corrupted_skip_links_end_the_walk() {
        let (mut infos, positions) = small_index(CollisionStrategy::Chaining);
        let linked = infos
            .empty_skip_levels
            .iter()
            .flat_map(|level| &level.map)
            .filter(|bucket| bucket.next != NO_NEXT)
            .count();
        assert!(linked > 0);

        // Close the finest level into a loop, base map untouched
        let level = &mut infos.empty_skip_levels[0];
        let len = level.map.len() as u32;
        for (index, bucket) in level.map.iter_mut().enumerate() {
            bucket.next = (index as u32 + 1) % len;
        }
        let reader = infos.reader();
        assert_eq!(reader.longest_chain(), None);
        assert!(reader.is_occupied(positions[0]));
        let _ = reader.skip_child_mask(0, Vec3::splat(70.0));

        infos.empty_skip_levels[0].map[0].next = len + 5;
        assert_eq!(infos.reader().longest_chain(), None);
    }
}
