//! Open-hash bucket table shared by the base map and every empty-skip level.
//!
//! The table has a fixed number of primary slots. Collisions are resolved by
//! linking buckets into chains; a bucket that finds no home is appended past
//! the primary slots and later moved back by the compactor.

use serde::{Deserialize, Serialize};
use voxhash_core::{Error, Result, VoxelKey};

use crate::codec::{table_index, BucketHasher};

/// Index of a bucket within its table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BucketIndex(pub u32);

impl BucketIndex {
    /// Index as usize
    #[inline]
    pub const fn get(self) -> usize {
        self.0 as usize
    }
}

/// How a key that misses its home slot finds a bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionStrategy {
    /// Append an overflow bucket and link it to the end of the chain.
    #[default]
    Chaining,
    /// Claim the first unused primary slot within `max_distance` slots after
    /// the home slot, falling back to an overflow bucket. The flat output
    /// stores links as relative steps.
    Probing { max_distance: u32 },
}

/// A slot of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub key: VoxelKey,
    pub next: Option<BucketIndex>,
    /// Occupancy reference in the base map, child mask in skip levels.
    pub value: u32,
}

impl Bucket {
    /// An unclaimed slot
    pub const UNUSED: Self = Self {
        key: VoxelKey::UNUSED,
        next: None,
        value: 0,
    };

    /// Returns true if no key has claimed this slot
    #[inline]
    pub const fn is_unused(&self) -> bool {
        self.key.is_unused()
    }
}

/// Collision counters gathered during insertion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStats {
    /// Most links walked by a single insertion.
    pub longest_chain: u32,
    /// Keys that did not find their home slot free.
    pub collisions: u64,
    /// Buckets appended past the primary slots.
    pub overflow_entries: u32,
    /// Buckets placed in a nearby primary slot by probing.
    pub probed_entries: u32,
}

/// Fixed-size open-hash table with chained overflow.
#[derive(Clone, Debug)]
pub struct BucketTable {
    nominal_size: u32,
    strategy: CollisionStrategy,
    buckets: Vec<Bucket>,
    stats: ChainStats,
}

impl BucketTable {
    /// Create a table with `nominal_size` unused primary slots.
    pub fn new(nominal_size: u32, strategy: CollisionStrategy) -> Result<Self> {
        if nominal_size == 0 {
            return Err(Error::EmptyTable);
        }
        Ok(Self {
            nominal_size,
            strategy,
            buckets: vec![Bucket::UNUSED; nominal_size as usize],
            stats: ChainStats::default(),
        })
    }

    /// Number of primary slots
    #[inline]
    pub const fn nominal_size(&self) -> u32 {
        self.nominal_size
    }

    /// Collision strategy in use
    #[inline]
    pub const fn strategy(&self) -> CollisionStrategy {
        self.strategy
    }

    /// All slots, primary and overflow
    #[inline]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub(crate) fn buckets_mut(&mut self) -> &mut Vec<Bucket> {
        &mut self.buckets
    }

    /// Total slots including overflow
    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns true if the table holds no slots at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Collision counters
    #[inline]
    pub const fn stats(&self) -> &ChainStats {
        &self.stats
    }

    /// Claimed buckets
    pub fn live_count(&self) -> usize {
        self.buckets.iter().filter(|b| !b.is_unused()).count()
    }

    /// Fraction of primary slots holding a key
    pub fn primary_usage(&self) -> f32 {
        let used = self.buckets[..self.nominal_size as usize]
            .iter()
            .filter(|b| !b.is_unused())
            .count();
        used as f32 / self.nominal_size as f32
    }

    /// Get a bucket by index.
    #[inline]
    pub fn bucket(&self, index: BucketIndex) -> Option<&Bucket> {
        self.buckets.get(index.get())
    }

    /// Get a mutable bucket by index.
    #[inline]
    pub fn bucket_mut(&mut self, index: BucketIndex) -> Option<&mut Bucket> {
        self.buckets.get_mut(index.get())
    }

    fn home<H: BucketHasher>(&self, key: VoxelKey, hasher: &H) -> usize {
        table_index(hasher.hash(key), self.nominal_size) as usize
    }

    /// Walk the chain starting at the home slot of `key`.
    ///
    /// Returns `Ok(index)` for a match, or `Err(tail)` with the last bucket of
    /// the chain and the number of links walked.
    fn walk<H: BucketHasher>(
        &self,
        key: VoxelKey,
        hasher: &H,
    ) -> Result<std::result::Result<usize, (usize, u32)>> {
        let home = self.home(key, hasher);
        let mut current = home;
        let mut steps = 0u32;
        loop {
            let bucket = &self.buckets[current];
            if bucket.key == key {
                return Ok(Ok(current));
            }
            let Some(next) = bucket.next else {
                return Ok(Err((current, steps)));
            };
            if next.get() >= self.buckets.len() {
                return Err(Error::BrokenChain {
                    from: current,
                    to: next.get(),
                });
            }
            steps += 1;
            if steps as usize > self.buckets.len() {
                return Err(Error::ChainCycleDetected { index: home });
            }
            current = next.get();
        }
    }

    /// Look up a key.
    pub fn find<H: BucketHasher>(&self, key: VoxelKey, hasher: &H) -> Result<Option<BucketIndex>> {
        if key.is_unused() {
            return Ok(None);
        }
        Ok(self
            .walk(key, hasher)?
            .ok()
            .map(|index| BucketIndex(index as u32)))
    }

    /// Find the bucket of `key`, claiming one with `value` if absent.
    ///
    /// Returns the bucket index and whether it was newly claimed.
    pub fn find_or_insert<H: BucketHasher>(
        &mut self,
        key: VoxelKey,
        hasher: &H,
        value: u32,
    ) -> Result<(BucketIndex, bool)> {
        debug_assert!(!key.is_unused());
        let home = self.home(key, hasher);
        if self.buckets[home].is_unused() {
            self.buckets[home] = Bucket {
                key,
                next: None,
                value,
            };
            return Ok((BucketIndex(home as u32), true));
        }

        let (tail, steps) = match self.walk(key, hasher)? {
            Ok(found) => return Ok((BucketIndex(found as u32), false)),
            Err(tail) => tail,
        };
        self.stats.longest_chain = self.stats.longest_chain.max(steps);
        self.stats.collisions += 1;

        let slot = match self.strategy {
            CollisionStrategy::Chaining => None,
            CollisionStrategy::Probing { max_distance } => self.probe_free_slot(home, max_distance),
        };
        let slot = if let Some(slot) = slot {
            self.stats.probed_entries += 1;
            self.buckets[slot] = Bucket {
                key,
                next: None,
                value,
            };
            slot
        } else {
            self.append(key, value)?
        };

        self.buckets[tail].next = Some(BucketIndex(slot as u32));
        Ok((BucketIndex(slot as u32), true))
    }

    fn probe_free_slot(&self, home: usize, max_distance: u32) -> Option<usize> {
        let nominal = self.nominal_size as usize;
        (1..=max_distance.min(self.nominal_size - 1) as usize)
            .map(|step| (home + step) % nominal)
            .find(|&slot| self.buckets[slot].is_unused())
    }

    fn append(&mut self, key: VoxelKey, value: u32) -> Result<usize> {
        let slot = self.buckets.len();
        if slot >= u32::MAX as usize {
            return Err(Error::CapacityExceeded("bucket index"));
        }
        self.buckets.push(Bucket {
            key,
            next: None,
            value,
        });
        self.stats.overflow_entries += 1;
        Ok(slot)
    }
}
