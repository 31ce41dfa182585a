//! Post-pass that moves overflow buckets back into unused primary slots.

use hashbrown::HashMap;
use voxhash_core::{Error, Result};

use crate::table::{Bucket, BucketIndex, BucketTable};

/// Outcome of compacting one table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Overflow buckets moved into primary slots.
    pub moved: u32,
    /// Table length before compaction.
    pub size_before: usize,
    /// Table length after compaction.
    pub size_after: usize,
}

/// Move tail overflow buckets into free primary slots and rewrite links.
///
/// Stops when no overflow remains or every primary slot is taken, so the
/// final length is `max(nominal_size, live buckets)`.
pub fn compact(table: &mut BucketTable) -> Result<CompactionReport> {
    let nominal = table.nominal_size() as usize;
    let buckets = table.buckets_mut();
    let size_before = buckets.len();

    let mut relocations: HashMap<u32, u32> = HashMap::new();
    let mut front = 0;
    while buckets.len() > nominal {
        while front < nominal && !buckets[front].is_unused() {
            front += 1;
        }
        if front >= nominal {
            break;
        }
        let Some(tail) = buckets.pop() else {
            break;
        };
        relocations.insert(buckets.len() as u32, front as u32);
        buckets[front] = tail;
        front += 1;
    }

    for bucket in buckets.iter_mut() {
        if let Some(next) = bucket.next {
            if let Some(&to) = relocations.get(&next.0) {
                bucket.next = Some(BucketIndex(to));
            }
        }
    }
    buckets.shrink_to_fit();

    verify_chains(buckets)?;

    Ok(CompactionReport {
        moved: relocations.len() as u32,
        size_before,
        size_after: buckets.len(),
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Walk {
    Unvisited,
    OnPath,
    Terminates,
}

/// Check every link is in range, lands on a claimed bucket, and that following
/// links from any bucket reaches the end of its chain.
///
/// Runs in linear time: each bucket is walked at most once.
pub fn verify_chains(buckets: &[Bucket]) -> Result<()> {
    for (from, bucket) in buckets.iter().enumerate() {
        if let Some(next) = bucket.next {
            let to = next.get();
            if to >= buckets.len() || buckets[to].is_unused() {
                return Err(Error::BrokenChain { from, to });
            }
        }
    }

    let mut state = vec![Walk::Unvisited; buckets.len()];
    let mut path = Vec::new();
    for start in 0..buckets.len() {
        let mut current = start;
        loop {
            match state[current] {
                Walk::Terminates => break,
                Walk::OnPath => return Err(Error::ChainCycleDetected { index: current }),
                Walk::Unvisited => {}
            }
            state[current] = Walk::OnPath;
            path.push(current);
            match buckets[current].next {
                Some(next) => current = next.get(),
                None => break,
            }
        }
        for visited in path.drain(..) {
            state[visited] = Walk::Terminates;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AxisMixHasher, BucketHasher};
    use crate::table::CollisionStrategy;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use voxhash_core::VoxelKey;

    /// Folds every key onto the first few slots.
    struct NarrowHasher(u32);

    impl BucketHasher for NarrowHasher {
        fn hash(&self, key: VoxelKey) -> u32 {
            AxisMixHasher.hash(key) % self.0
        }
    }

    fn contents<H: BucketHasher>(
        table: &BucketTable,
        keys: &[VoxelKey],
        hasher: &H,
    ) -> Vec<(VoxelKey, u32)> {
        keys.iter()
            .map(|&key| {
                let index = table.find(key, hasher).unwrap().unwrap();
                (key, table.bucket(index).unwrap().value)
            })
            .collect()
    }

    #[test]
    fn moves_overflow_into_free_slots() {
        let hasher = NarrowHasher(3);
        let mut table = BucketTable::new(16, CollisionStrategy::Chaining).unwrap();
        let keys: Vec<_> = (0..10).map(|i| VoxelKey::new(i, i * 3, -i)).collect();
        for (i, &key) in keys.iter().enumerate() {
            table.find_or_insert(key, &hasher, i as u32).unwrap();
        }
        let before = contents(&table, &keys, &hasher);
        let overflow = table.len() - 16;
        assert!(overflow > 0);

        let report = compact(&mut table).unwrap();
        assert_eq!(report.moved as usize, overflow);
        assert_eq!(report.size_after, 16);
        assert_eq!(table.len(), 16);
        assert_eq!(contents(&table, &keys, &hasher), before);
    }

    #[test]
    fn stops_when_primary_slots_are_full() {
        let hasher = NarrowHasher(1);
        let mut table = BucketTable::new(4, CollisionStrategy::Chaining).unwrap();
        let keys: Vec<_> = (0..7).map(|i| VoxelKey::new(i, 0, 0)).collect();
        for &key in &keys {
            table.find_or_insert(key, &hasher, 0).unwrap();
        }
        let before = contents(&table, &keys, &hasher);

        let report = compact(&mut table).unwrap();
        assert_eq!(report.size_before, 10);
        assert_eq!(report.moved, 3);
        assert_eq!(report.size_after, 7);
        assert_eq!(table.live_count(), 7);
        assert_eq!(contents(&table, &keys, &hasher), before);
    }

    #[test]
    fn random_tables_keep_their_contents() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for round in 0..20 {
            let nominal = rng.gen_range(1..64);
            let strategy = if round % 2 == 0 {
                CollisionStrategy::Chaining
            } else {
                CollisionStrategy::Probing { max_distance: 3 }
            };
            let hasher = NarrowHasher(rng.gen_range(1..=nominal));
            let mut table = BucketTable::new(nominal, strategy).unwrap();
            let mut keys: Vec<VoxelKey> = Vec::new();
            for _ in 0..rng.gen_range(1..100) {
                let key = VoxelKey::new(
                    rng.gen_range(-50..50),
                    rng.gen_range(-50..50),
                    rng.gen_range(-50..50),
                );
                let (index, fresh) = table.find_or_insert(key, &hasher, keys.len() as u32).unwrap();
                if fresh {
                    keys.push(key);
                }
                assert_eq!(table.bucket(index).unwrap().key, key);
            }
            let before = contents(&table, &keys, &hasher);
            let size_before = table.len();

            let report = compact(&mut table).unwrap();
            assert!(report.size_after <= size_before);
            assert_eq!(table.len(), (nominal as usize).max(keys.len()));
            assert_eq!(contents(&table, &keys, &hasher), before);
        }
    }

    #[test]
    fn detects_cycles_and_dangling_links() {
        let key = |x| Bucket {
            key: VoxelKey::new(x, 0, 0),
            next: None,
            value: 0,
        };
        let mut buckets = vec![key(0), key(1), key(2)];
        assert!(verify_chains(&buckets).is_ok());

        buckets[0].next = Some(BucketIndex(1));
        buckets[1].next = Some(BucketIndex(2));
        assert!(verify_chains(&buckets).is_ok());

        buckets[2].next = Some(BucketIndex(0));
        assert!(matches!(
            verify_chains(&buckets),
            Err(Error::ChainCycleDetected { .. })
        ));

        buckets[2].next = Some(BucketIndex(7));
        assert!(matches!(
            verify_chains(&buckets),
            Err(Error::BrokenChain { from: 2, to: 7 })
        ));

        buckets[2] = Bucket::UNUSED;
        assert!(matches!(
            verify_chains(&buckets),
            Err(Error::BrokenChain { from: 1, to: 2 })
        ));
    }
}
