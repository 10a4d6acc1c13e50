/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::{PositionKey, Score};

/// An entry into a [`TTable`].
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub struct TTableEntry {
    /// Depth at which the data for this entry was found.
    pub depth: u8,

    /// Exact backed-up score for this position, with mate scores relative to the node that stored it.
    pub score: Score,
}

/// Counters describing how a [`TTable`] has been used since it was last cleared.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct TTableStats {
    /// Number of lookups.
    pub probes: u64,

    /// Number of lookups that yielded a usable entry.
    pub hits: u64,

    /// Number of entries written.
    pub stores: u64,
}

impl TTableStats {
    /// Percentage of probes that were hits.
    #[inline(always)]
    pub fn hit_rate(&self) -> f64 {
        if self.probes == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / self.probes as f64
        }
    }
}

/// Transposition Table.
///
/// Shared between every search task of a single top-level search, to avoid re-searching
/// positions that are reached through different move orders.
///
/// The table is split into a power-of-two number of shards, each behind its own lock,
/// so concurrent tasks rarely contend. Entries are copied in and out while the shard
/// lock is held, so a reader can never observe half of a write.
#[derive(Debug)]
pub struct TTable {
    /// Independently locked partitions of the cache.
    shards: Box<[RwLock<FxHashMap<PositionKey, TTableEntry>>]>,

    /// `shards.len() - 1`.
    mask: usize,

    probes: AtomicU64,
    hits: AtomicU64,
    stores: AtomicU64,
}

impl TTable {
    /// Default number of shards.
    pub const DEFAULT_SHARDS: usize = 64;

    /// Maximum number of shards.
    pub const MAX_SHARDS: usize = 4_096;

    /// Create a new [`TTable`] with `shards` shards, rounded up to a power of two.
    pub fn new(shards: usize) -> Self {
        let count = shards.clamp(1, Self::MAX_SHARDS).next_power_of_two();

        Self {
            shards: (0..count).map(|_| RwLock::default()).collect(),
            mask: count - 1,
            probes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    /// Number of shards in this [`TTable`].
    #[inline(always)]
    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    /// Fetch the entry for `key`, if one exists that was searched to at least `min_depth`.
    ///
    /// Shallower entries are stale for the caller's needs, and are treated as misses.
    #[inline(always)]
    pub fn get(&self, key: &PositionKey, min_depth: u8) -> Option<TTableEntry> {
        self.probes.fetch_add(1, Ordering::Relaxed);

        let entry = self.shards[key.shard(self.mask)]
            .read()
            .get(key)
            .copied()
            .filter(|entry| entry.depth >= min_depth);

        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        entry
    }

    /// Store `score` for `key`, found at `depth`.
    ///
    /// An existing entry is replaced only if `depth` is at least as deep as the stored one.
    /// Returns `true` if the entry was written.
    #[inline(always)]
    pub fn put(&self, key: PositionKey, depth: u8, score: Score) -> bool {
        let mut shard = self.shards[key.shard(self.mask)].write();
        let entry = TTableEntry { depth, score };

        let stored = match shard.get_mut(&key) {
            Some(existing) if existing.depth > depth => false,
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                shard.insert(key, entry);
                true
            }
        };

        if stored {
            self.stores.fetch_add(1, Ordering::Relaxed);
        }

        stored
    }

    /// Clears the entries and statistics of this [`TTable`].
    ///
    /// Requires exclusive access, so no search can be using the table while it is cleared.
    pub fn clear(&mut self) {
        self.shards.iter_mut().for_each(|shard| shard.get_mut().clear());
        *self.probes.get_mut() = 0;
        *self.hits.get_mut() = 0;
        *self.stores.get_mut() = 0;
    }

    /// Returns the number of entries in this [`TTable`].
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns `true` if this [`TTable`] has no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Snapshot of the usage counters of this [`TTable`].
    pub fn stats(&self) -> TTableStats {
        TTableStats {
            probes: self.probes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }
}

impl Default for TTable {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SHARDS)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use test_strategy::proptest;

    use super::*;
    use crate::Side;

    fn key(hash: u64) -> PositionKey {
        PositionKey::new(hash, Side::White)
    }

    #[test]
    fn test_shard_count_is_power_of_two() {
        assert_eq!(TTable::new(0).shards(), 1);
        assert_eq!(TTable::new(48).shards(), 64);
        assert_eq!(TTable::new(64).shards(), 64);
        assert_eq!(TTable::new(usize::MAX).shards(), TTable::MAX_SHARDS);
    }

    #[test]
    fn test_shallow_entries_are_misses() {
        let tt = TTable::default();
        tt.put(key(1), 3, Score(42));

        assert_eq!(tt.get(&key(1), 2).map(|e| e.score), Some(Score(42)));
        assert_eq!(tt.get(&key(1), 3).map(|e| e.score), Some(Score(42)));
        assert!(tt.get(&key(1), 4).is_none());
        assert!(tt.get(&key(2), 0).is_none());

        let stats = tt.stats();
        assert_eq!(stats.probes, 4);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.stores, 1);
    }

    #[test]
    fn test_sides_do_not_alias() {
        let tt = TTable::default();
        tt.put(PositionKey::new(7, Side::White), 1, Score(10));

        assert!(tt.get(&PositionKey::new(7, Side::Black), 0).is_none());
    }

    #[test]
    fn test_clear_empties_table() {
        let mut tt = TTable::default();
        for hash in 0..100 {
            tt.put(key(hash << 32 | hash), 1, Score(hash as i32));
        }
        assert_eq!(tt.len(), 100);

        tt.clear();
        assert!(tt.is_empty());
        assert_eq!(tt.stats(), TTableStats::default());
    }

    #[test]
    fn test_concurrent_writers() {
        let tt = TTable::new(8);

        // Every thread writes every key, each at its own depth
        thread::scope(|s| {
            for depth in 0..8u8 {
                let tt = &tt;
                s.spawn(move || {
                    for hash in 0..1_000u64 {
                        tt.put(key(hash.wrapping_mul(0x9E37_79B9_7F4A_7C15)), depth, Score(depth as i32));
                    }
                });
            }
        });

        // Regardless of interleaving, the deepest write wins, whole
        assert_eq!(tt.len(), 1_000);
        for hash in 0..1_000u64 {
            let entry = tt.get(&key(hash.wrapping_mul(0x9E37_79B9_7F4A_7C15)), 0).unwrap();
            assert_eq!(entry, TTableEntry { depth: 7, score: Score(7) });
        }
    }

    #[proptest(cases = 256)]
    fn test_deeper_or_equal_puts_win(writes: Vec<(u8, i16)>) {
        let tt = TTable::new(1);
        let mut expected: Option<TTableEntry> = None;

        for (depth, score) in writes {
            let score = Score(score as i32);
            let accepted = tt.put(key(0), depth, score);

            let should_accept = expected.map_or(true, |e| depth >= e.depth);
            assert_eq!(accepted, should_accept);
            if should_accept {
                expected = Some(TTableEntry { depth, score });
            }
        }

        assert_eq!(tt.get(&key(0), 0), expected);
    }
}
