//! RawTable: the table header plus lookup, insert and delete over the
//! bucket arena. Growth lives in `grow.rs`.
//!
//! Buckets of every live generation sit in one `SlotMap`; bucket arrays
//! are `Arc<[BucketId]>` so an iterator can keep a generation alive by
//! holding a clone. Nothing here checks the access flag; `Table` does.

use crate::bucket::{tophash, Bucket, BucketId, Stored, BUCKET_CNT, EMPTY, MIN_TOPHASH};
use crate::descriptor::{EqualFn, HashFn, TypeDescriptor};
use hashbrown::HashMap;
use slotmap::SlotMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Slot of a non-reflexive key in a newer generation, by old slot.
pub(crate) type Forwards = HashMap<(BucketId, u8), (BucketId, u8)>;

pub(crate) struct RawTable<K, V> {
    pub(crate) hash_fn: HashFn<K>,
    pub(crate) equal_fn: EqualFn<K>,
    pub(crate) key_indirect: bool,
    pub(crate) value_indirect: bool,
    pub(crate) update_key: bool,
    pub(crate) reflexive: bool,
    pub(crate) standard_hash: bool,

    /// Live entries.
    pub(crate) count: usize,
    /// log2 of the bucket count.
    pub(crate) b: u8,
    pub(crate) seed: u64,
    pub(crate) arena: SlotMap<BucketId, Bucket<K, V>>,
    /// 2^b heads; empty until the first insert when `b == 0`.
    pub(crate) buckets: Arc<[BucketId]>,
    /// Previous generation, present iff growing.
    pub(crate) old_buckets: Option<Arc<[BucketId]>>,
    /// Finished generations an iterator may still read, oldest first.
    pub(crate) retired: VecDeque<Arc<[BucketId]>>,
    pub(crate) forwards: Forwards,
    pub(crate) same_size_grow: bool,
    /// Old buckets below this index have been evacuated.
    pub(crate) nevacuate: usize,
    /// Overflow buckets allocated for the current generation.
    pub(crate) noverflow: usize,
    /// Overflow count carried over from the previous generation.
    pub(crate) old_noverflow: usize,
    pub(crate) grows: u64,
    pub(crate) same_size_grows: u64,
}

/// Where `put` lands: an existing entry or a free slot.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reserved {
    pub(crate) bucket: BucketId,
    pub(crate) index: usize,
    pub(crate) top: u8,
    pub(crate) occupied: bool,
}

pub(crate) fn alloc_generation<K, V>(
    arena: &mut SlotMap<BucketId, Bucket<K, V>>,
    b: u8,
) -> Arc<[BucketId]> {
    (0..1usize << b)
        .map(|_| arena.insert(Bucket::new()))
        .collect::<Vec<_>>()
        .into()
}

impl<K, V> RawTable<K, V> {
    /// `desc` must have passed validation.
    pub(crate) fn new(desc: &TypeDescriptor<K, V>, b: u8, seed: u64) -> Option<Self> {
        let (hash_fn, equal_fn) = desc.functions()?;
        let mut arena = SlotMap::with_key();
        let buckets = if b == 0 {
            Arc::from(Vec::new())
        } else {
            alloc_generation(&mut arena, b)
        };
        Some(Self {
            hash_fn,
            equal_fn,
            key_indirect: desc.is_key_indirect(),
            value_indirect: desc.is_value_indirect(),
            update_key: desc.updates_key_on_overwrite(),
            reflexive: desc.is_reflexive(),
            standard_hash: desc.uses_standard_hash(),
            count: 0,
            b,
            seed,
            arena,
            buckets,
            old_buckets: None,
            retired: VecDeque::new(),
            forwards: Forwards::new(),
            same_size_grow: false,
            nevacuate: 0,
            noverflow: 0,
            old_noverflow: 0,
            grows: 0,
            same_size_grows: 0,
        })
    }

    #[inline]
    pub(crate) fn hash(&self, key: &K) -> u64 {
        (self.hash_fn)(key, self.seed)
    }

    #[inline]
    pub(crate) fn equal(&self, a: &K, b: &K) -> bool {
        (self.equal_fn)(a, b)
    }

    /// Whether `key` can be trusted to hash the same way twice.
    #[inline]
    pub(crate) fn is_reflexive(&self, key: &K) -> bool {
        self.reflexive || self.equal(key, key)
    }

    #[inline]
    pub(crate) fn bucket_mask(&self) -> usize {
        (1usize << self.b) - 1
    }

    #[inline]
    pub(crate) fn is_growing(&self) -> bool {
        self.old_buckets.is_some()
    }

    /// Bucket count before the current growth.
    #[inline]
    pub(crate) fn noldbuckets(&self) -> usize {
        let old_b = if self.same_size_grow { self.b } else { self.b - 1 };
        1usize << old_b
    }

    #[inline]
    pub(crate) fn oldbucketmask(&self) -> usize {
        self.noldbuckets() - 1
    }

    #[inline]
    pub(crate) fn old_head(&self, oldbucket: usize) -> Option<BucketId> {
        self.old_buckets.as_ref().map(|old| old[oldbucket])
    }

    /// Head of the chain that currently holds keys hashing to `hash`:
    /// the old bucket while it has not been evacuated yet.
    pub(crate) fn home_bucket(&self, hash: u64) -> BucketId {
        let mut m = self.bucket_mask();
        let mut head = self.buckets[hash as usize & m];
        if let Some(old) = &self.old_buckets {
            if !self.same_size_grow {
                // There used to be half as many buckets.
                m >>= 1;
            }
            let oldb = old[hash as usize & m];
            if !self.arena[oldb].evacuated() {
                head = oldb;
            }
        }
        head
    }

    /// Tag-guided search for a live entry.
    pub(crate) fn find<F>(&self, hash: u64, eq: F) -> Option<(BucketId, usize)>
    where
        F: Fn(&K) -> bool,
    {
        if self.count == 0 {
            return None;
        }
        let top = tophash(hash);
        let mut cur = Some(self.home_bucket(hash));
        while let Some(id) = cur {
            let b = &self.arena[id];
            for i in 0..BUCKET_CNT {
                if b.tophash[i] != top {
                    continue;
                }
                if b.key(i).is_some_and(&eq) {
                    return Some((id, i));
                }
            }
            cur = b.overflow;
        }
        None
    }

    /// Tag-insensitive scan of one chain, comparing keys directly.
    pub(crate) fn scan_chain<F>(&self, head: BucketId, eq: F) -> Option<(BucketId, usize)>
    where
        F: Fn(&K) -> bool,
    {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let b = &self.arena[id];
            for i in 0..BUCKET_CNT {
                if b.tophash[i] < MIN_TOPHASH {
                    continue;
                }
                if b.key(i).is_some_and(&eq) {
                    return Some((id, i));
                }
            }
            cur = b.overflow;
        }
        None
    }

    pub(crate) fn entry_at(&self, (id, i): (BucketId, usize)) -> Option<(&K, &V)> {
        let b = self.arena.get(id)?;
        Some((b.key(i)?, b.value(i)?))
    }

    /// Key and value for `key` in the current state of the table.
    pub(crate) fn lookup(&self, key: &K) -> Option<(&K, &V)> {
        if self.count == 0 {
            return None;
        }
        let hash = self.hash(key);
        let at = self.find(hash, |k| self.equal(key, k))?;
        self.entry_at(at)
    }

    pub(crate) fn value_mut_at(&mut self, (id, i): (BucketId, usize)) -> Option<&mut V> {
        self.arena.get_mut(id)?.value_mut(i)
    }

    /// Link a fresh overflow bucket after `tail`.
    pub(crate) fn new_overflow(&mut self, tail: BucketId) -> BucketId {
        let ovf = self.arena.insert(Bucket::new());
        self.arena[tail].overflow = Some(ovf);
        self.noverflow += 1;
        tracing::trace!(noverflow = self.noverflow, b = self.b, "overflow bucket linked");
        ovf
    }

    /// Number of overflow buckets reachable from `heads`.
    #[cfg(test)]
    pub(crate) fn count_overflow(&self, heads: &[BucketId]) -> usize {
        heads
            .iter()
            .map(|&h| {
                let mut n = 0;
                let mut cur = self.arena.get(h).and_then(|b| b.overflow);
                while let Some(id) = cur {
                    n += 1;
                    cur = self.arena.get(id).and_then(|b| b.overflow);
                }
                n
            })
            .sum()
    }
}

impl<K: Clone, V> RawTable<K, V> {
    /// Locate `hash`/`eq` for writing, growing first when needed. Returns
    /// either the existing entry or the slot a new entry must go to.
    pub(crate) fn reserve<F>(&mut self, hash: u64, eq: F) -> Reserved
    where
        F: Fn(&K) -> bool,
    {
        if self.buckets.is_empty() {
            self.buckets = alloc_generation(&mut self.arena, self.b);
        }
        if !self.retired.is_empty() {
            self.sweep_retired();
        }
        loop {
            let bucket = hash as usize & self.bucket_mask();
            if self.is_growing() {
                self.grow_work(bucket);
            }
            let top = tophash(hash);

            let mut id = self.buckets[bucket];
            let mut insert_at: Option<(BucketId, usize)> = None;
            loop {
                let b = &self.arena[id];
                for i in 0..BUCKET_CNT {
                    if b.tophash[i] != top {
                        if b.tophash[i] == EMPTY && insert_at.is_none() {
                            insert_at = Some((id, i));
                        }
                        continue;
                    }
                    if b.key(i).is_some_and(&eq) {
                        return Reserved {
                            bucket: id,
                            index: i,
                            top,
                            occupied: true,
                        };
                    }
                }
                match b.overflow {
                    Some(next) => id = next,
                    None => break,
                }
            }

            // Not present. Growing invalidates the addressing, so start over.
            if !self.is_growing() && (self.over_load_factor() || self.too_many_overflow_buckets()) {
                self.hash_grow();
                continue;
            }

            let (bucket, index) = match insert_at {
                Some(at) => at,
                None => (self.new_overflow(id), 0),
            };
            return Reserved {
                bucket,
                index,
                top,
                occupied: false,
            };
        }
    }

    /// Complete a `reserve`: overwrite in place or fill the free slot.
    pub(crate) fn write<F>(&mut self, r: Reserved, make_key: F, value: V) -> &mut V
    where
        F: FnOnce() -> K,
    {
        let (key_indirect, value_indirect, update_key) =
            (self.key_indirect, self.value_indirect, self.update_key);
        if !r.occupied {
            self.count += 1;
        }
        let b = &mut self.arena[r.bucket];
        if r.occupied {
            if update_key {
                if let Some(k) = b.key_slot_mut(r.index).as_mut() {
                    k.replace(make_key());
                }
            }
            let slot = b.value_slot_mut(r.index);
            if let Some(v) = slot.as_mut() {
                v.replace(value);
            } else {
                *slot = Some(Stored::new(value, value_indirect));
            }
        } else {
            b.fill(
                r.index,
                r.top,
                Stored::new(make_key(), key_indirect),
                Stored::new(value, value_indirect),
            );
        }
        b.value_slot_mut(r.index)
            .as_mut()
            .map(Stored::get_mut)
            .expect("slot holds a value after write")
    }

    /// Remove the entry matching `hash`/`eq`, if any.
    pub(crate) fn remove<F>(&mut self, hash: u64, eq: F) -> Option<(K, V)>
    where
        F: Fn(&K) -> bool,
    {
        if self.count == 0 {
            return None;
        }
        if !self.retired.is_empty() {
            self.sweep_retired();
        }
        let bucket = hash as usize & self.bucket_mask();
        if self.is_growing() {
            self.grow_work(bucket);
        }
        let top = tophash(hash);
        let mut cur = Some(self.buckets[bucket]);
        while let Some(id) = cur {
            let b = &mut self.arena[id];
            for i in 0..BUCKET_CNT {
                if b.tophash[i] != top || !b.key(i).is_some_and(&eq) {
                    continue;
                }
                let (k, v) = b.take(i)?;
                b.tophash[i] = EMPTY;
                self.count -= 1;
                return Some((k.into_inner(), v.into_inner()));
            }
            cur = b.overflow;
        }
        None
    }
}
