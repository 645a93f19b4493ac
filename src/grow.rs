//! Growth: triggers, `hash_grow`, incremental evacuation and release of
//! finished generations.
//!
//! Growth never rehashes the whole table at once. `hash_grow` only swaps
//! in a new bucket array; each later write evacuates the old bucket it is
//! about to touch plus one more at the `nevacuate` cursor.

use crate::bucket::{
    tophash, BucketId, Stored, BUCKET_CNT, EMPTY, EVACUATED_EMPTY, EVACUATED_X, EVACUATED_Y,
    MIN_TOPHASH,
};
use crate::raw::{alloc_generation, RawTable};
use std::sync::Arc;

/// Growth starts once the average bucket holds 13/2 entries.
pub(crate) const LOAD_FACTOR_NUM: u64 = 13;
pub(crate) const LOAD_FACTOR_DEN: u64 = 2;

/// Upper bound on evacuated buckets skipped per cursor advance.
const EVACUATION_SCAN_CAP: usize = 1024;

/// Whether `count` entries in `2^b` buckets is over the load factor.
#[inline]
pub(crate) fn over_load_factor(count: usize, b: u8) -> bool {
    count >= BUCKET_CNT
        && (count as u64).saturating_mul(LOAD_FACTOR_DEN)
            >= LOAD_FACTOR_NUM.saturating_mul(1u64 << b)
}

/// Smallest exponent whose table holds `hint` entries without growing.
pub(crate) fn exponent_for_hint(hint: usize) -> u8 {
    let mut b = 0u8;
    while over_load_factor(hint, b) {
        b += 1;
    }
    b
}

/// Evacuation destination: a bucket chain and the next free index in it.
struct Dest {
    bucket: BucketId,
    index: usize,
}

/// One planned entry move out of an old chain.
struct Move<K> {
    src: BucketId,
    index: usize,
    /// Tag in the destination.
    top: u8,
    use_y: bool,
    reflexive: bool,
    /// Key copy to place when the old generation stays readable.
    copy: Option<Stored<K>>,
}

impl<K, V> RawTable<K, V> {
    #[inline]
    pub(crate) fn over_load_factor(&self) -> bool {
        over_load_factor(self.count, self.b)
    }

    /// "Too many" means as many overflow buckets as regular buckets. Most
    /// of them must be sparsely used, or the load factor would have
    /// triggered first. The count is exact at every size.
    #[inline]
    pub(crate) fn too_many_overflow_buckets(&self) -> bool {
        self.b < usize::BITS as u8 - 1 && self.noverflow >= 1usize << self.b
    }

    /// An iterator may still read the previous generation (or an older one).
    pub(crate) fn old_generation_pinned(&self) -> bool {
        !self.retired.is_empty()
            || self
                .old_buckets
                .as_ref()
                .is_some_and(|old| Arc::strong_count(old) > 1)
    }

    pub(crate) fn old_bucket_evacuated(&self, oldbucket: usize) -> bool {
        self.old_head(oldbucket)
            .map_or(true, |id| self.arena[id].evacuated())
    }

    /// Begin growing: double, or regrow at the same size to shed overflow
    /// buckets when the load is fine.
    pub(crate) fn hash_grow(&mut self) {
        self.sweep_retired();
        let bigger = self.over_load_factor();
        self.same_size_grow = !bigger;
        let old_b = self.b;
        let new_b = self.b + u8::from(bigger);
        let fresh = alloc_generation(&mut self.arena, new_b);
        let old = core::mem::replace(&mut self.buckets, fresh);
        self.old_buckets = Some(old);
        self.b = new_b;
        self.nevacuate = 0;
        self.old_noverflow = self.noverflow;
        self.noverflow = 0;
        self.grows += 1;
        if !bigger {
            self.same_size_grows += 1;
        }
        tracing::debug!(
            from_b = old_b,
            to_b = new_b,
            same_size = !bigger,
            count = self.count,
            old_overflow = self.old_noverflow,
            "hash table growth started"
        );
    }

    /// Release retired generations nobody reads any more, oldest first.
    /// A generation is only released once every older one is gone, since
    /// forwarding records lead from older generations into newer ones.
    pub(crate) fn sweep_retired(&mut self) {
        let mut released = 0usize;
        while self
            .retired
            .front()
            .is_some_and(|g| Arc::strong_count(g) == 1)
        {
            if let Some(generation) = self.retired.pop_front() {
                self.release_generation(&generation);
                released += 1;
            }
        }
        if released > 0 {
            if self.retired.is_empty() && !self.is_growing() {
                self.forwards.clear();
            } else {
                let arena = &self.arena;
                self.forwards.retain(|(id, _), _| arena.contains_key(*id));
            }
            tracing::trace!(
                released,
                still_pinned = self.retired.len(),
                "retired generations released"
            );
        }
    }

    /// Drop every bucket of a generation, overflow chains included.
    fn release_generation(&mut self, heads: &[BucketId]) {
        for &head in heads {
            let mut cur = Some(head);
            while let Some(id) = cur {
                cur = self.arena.remove(id).and_then(|b| b.overflow);
            }
        }
    }

    fn finish_growth(&mut self) {
        if let Some(old) = self.old_buckets.take() {
            if !self.retired.is_empty() || Arc::strong_count(&old) > 1 {
                self.retired.push_back(old);
            } else {
                self.release_generation(&old);
            }
        }
        self.same_size_grow = false;
        self.old_noverflow = 0;
        self.sweep_retired();
        if self.retired.is_empty() {
            self.forwards.clear();
        }
        tracing::debug!(
            b = self.b,
            count = self.count,
            pinned_generations = self.retired.len(),
            "hash table growth finished"
        );
    }

    /// Where a non-reflexive key went, following moves across generations.
    pub(crate) fn follow_forward(&self, mut id: BucketId, mut i: usize) -> Option<(&K, &V)> {
        loop {
            let &(next, ni) = self.forwards.get(&(id, i as u8))?;
            let b = self.arena.get(next)?;
            let ni = ni as usize;
            match b.tophash[ni] {
                EVACUATED_X | EVACUATED_Y => {
                    id = next;
                    i = ni;
                }
                t if t >= MIN_TOPHASH => return Some((b.key(ni)?, b.value(ni)?)),
                _ => return None,
            }
        }
    }
}

impl<K: Clone, V> RawTable<K, V> {
    pub(crate) fn grow_work(&mut self, bucket: usize) {
        // Make sure the old bucket behind the one about to be used is moved.
        self.evacuate(bucket & self.oldbucketmask());
        // One more, to make progress.
        if self.is_growing() {
            self.evacuate(self.nevacuate);
        }
    }

    /// Place an evacuated entry at `dest`, extending its chain when full.
    fn place(&mut self, dest: &mut Dest, top: u8, key: Stored<K>, value: Stored<V>) -> (BucketId, usize) {
        if dest.index == BUCKET_CNT {
            dest.bucket = self.new_overflow(dest.bucket);
            dest.index = 0;
        }
        let at = (dest.bucket, dest.index);
        self.arena[dest.bucket].fill(dest.index, top, key, value);
        dest.index += 1;
        at
    }

    /// Decide where every entry of the chain at `head` goes. Runs all the
    /// user code evacuation needs (hash, equality, key clones) and touches
    /// nothing, so a panic in it leaves the chain unevacuated and intact.
    fn plan_evacuation(&self, head: BucketId, doubling: bool, pinned: bool) -> Vec<Move<K>> {
        let newbit = self.noldbuckets();
        let mut moves = Vec::new();
        let mut cur = Some(head);
        while let Some(src) = cur {
            let bucket = &self.arena[src];
            for i in 0..BUCKET_CNT {
                let mut top = bucket.tophash[i];
                if top == EMPTY {
                    continue;
                }
                assert!(top >= MIN_TOPHASH, "bad table state: marker in unevacuated bucket");

                let key = bucket.key(i).expect("tagged slot holds a key");
                let reflexive = self.is_reflexive(key);
                let mut use_y = false;
                if doubling {
                    let mut hash = self.hash(key);
                    if !reflexive {
                        // Such a key hashes differently every time. Let
                        // the tag's low bit pick the half, which is what
                        // an iterator filtering this bucket expects, and
                        // give it a fresh tag for the next level.
                        if top & 1 != 0 {
                            hash |= newbit as u64;
                        } else {
                            hash &= !(newbit as u64);
                        }
                        top = tophash(hash);
                    }
                    use_y = hash as usize & newbit != 0;
                }
                // Iterators re-look-up moved entries by key, so a pinned
                // generation keeps a copy.
                let copy = pinned.then(|| {
                    bucket
                        .stored_key(i)
                        .cloned()
                        .expect("tagged slot holds a key")
                });
                moves.push(Move {
                    src,
                    index: i,
                    top,
                    use_y,
                    reflexive,
                    copy,
                });
            }
            cur = bucket.overflow;
        }
        moves
    }

    pub(crate) fn evacuate(&mut self, oldbucket: usize) {
        let Some(head) = self.old_head(oldbucket) else {
            return;
        };
        let newbit = self.noldbuckets();
        if !self.arena[head].evacuated() {
            let pinned = self.old_generation_pinned();
            // Only a doubling has a high half.
            let doubling = !self.same_size_grow;
            let moves = self.plan_evacuation(head, doubling, pinned);

            let mut x = Dest {
                bucket: self.buckets[oldbucket],
                index: 0,
            };
            let mut y = doubling.then(|| Dest {
                bucket: self.buckets[oldbucket + newbit],
                index: 0,
            });

            let mut cur = Some(head);
            while let Some(src) = cur {
                let bucket = &mut self.arena[src];
                for t in bucket.tophash.iter_mut().filter(|t| **t == EMPTY) {
                    *t = EVACUATED_EMPTY;
                }
                cur = bucket.overflow;
            }
            for m in moves {
                let bucket = &mut self.arena[m.src];
                bucket.tophash[m.index] = if m.use_y { EVACUATED_Y } else { EVACUATED_X };
                let (key, value) = match m.copy {
                    Some(key) => {
                        let value = bucket
                            .value_slot_mut(m.index)
                            .take()
                            .expect("tagged slot holds a value");
                        (key, value)
                    }
                    None => bucket.take(m.index).expect("tagged slot holds an entry"),
                };

                let dest = match (m.use_y, y.as_mut()) {
                    (true, Some(y)) => y,
                    _ => &mut x,
                };
                let at = self.place(dest, m.top, key, value);
                if pinned && !m.reflexive {
                    self.forwards
                        .insert((m.src, m.index as u8), (at.0, at.1 as u8));
                }
            }

            if !pinned {
                // Nobody can reach the old chain any more: drop its overflow
                // buckets. The head keeps its tags for the evacuation state.
                let mut next = self.arena[head].overflow.take();
                while let Some(id) = next {
                    next = self.arena.remove(id).and_then(|b| b.overflow);
                }
            }
        }

        if oldbucket == self.nevacuate {
            self.nevacuate = oldbucket + 1;
            let stop = (self.nevacuate + EVACUATION_SCAN_CAP).min(newbit);
            while self.nevacuate != stop && self.old_bucket_evacuated(self.nevacuate) {
                self.nevacuate += 1;
            }
            if self.nevacuate == newbit {
                self.finish_growth();
            }
        }
    }
}
