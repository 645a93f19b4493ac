//! Iteration with a random starting point, safe across growth.
//!
//! A [`Cursor`] holds no borrow of its table. It keeps the bucket
//! generation(s) it walks alive through `Arc` clones; while it does, the
//! table copies keys instead of moving them out during evacuation, and
//! defers releasing finished generations. Between steps the table may be
//! written to freely:
//!
//! - every entry present for the whole walk is yielded exactly once;
//! - an entry inserted or removed during the walk may or may not be seen;
//! - a value overwritten during the walk is seen in its latest form.
//!
//! Evacuated slots are resolved by looking the key up in the current
//! table. Keys that do not equal themselves cannot be looked up; their
//! moves are recorded by the table and followed instead.

use crate::bucket::{BucketId, BUCKET_CNT, EMPTY, EVACUATED_EMPTY, EVACUATED_X, EVACUATED_Y};
use crate::error::ConcurrentAccessViolation;
use crate::raw::RawTable;
use crate::table::Table;
use core::fmt;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use std::sync::Arc;

/// Generations pinned by a cursor.
struct Snapshot {
    buckets: Arc<[BucketId]>,
    /// Present when the table was growing at creation time.
    old: Option<Arc<[BucketId]>>,
    /// Kind of that growth. Old chains walked in place of a bucket are
    /// filtered by it even if a different growth has started since.
    same_size_grow: bool,
}

/// Detached iteration state over a [`Table`].
///
/// Advance with [`Cursor::next`], passing the table it was created from.
/// Once exhausted it releases its pins and keeps returning `None`.
pub struct Cursor<K, V> {
    table_id: u64,
    snapshot: Option<Snapshot>,
    /// log2 of the bucket count at creation.
    b: u8,
    start_bucket: usize,
    offset: usize,
    bucket: usize,
    bptr: Option<BucketId>,
    i: usize,
    wrapped: bool,
    /// Set while walking an unevacuated old bucket in place of `bucket - 1`.
    check_bucket: Option<usize>,
    _pd: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Cursor<K, V> {
    pub(crate) fn new(table: &Table<K, V>) -> Self {
        let raw = &table.raw;
        let mut cursor = Self {
            table_id: table.id,
            snapshot: None,
            b: raw.b,
            start_bucket: 0,
            offset: 0,
            bucket: 0,
            bptr: None,
            i: 0,
            wrapped: false,
            check_bucket: None,
            _pd: PhantomData,
        };
        if raw.count == 0 || raw.buckets.is_empty() {
            return cursor;
        }
        let r: u64 = rand::random();
        cursor.start_bucket = r as usize & raw.bucket_mask();
        cursor.offset = (r >> 56) as usize & (BUCKET_CNT - 1);
        cursor.bucket = cursor.start_bucket;
        cursor.snapshot = Some(Snapshot {
            buckets: Arc::clone(&raw.buckets),
            old: raw.old_buckets.clone(),
            same_size_grow: raw.is_growing() && raw.same_size_grow,
        });
        cursor
    }

    /// Next entry, or `None` once every bucket has been visited.
    ///
    /// # Panics
    /// If `table` is not the table this cursor was created from.
    #[allow(clippy::should_implement_trait)]
    pub fn next<'t>(&mut self, table: &'t Table<K, V>) -> Option<(&'t K, &'t V)> {
        assert_eq!(
            self.table_id, table.id,
            "cursor advanced with a different table"
        );
        table
            .access
            .check_read(ConcurrentAccessViolation::IterateDuringWrite);
        let item = self.advance(&table.raw);
        if item.is_none() {
            self.snapshot = None;
            self.bptr = None;
        }
        item
    }

    /// Whether the cursor has been exhausted (or never had anything to
    /// visit).
    pub fn is_finished(&self) -> bool {
        self.snapshot.is_none()
    }

    fn advance<'t>(&mut self, raw: &'t RawTable<K, V>) -> Option<(&'t K, &'t V)> {
        let snap = self.snapshot.as_ref()?;
        let nbuckets = snap.buckets.len();
        let mask = nbuckets - 1;
        let same_size_grow = snap.same_size_grow;
        loop {
            let id = match self.bptr {
                Some(id) => id,
                None => {
                    if self.bucket == self.start_bucket && self.wrapped {
                        return None;
                    }
                    let mut head = snap.buckets[self.bucket];
                    self.check_bucket = None;
                    if raw.is_growing() && Arc::ptr_eq(&snap.buckets, &raw.buckets) {
                        // Started mid-growth and the growth is still going.
                        // If the old bucket for this one is not evacuated
                        // yet, walk it instead and keep only the entries
                        // headed here.
                        let old = raw.old_head(self.bucket & raw.oldbucketmask())?;
                        if !raw.arena[old].evacuated() {
                            head = old;
                            self.check_bucket = Some(self.bucket);
                        }
                    }
                    self.bucket += 1;
                    if self.bucket == nbuckets {
                        self.bucket = 0;
                        self.wrapped = true;
                    }
                    self.i = 0;
                    self.bptr = Some(head);
                    head
                }
            };

            let Some(b) = raw.arena.get(id) else {
                self.bptr = None;
                continue;
            };
            while self.i < BUCKET_CNT {
                let offi = (self.i + self.offset) & (BUCKET_CNT - 1);
                self.i += 1;
                let top = b.tophash[offi];
                if top == EMPTY || top == EVACUATED_EMPTY {
                    continue;
                }
                let Some(k) = b.key(offi) else {
                    continue;
                };
                let reflexive = raw.is_reflexive(k);
                if let Some(check) = self.check_bucket {
                    if !same_size_grow {
                        if reflexive {
                            // Would this entry land in the bucket we are
                            // standing in for?
                            if raw.hash(k) as usize & mask != check {
                                continue;
                            }
                        } else if check >> (self.b - 1) != usize::from(top & 1) {
                            // Evacuation sends such keys by the tag's low
                            // bit; follow the same rule.
                            continue;
                        }
                    }
                }
                if top != EVACUATED_X && top != EVACUATED_Y {
                    if let Some(v) = b.value(offi) {
                        return Some((k, v));
                    }
                    continue;
                }
                // Moved since the walk began: the current table has the
                // truth, and a miss means it was deleted.
                let found = if reflexive {
                    raw.lookup(k)
                } else {
                    raw.follow_forward(id, offi)
                };
                if found.is_some() {
                    return found;
                }
            }
            self.bptr = b.overflow;
        }
    }
}

impl<K, V> fmt::Debug for Cursor<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("table_id", &self.table_id)
            .field("b", &self.b)
            .field("start_bucket", &self.start_bucket)
            .field("offset", &self.offset)
            .field("bucket", &self.bucket)
            .field("wrapped", &self.wrapped)
            .field(
                "pinned_generations",
                &self
                    .snapshot
                    .as_ref()
                    .map_or(0, |s| 1 + usize::from(s.old.is_some())),
            )
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Borrowing iterator over a [`Table`]'s entries, in no particular order.
pub struct Iter<'a, K, V> {
    table: &'a Table<K, V>,
    cursor: Cursor<K, V>,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(table: &'a Table<K, V>, cursor: Cursor<K, V>) -> Self {
        Self { table, cursor }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next(self.table)
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}
