//! Table: the public face of the engine.
//!
//! Every operation checks the access flag on entry; mutations hold a
//! `WriteGuard` for their duration. Keys are hashed before the guard is
//! taken, so a panicking hash function never leaves the flag set.

use crate::access::AccessFlags;
use crate::descriptor::TypeDescriptor;
use crate::error::{ConcurrentAccessViolation, CreateError, DescriptorError};
use crate::grow::exponent_for_hint;
use crate::iter::{Cursor, Iter};
use crate::raw::RawTable;
use core::fmt;
use core::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Largest accepted size hint.
pub const MAX_SIZE_HINT: usize = i32::MAX as usize;

/// Creation-time knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    /// Expected number of entries; picks the initial bucket count.
    pub size_hint: usize,
    /// Hash seed. Random when `None`.
    pub seed: Option<u64>,
}

impl TableOptions {
    /// Hint 0 and a random seed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expected number of entries. At most [`MAX_SIZE_HINT`].
    pub fn size_hint(mut self, hint: usize) -> Self {
        self.size_hint = hint;
        self
    }

    /// Fix the seed, e.g. to make bucket placement reproducible in tests.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Point-in-time counters, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub len: usize,
    /// log2 of the bucket count.
    pub b: u8,
    pub buckets: usize,
    pub overflow_buckets: usize,
    /// Overflow buckets of the generation being evacuated.
    pub old_overflow_buckets: usize,
    pub growing: bool,
    pub same_size_grow: bool,
    /// Old buckets evacuated so far (the evacuation cursor).
    pub evacuated: usize,
    pub grows: u64,
    pub same_size_grows: u64,
    /// Finished generations kept alive for iterators.
    pub pinned_generations: usize,
    /// Buckets allocated across all generations.
    pub arena_buckets: usize,
}

/// Hash table with incremental growth.
///
/// Not internally synchronized: share it behind a lock (see
/// [`Store`](crate::Store)). Writes require `K: Clone` because entries an
/// iterator may still visit are copied, not moved, during growth.
pub struct Table<K, V> {
    pub(crate) id: u64,
    pub(crate) access: AccessFlags,
    pub(crate) raw: RawTable<K, V>,
}

impl<K: Hash + Eq, V> Table<K, V> {
    /// Table over [`TypeDescriptor::hashed`].
    pub fn hashed(size_hint: usize) -> Result<Self, CreateError> {
        Self::create(&TypeDescriptor::hashed(), size_hint)
    }
}

impl<K, V> Table<K, V> {
    /// Validate `desc` and build a table sized for `size_hint` entries with
    /// a random seed.
    pub fn create(desc: &TypeDescriptor<K, V>, size_hint: usize) -> Result<Self, CreateError> {
        Self::with_options(desc, TableOptions::new().size_hint(size_hint))
    }

    /// Like [`Table::create`], with the seed under the caller's control.
    pub fn with_options(
        desc: &TypeDescriptor<K, V>,
        options: TableOptions,
    ) -> Result<Self, CreateError> {
        desc.validate()?;
        if options.size_hint > MAX_SIZE_HINT {
            return Err(CreateError::HintOutOfRange(options.size_hint));
        }
        let b = exponent_for_hint(options.size_hint);
        let seed = options.seed.unwrap_or_else(rand::random);
        let raw = RawTable::new(desc, b, seed).ok_or(DescriptorError::MissingHash)?;
        let id = NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(id, b, size_hint = options.size_hint, "hash table created");
        Ok(Self {
            id,
            access: AccessFlags::new(),
            raw,
        })
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.count
    }

    /// Returns true if the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.count == 0
    }

    /// Name of the key type, for diagnostics.
    pub fn key_type_name(&self) -> &'static str {
        core::any::type_name::<K>()
    }

    /// Snapshot of the table's counters.
    pub fn stats(&self) -> TableStats {
        let raw = &self.raw;
        TableStats {
            len: raw.count,
            b: raw.b,
            buckets: 1usize << raw.b,
            overflow_buckets: raw.noverflow,
            old_overflow_buckets: raw.old_noverflow,
            growing: raw.is_growing(),
            same_size_grow: raw.same_size_grow,
            evacuated: raw.nevacuate,
            grows: raw.grows,
            same_size_grows: raw.same_size_grows,
            pinned_generations: raw.retired.len(),
            arena_buckets: raw.arena.len(),
        }
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// The stored key and its value.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.access
            .check_read(ConcurrentAccessViolation::ReadDuringWrite);
        self.raw.lookup(key)
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get_key_value(key).is_some()
    }

    /// Mutable access to an existing value. Never grows the table.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.access
            .check_read(ConcurrentAccessViolation::ReadDuringWrite);
        if self.raw.count == 0 {
            return None;
        }
        let hash = self.raw.hash(key);
        let equal = self.raw.equal_fn;
        let at = self.raw.find(hash, |k| equal(key, k))?;
        self.raw.value_mut_at(at)
    }

    /// Cursor over the current contents. See [`Cursor`] for what it
    /// guarantees when the table changes between steps.
    pub fn cursor(&self) -> Cursor<K, V> {
        self.access
            .check_read(ConcurrentAccessViolation::IterateDuringWrite);
        Cursor::new(self)
    }

    /// Borrowing iterator over all entries, starting at a random point.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self, self.cursor())
    }
}

impl<K: Clone, V> Table<K, V> {
    /// Insert or overwrite. Returns the slot now holding `value`.
    pub fn put(&mut self, key: K, value: V) -> &mut V {
        self.access
            .check_read(ConcurrentAccessViolation::WriteDuringWrite);
        let hash = self.raw.hash(&key);
        let _w = self.access.begin_write();
        let equal = self.raw.equal_fn;
        let r = self.raw.reserve(hash, |k| equal(&key, k));
        self.raw.write(r, move || key, value)
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.access
            .check_read(ConcurrentAccessViolation::WriteDuringWrite);
        if self.raw.count == 0 {
            return None;
        }
        let hash = self.raw.hash(key);
        let _w = self.access.begin_write();
        let equal = self.raw.equal_fn;
        self.raw.remove(hash, |k| equal(key, k)).map(|(_, v)| v)
    }

    /// Remove `key` if present.
    pub fn delete(&mut self, key: &K) {
        self.remove(key);
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Table<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a Table<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded<K: Hash + Eq, V>(hint: usize) -> Table<K, V> {
        Table::with_options(
            &TypeDescriptor::hashed(),
            TableOptions::new().size_hint(hint).seed(0x5eed),
        )
        .unwrap()
    }

    #[test]
    fn create_rejects_bad_descriptor() {
        let d = TypeDescriptor::<u64, u64>::new();
        assert_eq!(
            Table::create(&d, 0).err(),
            Some(CreateError::Descriptor(DescriptorError::MissingHash))
        );
    }

    #[test]
    fn create_rejects_huge_hint() {
        let d = TypeDescriptor::<u64, u64>::hashed();
        let hint = MAX_SIZE_HINT + 1;
        assert_eq!(
            Table::create(&d, hint).err(),
            Some(CreateError::HintOutOfRange(hint))
        );
    }

    #[test]
    fn hint_sizes_bucket_array() {
        assert_eq!(seeded::<u64, u64>(0).stats().b, 0);
        assert_eq!(seeded::<u64, u64>(8).stats().b, 1);
        let t = seeded::<u64, u64>(100);
        assert_eq!(t.stats().b, 4);
        assert_eq!(t.stats().arena_buckets, 16);
        // B == 0 allocates on first insert.
        assert_eq!(seeded::<u64, u64>(0).stats().arena_buckets, 0);
    }

    #[test]
    fn put_get_overwrite_remove() {
        let mut t = seeded::<i32, String>(0);
        t.put(1, "one".into());
        t.put(2, "two".into());
        t.put(1, "uno".into());
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(&1).map(String::as_str), Some("uno"));
        t.get_mut(&2).unwrap().push('!');
        assert_eq!(t.get(&2).map(String::as_str), Some("two!"));
        assert_eq!(t.remove(&1).as_deref(), Some("uno"));
        assert_eq!(t.remove(&1), None);
        t.delete(&99);
        assert_eq!(t.len(), 1);
        assert!(!t.contains_key(&1));
    }

    #[test]
    fn put_returns_slot_for_in_place_update() {
        let mut t = seeded::<&'static str, u32>(0);
        *t.put("hits", 0) += 5;
        assert_eq!(t.get(&"hits"), Some(&5));
    }

    #[test]
    fn key_refresh_on_overwrite() {
        fn hash_f64(k: &f64, seed: u64) -> u64 {
            // +0.0 and -0.0 must hash alike.
            let k = if *k == 0.0 { 0.0 } else { *k };
            crate::seeded_hash(&k.to_bits(), seed)
        }
        let d = TypeDescriptor::<f64, u8>::new()
            .with_hash(hash_f64)
            .with_equal(|a, b| a == b)
            .update_key_on_overwrite(true);
        let mut t = Table::create(&d, 0).unwrap();
        t.put(0.0, 1);
        t.put(-0.0, 2);
        assert_eq!(t.len(), 1);
        let (k, v) = t.get_key_value(&0.0).unwrap();
        assert!(k.is_sign_negative());
        assert_eq!(*v, 2);
    }

    #[test]
    fn nan_keys_never_match() {
        fn hash_f64(k: &f64, seed: u64) -> u64 {
            if k.is_nan() {
                rand::random()
            } else {
                crate::seeded_hash(&k.to_bits(), seed)
            }
        }
        let d = TypeDescriptor::<f64, u32>::new()
            .with_hash(hash_f64)
            .with_equal(|a, b| a == b);
        let mut t = Table::create(&d, 0).unwrap();
        for i in 0..50 {
            t.put(f64::NAN, i);
        }
        t.put(1.5, 7);
        assert_eq!(t.len(), 51);
        assert_eq!(t.get(&f64::NAN), None);
        t.delete(&f64::NAN);
        assert_eq!(t.len(), 51);
        assert_eq!(t.get(&1.5), Some(&7));
        let mut nan_values: Vec<u32> = t
            .iter()
            .filter(|(k, _)| k.is_nan())
            .map(|(_, v)| *v)
            .collect();
        nan_values.sort_unstable();
        assert_eq!(nan_values, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn debug_lists_entries() {
        let mut t = seeded::<u8, u8>(0);
        t.put(1, 2);
        assert_eq!(format!("{t:?}"), "{1: 2}");
    }

    #[test]
    fn reports_key_type() {
        let t = seeded::<u32, String>(0);
        assert_eq!(t.key_type_name(), "u32");
        let t = seeded::<String, u8>(0);
        assert!(t.key_type_name().ends_with("String"));
    }

    #[test]
    fn stats_track_growth() {
        let mut t = seeded::<u32, u32>(0);
        for i in 0..9 {
            t.put(i, i);
        }
        let s = t.stats();
        assert_eq!(s.len, 9);
        assert_eq!(s.grows, 1);
        assert_eq!(s.b, 1);
        assert!(!s.growing);
        assert_eq!(s.pinned_generations, 0);
    }
}
