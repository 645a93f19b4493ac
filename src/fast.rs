//! Specialized lookups for common key shapes.
//!
//! Results always match the generic operations. The shortcuts only apply
//! to tables built on [`TypeDescriptor::hashed`](crate::TypeDescriptor::hashed),
//! where equality is plain `==`; other tables take the generic path.

use crate::bucket::{BucketId, BUCKET_CNT, MIN_TOPHASH};
use crate::descriptor::seeded_hash;
use crate::error::ConcurrentAccessViolation;
use crate::raw::RawTable;
use crate::table::Table;
use core::hash::Hash;

/// Strings shorter than this are compared outright in a one-bucket table.
pub const SHORT_STRING_LEN: usize = 32;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u32 {}
    impl Sealed for i32 {}
    impl Sealed for u64 {}
    impl Sealed for i64 {}
}

/// 4- and 8-byte scalar keys with a fast path.
pub trait FixedKey: sealed::Sealed + Copy + Eq + Hash {}

impl FixedKey for u32 {}
impl FixedKey for i32 {}
impl FixedKey for u64 {}
impl FixedKey for i64 {}

impl<K: FixedKey, V> Table<K, V> {
    /// Same result as [`Table::get`]. A one-bucket table is searched
    /// without hashing.
    pub fn get_fixed(&self, key: K) -> Option<&V> {
        self.access
            .check_read(ConcurrentAccessViolation::ReadDuringWrite);
        let raw = &self.raw;
        if raw.count == 0 {
            return None;
        }
        if !raw.standard_hash {
            return raw.lookup(&key).map(|(_, v)| v);
        }
        let head = if raw.b == 0 && !raw.is_growing() {
            raw.buckets[0]
        } else {
            raw.home_bucket(raw.hash(&key))
        };
        let at = raw.scan_chain(head, |k| *k == key)?;
        raw.entry_at(at).map(|(_, v)| v)
    }

    /// Same result as [`Table::put`].
    pub fn put_fixed(&mut self, key: K, value: V) -> &mut V {
        if !self.raw.standard_hash {
            return self.put(key, value);
        }
        self.access
            .check_read(ConcurrentAccessViolation::WriteDuringWrite);
        let hash = self.raw.hash(&key);
        let _w = self.access.begin_write();
        let r = self.raw.reserve(hash, |k| *k == key);
        self.raw.write(r, || key, value)
    }

    /// Same result as [`Table::remove`].
    pub fn delete_fixed(&mut self, key: K) -> Option<V> {
        if !self.raw.standard_hash {
            return self.remove(&key);
        }
        self.access
            .check_read(ConcurrentAccessViolation::WriteDuringWrite);
        if self.raw.count == 0 {
            return None;
        }
        let hash = self.raw.hash(&key);
        let _w = self.access.begin_write();
        self.raw.remove(hash, |k| *k == key).map(|(_, v)| v)
    }
}

/// Outcome of probing the single bucket of a `B == 0` table.
enum Probe {
    Hit(BucketId, usize),
    Miss,
    /// More than one candidate survived the cheap checks.
    Ambiguous,
}

fn probe_single<V>(raw: &RawTable<String, V>, key: &str) -> Probe {
    let id = raw.buckets[0];
    let b = &raw.arena[id];
    if b.overflow.is_some() {
        return Probe::Ambiguous;
    }
    let live = move |i: usize| {
        if b.tophash[i] < MIN_TOPHASH {
            return None;
        }
        b.key(i).filter(|k| k.len() == key.len())
    };

    if key.len() < SHORT_STRING_LEN {
        for i in 0..BUCKET_CNT {
            if let Some(k) = live(i) {
                if k.as_ptr() == key.as_ptr() || k.as_str() == key {
                    return Probe::Hit(id, i);
                }
            }
        }
        return Probe::Miss;
    }

    // Long key: rule candidates out by their ends before comparing.
    let bytes = key.as_bytes();
    let (head, tail) = (&bytes[..4], &bytes[bytes.len() - 4..]);
    let mut maybe = None;
    for i in 0..BUCKET_CNT {
        let Some(k) = live(i) else {
            continue;
        };
        if k.as_ptr() == key.as_ptr() {
            return Probe::Hit(id, i);
        }
        let kb = k.as_bytes();
        if &kb[..4] != head || &kb[kb.len() - 4..] != tail {
            continue;
        }
        if maybe.is_some() {
            return Probe::Ambiguous;
        }
        maybe = Some(i);
    }
    match maybe {
        Some(i) if b.key(i).is_some_and(|k| k.as_str() == key) => Probe::Hit(id, i),
        _ => Probe::Miss,
    }
}

impl<V> Table<String, V> {
    /// Same result as `get(&key.to_owned())`, without the allocation.
    pub fn get_str(&self, key: &str) -> Option<&V> {
        self.access
            .check_read(ConcurrentAccessViolation::ReadDuringWrite);
        let raw = &self.raw;
        if raw.count == 0 {
            return None;
        }
        if !raw.standard_hash {
            return raw.lookup(&key.to_owned()).map(|(_, v)| v);
        }
        if raw.b == 0 && !raw.is_growing() {
            match probe_single(raw, key) {
                Probe::Hit(id, i) => return raw.entry_at((id, i)).map(|(_, v)| v),
                Probe::Miss => return None,
                Probe::Ambiguous => {}
            }
        }
        let hash = seeded_hash(key, raw.seed);
        let at = raw.find(hash, |k| k.as_str() == key)?;
        raw.entry_at(at).map(|(_, v)| v)
    }

    /// Same as `put(key.to_owned(), value)`; allocates the key only when
    /// it is new (or refreshed on overwrite).
    pub fn put_str(&mut self, key: &str, value: V) -> &mut V {
        if !self.raw.standard_hash {
            return self.put(key.to_owned(), value);
        }
        self.access
            .check_read(ConcurrentAccessViolation::WriteDuringWrite);
        let hash = seeded_hash(key, self.raw.seed);
        let _w = self.access.begin_write();
        let r = self.raw.reserve(hash, |k| k.as_str() == key);
        self.raw.write(r, || key.to_owned(), value)
    }

    /// Same as `remove(&key.to_owned())`, without the allocation.
    pub fn delete_str(&mut self, key: &str) -> Option<V> {
        if !self.raw.standard_hash {
            return self.remove(&key.to_owned());
        }
        self.access
            .check_read(ConcurrentAccessViolation::WriteDuringWrite);
        if self.raw.count == 0 {
            return None;
        }
        let hash = seeded_hash(key, self.raw.seed);
        let _w = self.access.begin_write();
        self.raw.remove(hash, |k| k.as_str() == key).map(|(_, v)| v)
    }
}
