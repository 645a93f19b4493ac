//! Bucket layout: eight tagged slots and an overflow link.

use slotmap::new_key_type;

pub(crate) const BUCKET_CNT_BITS: u32 = 3;
/// Slots per bucket.
pub(crate) const BUCKET_CNT: usize = 1 << BUCKET_CNT_BITS;

// Tag values below MIN_TOPHASH are markers. A bucket chain has either all
// or none of its slots in the evacuated states.
pub(crate) const EMPTY: u8 = 0;
pub(crate) const EVACUATED_EMPTY: u8 = 1;
/// Entry moved to the low half of the grown table.
pub(crate) const EVACUATED_X: u8 = 2;
/// Entry moved to the high half. Differs from X in its low bit.
pub(crate) const EVACUATED_Y: u8 = 3;
pub(crate) const MIN_TOPHASH: u8 = 4;

new_key_type! {
    /// Generation-tagged handle of a bucket in a table's arena.
    pub(crate) struct BucketId;
}

/// Tag byte for `hash`: its top byte, pushed out of the marker range.
#[inline]
pub(crate) fn tophash(hash: u64) -> u8 {
    let top = (hash >> (u64::BITS - 8)) as u8;
    if top < MIN_TOPHASH {
        top + MIN_TOPHASH
    } else {
        top
    }
}

/// Inline or boxed slot storage, chosen per descriptor.
#[derive(Debug, Clone)]
pub(crate) enum Stored<T> {
    Inline(T),
    Indirect(Box<T>),
}

impl<T> Stored<T> {
    #[inline]
    pub(crate) fn new(value: T, indirect: bool) -> Self {
        if indirect {
            Stored::Indirect(Box::new(value))
        } else {
            Stored::Inline(value)
        }
    }

    #[inline]
    pub(crate) fn get(&self) -> &T {
        match self {
            Stored::Inline(v) => v,
            Stored::Indirect(b) => b,
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self) -> &mut T {
        match self {
            Stored::Inline(v) => v,
            Stored::Indirect(b) => b,
        }
    }

    pub(crate) fn into_inner(self) -> T {
        match self {
            Stored::Inline(v) => v,
            Stored::Indirect(b) => *b,
        }
    }

    /// Overwrite in place, reusing the box when indirect.
    pub(crate) fn replace(&mut self, value: T) -> T {
        core::mem::replace(self.get_mut(), value)
    }
}

pub(crate) struct Bucket<K, V> {
    pub(crate) tophash: [u8; BUCKET_CNT],
    keys: [Option<Stored<K>>; BUCKET_CNT],
    values: [Option<Stored<V>>; BUCKET_CNT],
    pub(crate) overflow: Option<BucketId>,
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            tophash: [EMPTY; BUCKET_CNT],
            keys: core::array::from_fn(|_| None),
            values: core::array::from_fn(|_| None),
            overflow: None,
        }
    }

    /// A head bucket whose chain has been moved to the next generation.
    #[inline]
    pub(crate) fn evacuated(&self) -> bool {
        let h = self.tophash[0];
        h > EMPTY && h < MIN_TOPHASH
    }

    #[inline]
    pub(crate) fn key(&self, i: usize) -> Option<&K> {
        self.keys[i].as_ref().map(Stored::get)
    }

    #[inline]
    pub(crate) fn value(&self, i: usize) -> Option<&V> {
        self.values[i].as_ref().map(Stored::get)
    }

    #[inline]
    pub(crate) fn value_mut(&mut self, i: usize) -> Option<&mut V> {
        self.values[i].as_mut().map(Stored::get_mut)
    }

    #[inline]
    pub(crate) fn stored_key(&self, i: usize) -> Option<&Stored<K>> {
        self.keys[i].as_ref()
    }

    pub(crate) fn fill(&mut self, i: usize, top: u8, key: Stored<K>, value: Stored<V>) {
        self.tophash[i] = top;
        self.keys[i] = Some(key);
        self.values[i] = Some(value);
    }

    pub(crate) fn key_slot_mut(&mut self, i: usize) -> &mut Option<Stored<K>> {
        &mut self.keys[i]
    }

    pub(crate) fn value_slot_mut(&mut self, i: usize) -> &mut Option<Stored<V>> {
        &mut self.values[i]
    }

    /// Take key and value out of slot `i`. The tag is left to the caller.
    pub(crate) fn take(&mut self, i: usize) -> Option<(Stored<K>, Stored<V>)> {
        let k = self.keys[i].take()?;
        let v = self.values[i].take()?;
        Some((k, v))
    }

    /// Number of slots carrying a live tag.
    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.tophash.iter().filter(|&&t| t >= MIN_TOPHASH).count()
    }
}
