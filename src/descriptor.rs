//! Type descriptors: everything the engine needs to know about a key/value
//! shape, supplied by the caller once and copied into each table.

use crate::error::DescriptorError;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use core::mem::{align_of, size_of};

/// Largest key kept inline in a bucket; bigger keys are boxed.
pub const MAX_INLINE_KEY_SIZE: usize = 128;
/// Largest value kept inline in a bucket; bigger values are boxed.
pub const MAX_INLINE_VALUE_SIZE: usize = 128;

/// Seeded hash function: `hash(key, seed)`.
pub type HashFn<K> = fn(&K, u64) -> u64;
/// Key equality.
pub type EqualFn<K> = fn(&K, &K) -> bool;

/// Hash `value` with an ahash state derived from `seed`.
///
/// `seeded_hash(s.as_str(), seed) == seeded_hash(&s, seed)` for any
/// `String` `s`; the string fast paths rely on it.
#[inline]
pub fn seeded_hash<T: Hash + ?Sized>(value: &T, seed: u64) -> u64 {
    ahash::RandomState::with_seeds(
        seed,
        seed.rotate_left(32) ^ 0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
    )
    .hash_one(value)
}

fn eq_by_partial_eq<K: PartialEq>(a: &K, b: &K) -> bool {
    a == b
}

/// Describes how the engine hashes, compares and stores `K` and `V`.
///
/// Build one with [`TypeDescriptor::hashed`] for any `K: Hash + Eq`, or
/// start from [`TypeDescriptor::new`] and supply the functions by hand.
/// Validation happens when a table is created.
pub struct TypeDescriptor<K, V> {
    key_size: usize,
    key_align: usize,
    value_size: usize,
    value_align: usize,
    key_indirect: bool,
    value_indirect: bool,
    hash: Option<HashFn<K>>,
    equal: Option<EqualFn<K>>,
    update_key_on_overwrite: bool,
    reflexive_key: bool,
    standard_hash: bool,
    _pd: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for TypeDescriptor<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for TypeDescriptor<K, V> {}

impl<K, V> fmt::Debug for TypeDescriptor<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key_size", &self.key_size)
            .field("key_align", &self.key_align)
            .field("value_size", &self.value_size)
            .field("value_align", &self.value_align)
            .field("key_indirect", &self.key_indirect)
            .field("value_indirect", &self.value_indirect)
            .field("has_hash", &self.hash.is_some())
            .field("has_equal", &self.equal.is_some())
            .field("update_key_on_overwrite", &self.update_key_on_overwrite)
            .field("reflexive_key", &self.reflexive_key)
            .finish()
    }
}

impl<K, V> TypeDescriptor<K, V> {
    /// A descriptor with layout filled in from the types and no hash or
    /// equality function yet. Oversized keys and values default to
    /// indirect storage.
    pub fn new() -> Self {
        Self {
            key_size: size_of::<K>(),
            key_align: align_of::<K>(),
            value_size: size_of::<V>(),
            value_align: align_of::<V>(),
            key_indirect: size_of::<K>() > MAX_INLINE_KEY_SIZE,
            value_indirect: size_of::<V>() > MAX_INLINE_VALUE_SIZE,
            hash: None,
            equal: None,
            update_key_on_overwrite: false,
            reflexive_key: false,
            standard_hash: false,
            _pd: PhantomData,
        }
    }

    /// Set the seeded hash function.
    pub fn with_hash(mut self, hash: HashFn<K>) -> Self {
        self.hash = Some(hash);
        self.standard_hash = false;
        self
    }

    /// Set key equality.
    pub fn with_equal(mut self, equal: EqualFn<K>) -> Self {
        self.equal = Some(equal);
        self
    }

    /// Box keys instead of storing them in the bucket.
    pub fn key_indirect(mut self, indirect: bool) -> Self {
        self.key_indirect = indirect;
        self
    }

    /// Box values instead of storing them in the bucket.
    pub fn value_indirect(mut self, indirect: bool) -> Self {
        self.value_indirect = indirect;
        self
    }

    /// Replace the stored key on `put` of an existing key. Needed when
    /// distinct representations compare equal (e.g. `+0.0` and `-0.0`).
    pub fn update_key_on_overwrite(mut self, update: bool) -> Self {
        self.update_key_on_overwrite = update;
        self
    }

    /// Declare that every key equals itself. When false the engine checks
    /// `equal(k, k)` before trusting a key's hash during growth and
    /// iteration.
    pub fn reflexive_key(mut self, reflexive: bool) -> Self {
        self.reflexive_key = reflexive;
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.hash.is_none() {
            return Err(DescriptorError::MissingHash);
        }
        if self.equal.is_none() {
            return Err(DescriptorError::MissingEqual);
        }
        if self.key_size > MAX_INLINE_KEY_SIZE && !self.key_indirect {
            return Err(DescriptorError::KeyMustBeIndirect {
                size: self.key_size,
            });
        }
        if self.value_size > MAX_INLINE_VALUE_SIZE && !self.value_indirect {
            return Err(DescriptorError::ValueMustBeIndirect {
                size: self.value_size,
            });
        }
        Ok(())
    }

    /// Size of `K` in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }
    /// Alignment of `K`.
    pub fn key_align(&self) -> usize {
        self.key_align
    }
    /// Size of `V` in bytes.
    pub fn value_size(&self) -> usize {
        self.value_size
    }
    /// Alignment of `V`.
    pub fn value_align(&self) -> usize {
        self.value_align
    }
    /// Keys are boxed rather than stored in the bucket.
    pub fn is_key_indirect(&self) -> bool {
        self.key_indirect
    }
    /// Values are boxed rather than stored in the bucket.
    pub fn is_value_indirect(&self) -> bool {
        self.value_indirect
    }
    /// `put` on an existing key replaces the stored key too.
    pub fn updates_key_on_overwrite(&self) -> bool {
        self.update_key_on_overwrite
    }
    /// Every key is declared to equal itself.
    pub fn is_reflexive(&self) -> bool {
        self.reflexive_key
    }

    /// True when hashing goes through [`seeded_hash`].
    pub(crate) fn uses_standard_hash(&self) -> bool {
        self.standard_hash
    }

    pub(crate) fn functions(&self) -> Option<(HashFn<K>, EqualFn<K>)> {
        Some((self.hash?, self.equal?))
    }
}

impl<K: Hash + Eq, V> TypeDescriptor<K, V> {
    /// Descriptor using [`seeded_hash`] and `==`. `Eq` promises
    /// reflexivity, so keys are trusted to equal themselves.
    pub fn hashed() -> Self {
        let mut d = Self::new()
            .with_hash(seeded_hash::<K>)
            .with_equal(eq_by_partial_eq::<K>)
            .reflexive_key(true);
        d.standard_hash = true;
        d
    }
}

impl<K, V> Default for TypeDescriptor<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
