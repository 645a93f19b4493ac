//! Store: a `Table` behind a reader-writer lock.
//!
//! The table itself is unsynchronized; this is the layer that makes it
//! shareable between threads. Reads take the shared lock and clone values
//! out, writes take the exclusive lock.

use crate::descriptor::TypeDescriptor;
use crate::error::{CreateError, NotFound};
use crate::table::{Table, TableStats};
use core::hash::Hash;
use parking_lot::RwLock;

/// A [`Table`] shared between threads. A miss on `get` is [`NotFound`].
pub struct Store<K, V> {
    table: RwLock<Table<K, V>>,
}

impl<K: Hash + Eq, V> Store<K, V> {
    /// Empty store over [`TypeDescriptor::hashed`].
    pub fn new() -> Self {
        Self::from_table(
            Table::hashed(0).unwrap_or_else(|e| unreachable!("default descriptor rejected: {e}")),
        )
    }

    /// Empty store presized for `size_hint` entries.
    pub fn with_size_hint(size_hint: usize) -> Result<Self, CreateError> {
        Ok(Self::from_table(Table::hashed(size_hint)?))
    }
}

impl<K: Hash + Eq, V> Default for Store<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Store<K, V> {
    /// Empty store over a caller-supplied descriptor.
    pub fn with_descriptor(
        desc: &TypeDescriptor<K, V>,
        size_hint: usize,
    ) -> Result<Self, CreateError> {
        Ok(Self::from_table(Table::create(desc, size_hint)?))
    }

    /// Wrap an existing table.
    pub fn from_table(table: Table<K, V>) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Unwrap the table.
    pub fn into_table(self) -> Table<K, V> {
        self.table.into_inner()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table.read().contains_key(key)
    }

    /// Counters of the underlying table.
    pub fn stats(&self) -> TableStats {
        self.table.read().stats()
    }

    /// Run `f` against the table under the shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&Table<K, V>) -> R) -> R {
        f(&self.table.read())
    }

    /// Name of the key type, as reported by [`Table::key_type_name`].
    pub fn key_type_name(&self) -> &'static str {
        core::any::type_name::<K>()
    }
}

impl<K, V: Clone> Store<K, V> {
    /// Clone of the value for `key`.
    pub fn get(&self, key: &K) -> Result<V, NotFound> {
        self.table.read().get(key).cloned().ok_or(NotFound)
    }
}

impl<K: Clone, V> Store<K, V> {
    /// Insert or overwrite.
    pub fn put(&self, key: K, value: V) {
        self.table.write().put(key, value);
    }

    /// Remove `key`, returning its value.
    pub fn delete(&self, key: &K) -> Option<V> {
        self.table.write().remove(key)
    }
}

impl<K: Clone, V: Clone> Store<K, V> {
    /// Copy of every entry, in iteration order.
    pub fn entries(&self) -> Vec<(K, V)> {
        let table = self.table.read();
        table
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<V: Clone> Store<String, V> {
    /// [`Store::get`] by `&str`, without allocating.
    pub fn get_str(&self, key: &str) -> Result<V, NotFound> {
        self.table.read().get_str(key).cloned().ok_or(NotFound)
    }
}

impl<V> Store<String, V> {
    /// [`Store::put`] by `&str`; the key is allocated only when new.
    pub fn put_str(&self, key: &str, value: V) {
        self.table.write().put_str(key, value);
    }

    /// [`Store::delete`] by `&str`.
    pub fn delete_str(&self, key: &str) -> Option<V> {
        self.table.write().delete_str(key)
    }
}
