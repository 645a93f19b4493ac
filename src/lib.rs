//! incremental-hashmap: a bucketed hash table with tag bytes, overflow
//! chains and incremental growth that keeps iteration well defined while
//! the table is being resized.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) amortized lookup, insert and delete with no long pauses.
//!   Resizing never rehashes the whole table at once; every write moves a
//!   little of the old bucket array into the new one.
//! - Layers:
//!   - `TypeDescriptor<K, V>`: how keys are hashed and compared and whether
//!     keys and values live inline or boxed. Supplied by the caller,
//!     validated at creation, copied into the table.
//!   - `RawTable<K, V>`: header, bucket arena, lookup/insert/delete and
//!     growth. Knows nothing about concurrent callers.
//!   - `Table<K, V>`: public API. Adds the access detector, size hints,
//!     seeding and iteration.
//!   - `Store<K, V>`: `Table` behind a `parking_lot::RwLock`, for sharing
//!     between threads.
//!
//! Buckets
//! - A bucket has 8 slots, one tag byte per slot, and an optional overflow
//!   link. The tag is the top byte of the key's hash; values below
//!   `MIN_TOPHASH` are markers (empty, evacuated-empty, evacuated to the
//!   low half X, evacuated to the high half Y) and real tags are bumped
//!   out of that range.
//! - Buckets of every live generation sit in one `slotmap::SlotMap`. A
//!   generation is an `Arc<[BucketId]>` of chain heads.
//!
//! Growth
//! - Trigger on insert of a new key: load factor reached
//!   (`count >= 8 && count >= 6.5 * 2^B`), or as many overflow buckets as
//!   regular ones. The first doubles the bucket count; the second regrows
//!   at the same size to compact sparse chains.
//! - While growing, every insert or delete evacuates the old bucket it is
//!   about to touch plus one more at the evacuation cursor. Lookups read
//!   the old bucket while it is not yet evacuated.
//! - Keys that do not equal themselves (NaN-like) hash differently every
//!   time. Evacuation sends them to X or Y by the low bit of their tag and
//!   gives them a fresh tag.
//!
//! Iteration
//! - A walk starts at a random bucket and a random slot offset.
//! - A `Cursor` pins the generation(s) it walks with `Arc` clones. While a
//!   generation is pinned, evacuation copies keys instead of moving them
//!   so the cursor can re-look-up moved entries in the current table, and
//!   finished generations are retired instead of freed. They are released
//!   once no cursor refers to them. This replaces flag bits in the header:
//!   the `Arc` counts are the flags.
//! - Writes therefore need `K: Clone`. Values always move.
//!
//! Concurrency
//! - The table is not internally synchronized. An always-on write flag
//!   detects overlapping unsynchronized use and panics with a
//!   `ConcurrentAccessViolation` message.
//!
//! Notes and non-goals
//! - No persistence, no ordering guarantees, no shrinking.
//! - The bucket layout is not exposed.

mod access;
mod bucket;
mod descriptor;
mod error;
mod fast;
mod grow;
mod iter;
mod raw;
mod store;
mod table;
mod table_proptest;

// Public surface
pub use descriptor::{
    seeded_hash, EqualFn, HashFn, TypeDescriptor, MAX_INLINE_KEY_SIZE, MAX_INLINE_VALUE_SIZE,
};
pub use error::{ConcurrentAccessViolation, CreateError, DescriptorError, NotFound};
pub use fast::{FixedKey, SHORT_STRING_LEN};
pub use iter::{Cursor, Iter};
pub use store::Store;
pub use table::{Table, TableOptions, TableStats, MAX_SIZE_HINT};
