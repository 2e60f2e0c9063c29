//! Key/value store trait implemented by every storage engine.
//!
//! Cache and shard code depends only on [`KvStore`]; the LMDB and in-memory
//! engines are interchangeable behind it.

use std::fmt::Debug;
use std::sync::Arc;

use dircache_core::StoreResult;

/// Lazy sequence of `(key, value)` pairs.
///
/// Multi-value sub-databases yield one pair per stored value. The sequence is
/// finite and cannot be resumed; call [`KvStore::iter`] again to restart.
pub type StoreIter<'a> = Box<dyn Iterator<Item = StoreResult<(String, String)>> + 'a>;

/// Transactional key/value storage over named sub-databases.
///
/// # Contract
///
/// - Exactly one write transaction is in flight at a time; readers see the last
///   committed snapshot and never a partially applied `put`.
/// - Every mutating call commits its own transaction before returning.
/// - Keys and values are stored verbatim. Normalisation (lower-casing) is the
///   caller's job.
pub trait KvStore: Send + Sync {
    /// Handle to one declared sub-database.
    type Handle: Clone + Debug + Send + Sync;

    /// Create or open a named sub-database. Idempotent for the same flags.
    fn declare_subdb(&self, name: &str, multi_value: bool) -> StoreResult<Self::Handle>;

    /// Replace every value stored under `key` in one write transaction.
    ///
    /// A single-value sub-database keeps only the first value. An empty
    /// `values` slice removes the key.
    fn put(&self, handle: &Self::Handle, key: &str, values: &[String]) -> StoreResult<()>;

    /// Remove a key with all its values. Returns false if it was absent.
    fn delete(&self, handle: &Self::Handle, key: &str) -> StoreResult<bool>;

    /// Values stored under `key`, or `None` if the key is absent.
    fn get(&self, handle: &Self::Handle, key: &str) -> StoreResult<Option<Vec<String>>>;

    /// Iterate over every `(key, value)` pair of a sub-database.
    fn iter<'a>(&'a self, handle: &Self::Handle) -> StoreResult<StoreIter<'a>>;

    /// Remove all entries of one sub-database. Returns the number of pairs removed.
    fn clear(&self, handle: &Self::Handle) -> StoreResult<u64>;

    /// Number of stored `(key, value)` pairs.
    fn len(&self, handle: &Self::Handle) -> StoreResult<u64>;

    /// True if the sub-database holds no entries.
    fn is_empty(&self, handle: &Self::Handle) -> StoreResult<bool> {
        Ok(self.len(handle)? == 0)
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    type Handle = S::Handle;

    fn declare_subdb(&self, name: &str, multi_value: bool) -> StoreResult<Self::Handle> {
        (**self).declare_subdb(name, multi_value)
    }

    fn put(&self, handle: &Self::Handle, key: &str, values: &[String]) -> StoreResult<()> {
        (**self).put(handle, key, values)
    }

    fn delete(&self, handle: &Self::Handle, key: &str) -> StoreResult<bool> {
        (**self).delete(handle, key)
    }

    fn get(&self, handle: &Self::Handle, key: &str) -> StoreResult<Option<Vec<String>>> {
        (**self).get(handle, key)
    }

    fn iter<'a>(&'a self, handle: &Self::Handle) -> StoreResult<StoreIter<'a>> {
        (**self).iter(handle)
    }

    fn clear(&self, handle: &Self::Handle) -> StoreResult<u64> {
        (**self).clear(handle)
    }

    fn len(&self, handle: &Self::Handle) -> StoreResult<u64> {
        (**self).len(handle)
    }
}
