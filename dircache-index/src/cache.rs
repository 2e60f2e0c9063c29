//! Caches: named key spaces fed by one or more shards.

use std::collections::BTreeSet;
use std::sync::Arc;

use dircache_core::{DirCacheError, DirCacheResult, RegistryError};
use dircache_storage::KvStore;

use crate::shard::{ApplyOutcome, Shard};

/// What a cache lookup found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Single(String),
    /// Sorted, de-duplicated values.
    Multi(Vec<String>),
}

impl CacheValue {
    /// All values as a slice-like vector, regardless of cardinality.
    pub fn into_values(self) -> Vec<String> {
        match self {
            CacheValue::Single(value) => vec![value],
            CacheValue::Multi(values) => values,
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            CacheValue::Single(value) => Some(value),
            CacheValue::Multi(_) => None,
        }
    }
}

/// Registration-time description of a cache.
#[derive(Debug, Clone)]
pub struct CacheDefinition {
    name: String,
    single_value: bool,
    shards: Vec<Shard>,
}

impl CacheDefinition {
    pub fn new(name: impl Into<String>, single_value: bool) -> Self {
        Self {
            name: name.into(),
            single_value,
            shards: Vec::new(),
        }
    }

    /// Single-value cache: writing a key replaces its value.
    pub fn single(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    /// Multi-value cache: writing a key replaces its whole value set.
    pub fn multi(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    /// Append a shard. Shards write in registration order.
    pub fn add_shard(&mut self, shard: Shard) -> &mut Self {
        self.shards.push(shard);
        self
    }

    pub fn with_shard(mut self, shard: Shard) -> Self {
        self.add_shard(shard);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Bind the definition to a declared sub-database.
    pub(crate) fn bind<S: KvStore>(self, store: Arc<S>) -> DirCacheResult<Cache<S>> {
        if let Some(shard) = self.shards.iter().find(|s| s.cache_name() != self.name) {
            return Err(DirCacheError::Registry(RegistryError::ShardCacheMismatch {
                shard_cache: shard.cache_name().to_string(),
                cache: self.name.clone(),
            }));
        }

        let handle = store.declare_subdb(&self.name, !self.single_value)?;
        Ok(Cache {
            name: self.name,
            single_value: self.single_value,
            shards: self.shards,
            handle,
            store,
        })
    }
}

/// A registered cache bound to its sub-database.
///
/// Keys are lower-cased on every write and lookup.
pub struct Cache<S: KvStore> {
    name: String,
    single_value: bool,
    shards: Vec<Shard>,
    handle: S::Handle,
    store: Arc<S>,
}

impl<S: KvStore> std::fmt::Debug for Cache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("single_value", &self.single_value)
            .field("shards", &self.shards)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<S: KvStore> Cache<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_single_value(&self) -> bool {
        self.single_value
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> DirCacheResult<Option<CacheValue>> {
        let values = self.store.get(&self.handle, &key.to_lowercase())?;
        Ok(values.map(|mut values| {
            if self.single_value && values.len() == 1 {
                CacheValue::Single(values.remove(0))
            } else {
                CacheValue::Multi(values)
            }
        }))
    }

    /// Values stored under a key; empty when the key is absent.
    pub fn get_values(&self, key: &str) -> DirCacheResult<Vec<String>> {
        Ok(self.get(key)?.map(CacheValue::into_values).unwrap_or_default())
    }

    /// Lazily iterate over `(key, value)` pairs, one pair per stored value.
    pub fn iter(&self) -> DirCacheResult<impl Iterator<Item = DirCacheResult<(String, String)>> + '_> {
        Ok(self
            .store
            .iter(&self.handle)?
            .map(|item| item.map_err(DirCacheError::from)))
    }

    /// Remove every entry of this cache. Other caches are untouched.
    pub fn clear(&self) -> DirCacheResult<u64> {
        Ok(self.store.clear(&self.handle)?)
    }

    /// Number of stored `(key, value)` pairs.
    pub fn len(&self) -> DirCacheResult<u64> {
        Ok(self.store.len(&self.handle)?)
    }

    pub fn is_empty(&self) -> DirCacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Replace the values of `key`; zero usable values delete the key.
    pub(crate) fn store(&self, key: &str, values: Vec<String>) -> DirCacheResult<ApplyOutcome> {
        let key = key.to_lowercase();
        let mut seen = BTreeSet::new();
        let mut values: Vec<String> = values
            .into_iter()
            .filter(|value| !value.is_empty() && seen.insert(value.clone()))
            .collect();

        if values.is_empty() {
            return self.remove(&key);
        }

        if self.single_value && values.len() > 1 {
            tracing::warn!(
                cache = %self.name,
                key = %key,
                count = values.len(),
                "Single-value cache derived several values, keeping the first"
            );
            values.truncate(1);
        }

        self.store.put(&self.handle, &key, &values)?;
        tracing::trace!(cache = %self.name, key = %key, values = values.len(), "Stored");
        Ok(ApplyOutcome::Stored {
            key,
            values: values.len(),
        })
    }

    /// Delete `key`; absent keys are not an error.
    pub(crate) fn remove(&self, key: &str) -> DirCacheResult<ApplyOutcome> {
        let key = key.to_lowercase();
        self.store.delete(&self.handle, &key)?;
        tracing::trace!(cache = %self.name, key = %key, "Deleted");
        Ok(ApplyOutcome::Deleted { key })
    }
}
