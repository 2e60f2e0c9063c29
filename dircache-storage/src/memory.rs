//! In-memory store with the same contract as the LMDB engine.
//!
//! Used by unit tests and by embedders that want the index without a disk
//! environment. A single `RwLock` gives the same one-writer/many-readers
//! discipline; iteration walks a snapshot taken when `iter` is called.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use dircache_core::{StoreError, StoreResult};

use super::traits::{KvStore, StoreIter};

/// Handle to one in-memory sub-database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySubDb {
    name: String,
    multi_value: bool,
}

impl MemorySubDb {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_multi_value(&self) -> bool {
        self.multi_value
    }
}

#[derive(Debug, Default)]
struct SubDbData {
    multi_value: bool,
    entries: BTreeMap<String, BTreeSet<String>>,
}

/// Volatile store backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    dbs: RwLock<BTreeMap<String, SubDbData>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all declared sub-databases.
    pub fn subdb_names(&self) -> StoreResult<Vec<String>> {
        let dbs = self.dbs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(dbs.keys().cloned().collect())
    }

    fn with_db<T>(
        &self,
        handle: &MemorySubDb,
        f: impl FnOnce(&SubDbData) -> T,
    ) -> StoreResult<T> {
        let dbs = self.dbs.read().map_err(|_| StoreError::LockPoisoned)?;
        dbs.get(&handle.name).map(f).ok_or_else(|| missing(handle))
    }

    fn with_db_mut<T>(
        &self,
        handle: &MemorySubDb,
        f: impl FnOnce(&mut SubDbData) -> T,
    ) -> StoreResult<T> {
        let mut dbs = self.dbs.write().map_err(|_| StoreError::LockPoisoned)?;
        dbs.get_mut(&handle.name)
            .map(f)
            .ok_or_else(|| missing(handle))
    }
}

fn missing(handle: &MemorySubDb) -> StoreError {
    StoreError::Incompatible {
        name: handle.name.clone(),
        reason: "sub-database was never declared".to_string(),
    }
}

impl KvStore for MemoryStore {
    type Handle = MemorySubDb;

    fn declare_subdb(&self, name: &str, multi_value: bool) -> StoreResult<MemorySubDb> {
        let mut dbs = self.dbs.write().map_err(|_| StoreError::LockPoisoned)?;
        let db = dbs.entry(name.to_string()).or_insert_with(|| SubDbData {
            multi_value,
            entries: BTreeMap::new(),
        });
        if db.multi_value != multi_value {
            return Err(StoreError::Incompatible {
                name: name.to_string(),
                reason: format!("already exists with different flags (multi_value={multi_value})"),
            });
        }
        Ok(MemorySubDb {
            name: name.to_string(),
            multi_value,
        })
    }

    fn put(&self, handle: &MemorySubDb, key: &str, values: &[String]) -> StoreResult<()> {
        self.with_db_mut(handle, |db| {
            let stored: BTreeSet<String> = if db.multi_value {
                values.iter().cloned().collect()
            } else {
                values.first().cloned().into_iter().collect()
            };
            if stored.is_empty() {
                db.entries.remove(key);
            } else {
                db.entries.insert(key.to_string(), stored);
            }
        })
    }

    fn delete(&self, handle: &MemorySubDb, key: &str) -> StoreResult<bool> {
        self.with_db_mut(handle, |db| db.entries.remove(key).is_some())
    }

    fn get(&self, handle: &MemorySubDb, key: &str) -> StoreResult<Option<Vec<String>>> {
        self.with_db(handle, |db| {
            db.entries
                .get(key)
                .map(|values| values.iter().cloned().collect())
        })
    }

    fn iter<'a>(&'a self, handle: &MemorySubDb) -> StoreResult<StoreIter<'a>> {
        let snapshot: Vec<(String, String)> = self.with_db(handle, |db| {
            db.entries
                .iter()
                .flat_map(|(key, values)| values.iter().map(move |v| (key.clone(), v.clone())))
                .collect()
        })?;
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn clear(&self, handle: &MemorySubDb) -> StoreResult<u64> {
        self.with_db_mut(handle, |db| {
            let removed = db.entries.values().map(|v| v.len() as u64).sum();
            db.entries.clear();
            removed
        })
    }

    fn len(&self, handle: &MemorySubDb) -> StoreResult<u64> {
        self.with_db(handle, |db| db.entries.values().map(|v| v.len() as u64).sum())
    }
}
