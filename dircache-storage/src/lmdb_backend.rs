//! LMDB-backed store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! transactional key/value store with one named database per cache.
//!
//! # Layout
//!
//! - Single-value caches map to plain named databases.
//! - Multi-value caches map to `DUP_SORT` databases: each value is one
//!   duplicate of the key, kept in byte order.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions with MVCC:
//! - Read transactions for `get`, `iter` and `len`
//! - One write transaction per `put`, `delete` and `clear`
//! - Writers are serialized by LMDB's own write lock; readers never block

use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use dircache_core::{StoreConfig, StoreError, StoreResult};
use heed::types::Str;
use heed::{Database, DatabaseFlags, Env, EnvFlags, EnvOpenOptions, MdbError};

use super::traits::{KvStore, StoreIter};

/// Number of pairs fetched per read transaction while iterating.
const PAGE_SIZE: usize = 512;

/// Handle to one named LMDB database.
#[derive(Debug, Clone)]
pub struct LmdbSubDb {
    name: String,
    multi_value: bool,
    db: Database<Str, Str>,
}

impl LmdbSubDb {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_multi_value(&self) -> bool {
        self.multi_value
    }
}

/// LMDB environment holding every cache of one registry.
///
/// # Example
///
/// ```ignore
/// use dircache_core::StoreConfig;
/// use dircache_storage::{KvStore, LmdbStore};
///
/// let store = LmdbStore::open(&StoreConfig::new("/var/lib/dircache"))?;
/// let members = store.declare_subdb("groupMembers", true)?;
/// store.put(&members, "cn=admins,dc=x", &["uid=alice,dc=x".to_string()])?;
/// ```
pub struct LmdbStore {
    env: Env,
    path: PathBuf,
    read_only: bool,
}

impl LmdbStore {
    /// Open or create the environment described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if:
    /// - The configuration is invalid
    /// - The directory cannot be created
    /// - The LMDB environment cannot be opened (permissions, format mismatch)
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let open_err = |reason: String| StoreError::Open {
            path: config.path.clone(),
            reason,
        };

        config.validate().map_err(|e| open_err(e.to_string()))?;

        if !config.read_only {
            std::fs::create_dir_all(&config.path).map_err(|e| open_err(e.to_string()))?;
        }

        let mut options = EnvOpenOptions::new();
        options
            .map_size(config.map_size_bytes())
            .max_dbs(config.max_dbs);

        // SAFETY: the environment is opened once per path per process and the
        // data file is only ever modified through LMDB.
        let env = unsafe {
            if config.read_only {
                options.flags(EnvFlags::READ_ONLY);
            }
            options.open(&config.path)
        }
        .map_err(|e| open_err(e.to_string()))?;

        tracing::debug!(
            path = %config.path.display(),
            read_only = config.read_only,
            "Opened LMDB environment"
        );

        Ok(Self {
            env,
            path: config.path.clone(),
            read_only: config.read_only,
        })
    }

    /// Open an environment at `path` with default settings.
    pub fn open_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(&StoreConfig::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.read_only {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Read whole keys strictly after `after_key`, in a fresh read transaction.
    ///
    /// Stops at the first key boundary once `limit` pairs are collected, so a
    /// page never splits a key's duplicates and the next page starts past them
    /// without rescanning.
    fn read_page(
        &self,
        db: Database<Str, Str>,
        after_key: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, String)>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        let start = match after_key {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let range = (start, Bound::Unbounded);

        let mut page: Vec<(String, String)> = Vec::with_capacity(limit);
        for item in db.range(&rtxn, &range).map_err(io_err)? {
            let (key, value) = item.map_err(io_err)?;
            if page.len() >= limit && page.last().is_some_and(|(last, _)| last != key) {
                break;
            }
            page.push((key.to_owned(), value.to_owned()));
        }
        Ok(page)
    }
}

impl Drop for LmdbStore {
    fn drop(&mut self) {
        // heed keeps every opened environment in a process-wide table; take
        // this one out so the path can be reopened with other options. The
        // environment closes once `self.env`, the last handle, is dropped.
        let _closing = self.env.clone().prepare_for_closing();
        tracing::debug!(path = %self.path.display(), "Closing LMDB environment");
    }
}

impl KvStore for LmdbStore {
    type Handle = LmdbSubDb;

    fn declare_subdb(&self, name: &str, multi_value: bool) -> StoreResult<LmdbSubDb> {
        let flags = if multi_value {
            DatabaseFlags::DUP_SORT
        } else {
            DatabaseFlags::empty()
        };
        let incompatible = |e: heed::Error| match e {
            heed::Error::Mdb(MdbError::Incompatible) => StoreError::Incompatible {
                name: name.to_string(),
                reason: format!("already exists with different flags (multi_value={multi_value})"),
            },
            other => txn_err(other),
        };

        let db = if self.read_only {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let db = self
                .env
                .database_options()
                .types::<Str, Str>()
                .name(name)
                .flags(flags)
                .open(&rtxn)
                .map_err(incompatible)?
                .ok_or_else(|| StoreError::Incompatible {
                    name: name.to_string(),
                    reason: "does not exist in a read-only store".to_string(),
                })?;
            rtxn.commit().map_err(txn_err)?;
            db
        } else {
            let mut wtxn = self.env.write_txn().map_err(txn_err)?;
            let db = self
                .env
                .database_options()
                .types::<Str, Str>()
                .name(name)
                .flags(flags)
                .create(&mut wtxn)
                .map_err(incompatible)?;
            wtxn.commit().map_err(txn_err)?;
            db
        };

        Ok(LmdbSubDb {
            name: name.to_string(),
            multi_value,
            db,
        })
    }

    fn put(&self, handle: &LmdbSubDb, key: &str, values: &[String]) -> StoreResult<()> {
        self.ensure_writable()?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        handle.db.delete(&mut wtxn, key).map_err(io_err)?;

        if handle.multi_value {
            let distinct: BTreeSet<&str> = values.iter().map(String::as_str).collect();
            for value in distinct {
                handle.db.put(&mut wtxn, key, value).map_err(io_err)?;
            }
        } else if let Some(value) = values.first() {
            handle.db.put(&mut wtxn, key, value).map_err(io_err)?;
        }

        wtxn.commit().map_err(txn_err)
    }

    fn delete(&self, handle: &LmdbSubDb, key: &str) -> StoreResult<bool> {
        self.ensure_writable()?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = handle.db.delete(&mut wtxn, key).map_err(io_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn get(&self, handle: &LmdbSubDb, key: &str) -> StoreResult<Option<Vec<String>>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;

        if !handle.multi_value {
            let value = handle.db.get(&rtxn, key).map_err(io_err)?;
            return Ok(value.map(|v| vec![v.to_owned()]));
        }

        let range = (Bound::Included(key), Bound::Included(key));
        let mut values = Vec::new();
        for item in handle.db.range(&rtxn, &range).map_err(io_err)? {
            let (_, value) = item.map_err(io_err)?;
            values.push(value.to_owned());
        }

        if values.is_empty() {
            Ok(None)
        } else {
            Ok(Some(values))
        }
    }

    fn iter<'a>(&'a self, handle: &LmdbSubDb) -> StoreResult<StoreIter<'a>> {
        Ok(Box::new(PagedIter {
            store: self,
            db: handle.db,
            page: Vec::new().into_iter(),
            last_key: None,
            exhausted: false,
        }))
    }

    fn clear(&self, handle: &LmdbSubDb) -> StoreResult<u64> {
        self.ensure_writable()?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let removed = handle.db.len(&wtxn).map_err(io_err)?;
        handle.db.clear(&mut wtxn).map_err(io_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    fn len(&self, handle: &LmdbSubDb) -> StoreResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        handle.db.len(&rtxn).map_err(io_err)
    }
}

/// Iterator that refills from a new read transaction about every
/// [`PAGE_SIZE`] pairs, always at a key boundary.
///
/// Each page sees the latest committed snapshot, so a long iteration running
/// next to a writer may observe writes committed between pages.
struct PagedIter<'a> {
    store: &'a LmdbStore,
    db: Database<Str, Str>,
    page: std::vec::IntoIter<(String, String)>,
    last_key: Option<String>,
    exhausted: bool,
}

impl Iterator for PagedIter<'_> {
    type Item = StoreResult<(String, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pair) = self.page.next() {
            return Some(Ok(pair));
        }
        if self.exhausted {
            return None;
        }

        match self.store.read_page(self.db, self.last_key.as_deref(), PAGE_SIZE) {
            Ok(page) => {
                if page.len() < PAGE_SIZE {
                    self.exhausted = true;
                }
                self.last_key = page.last().map(|(key, _)| key.clone());
                self.page = page.into_iter();
                self.page.next().map(Ok)
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}

fn txn_err(e: heed::Error) -> StoreError {
    StoreError::Transaction {
        reason: e.to_string(),
    }
}

fn io_err(e: heed::Error) -> StoreError {
    StoreError::Io {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig::new(temp_dir.path()).with_map_size_mb(10);
        let store = LmdbStore::open(&config).expect("store creation should succeed");
        (store, temp_dir)
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_single_value_put_and_get() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("entryUUID", false).expect("declare");

        store
            .put(&db, "ab12", &strings(&["uid=foo,dc=x"]))
            .expect("put should succeed");
        assert_eq!(
            store.get(&db, "ab12").expect("get"),
            Some(strings(&["uid=foo,dc=x"]))
        );

        store
            .put(&db, "ab12", &strings(&["uid=bar,dc=x"]))
            .expect("put should succeed");
        assert_eq!(
            store.get(&db, "ab12").expect("get"),
            Some(strings(&["uid=bar,dc=x"]))
        );
    }

    #[test]
    fn test_single_value_keeps_first_value() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("single", false).expect("declare");

        store.put(&db, "k", &strings(&["a", "b"])).expect("put");
        assert_eq!(store.get(&db, "k").expect("get"), Some(strings(&["a"])));
    }

    #[test]
    fn test_multi_value_replace_not_merge() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("members", true).expect("declare");

        store.put(&db, "k", &strings(&["a", "b"])).expect("put");
        store.put(&db, "k", &strings(&["c"])).expect("put");

        assert_eq!(store.get(&db, "k").expect("get"), Some(strings(&["c"])));
    }

    #[test]
    fn test_multi_value_sorted_and_isolated_per_key() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("members", true).expect("declare");

        store.put(&db, "g1", &strings(&["z", "a", "m"])).expect("put");
        store.put(&db, "g2", &strings(&["x"])).expect("put");

        assert_eq!(
            store.get(&db, "g1").expect("get"),
            Some(strings(&["a", "m", "z"]))
        );
        assert_eq!(store.get(&db, "g2").expect("get"), Some(strings(&["x"])));
        assert_eq!(store.len(&db).expect("len"), 4);
    }

    #[test]
    fn test_put_empty_removes_key() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("members", true).expect("declare");

        store.put(&db, "k", &strings(&["a"])).expect("put");
        store.put(&db, "k", &[]).expect("put");
        assert_eq!(store.get(&db, "k").expect("get"), None);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("entryUUID", false).expect("declare");

        assert!(!store.delete(&db, "missing").expect("delete"));
        store.put(&db, "k", &strings(&["v"])).expect("put");
        assert!(store.delete(&db, "k").expect("delete"));
        assert_eq!(store.get(&db, "k").expect("get"), None);
    }

    #[test]
    fn test_clear_only_affects_one_subdb() {
        let (store, _temp_dir) = create_test_store();
        let a = store.declare_subdb("a", true).expect("declare");
        let b = store.declare_subdb("b", false).expect("declare");

        store.put(&a, "k1", &strings(&["x", "y"])).expect("put");
        store.put(&b, "k2", &strings(&["z"])).expect("put");

        assert_eq!(store.clear(&a).expect("clear"), 2);
        assert!(store.is_empty(&a).expect("is_empty"));
        assert_eq!(store.get(&b, "k2").expect("get"), Some(strings(&["z"])));
    }

    #[test]
    fn test_declare_subdb_idempotent() {
        let (store, _temp_dir) = create_test_store();
        let first = store.declare_subdb("members", true).expect("declare");
        store.put(&first, "k", &strings(&["v"])).expect("put");

        let second = store.declare_subdb("members", true).expect("declare again");
        assert_eq!(store.get(&second, "k").expect("get"), Some(strings(&["v"])));
    }

    #[test]
    fn test_iter_spans_multiple_pages() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("members", true).expect("declare");

        // Three values per key so page boundaries fall inside duplicate runs.
        let keys = PAGE_SIZE;
        for i in 0..keys {
            let key = format!("key{i:05}");
            store
                .put(&db, &key, &strings(&["v1", "v2", "v3"]))
                .expect("put");
        }

        let pairs: Vec<(String, String)> = store
            .iter(&db)
            .expect("iter")
            .collect::<StoreResult<_>>()
            .expect("iteration should succeed");

        assert_eq!(pairs.len(), keys * 3);
        assert_eq!(pairs[0], ("key00000".to_string(), "v1".to_string()));
        assert_eq!(pairs[4], ("key00001".to_string(), "v2".to_string()));
        let mut sorted = pairs.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, pairs, "pairs should be unique and ordered");
    }

    #[test]
    fn test_iter_is_restartable() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("entryUUID", false).expect("declare");
        store.put(&db, "a", &strings(&["1"])).expect("put");
        store.put(&db, "b", &strings(&["2"])).expect("put");

        let first: Vec<_> = store.iter(&db).expect("iter").take(1).collect();
        assert_eq!(first.len(), 1);

        let all: Vec<_> = store
            .iter(&db)
            .expect("iter")
            .collect::<StoreResult<Vec<_>>>()
            .expect("iter");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_reopen_persists_data() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig::new(temp_dir.path()).with_map_size_mb(10);

        {
            let store = LmdbStore::open(&config).expect("open");
            let db = store.declare_subdb("entryUUID", false).expect("declare");
            store.put(&db, "ab12", &strings(&["uid=foo"])).expect("put");
        }

        let store = LmdbStore::open(&config).expect("reopen");
        let db = store.declare_subdb("entryUUID", false).expect("declare");
        assert_eq!(store.get(&db, "ab12").expect("get"), Some(strings(&["uid=foo"])));
    }

    #[test]
    fn test_read_only_store() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StoreConfig::new(temp_dir.path()).with_map_size_mb(10);

        {
            let store = LmdbStore::open(&config).expect("open");
            let db = store.declare_subdb("members", true).expect("declare");
            store.put(&db, "g", &strings(&["a", "b"])).expect("put");
        }

        let store = LmdbStore::open(&config.clone().read_only()).expect("open read-only");
        assert!(store.is_read_only());

        let db = store.declare_subdb("members", true).expect("open existing");
        assert_eq!(store.get(&db, "g").expect("get"), Some(strings(&["a", "b"])));
        assert_eq!(
            store.put(&db, "g", &strings(&["c"])),
            Err(StoreError::ReadOnly)
        );
        assert!(matches!(
            store.declare_subdb("missing", false),
            Err(StoreError::Incompatible { .. })
        ));
    }

    #[test]
    fn test_reopen_with_other_options_after_drop() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");

        {
            let store = LmdbStore::open_path(temp_dir.path()).expect("open with defaults");
            let db = store.declare_subdb("members", true).expect("declare");
            store.put(&db, "g", &strings(&["a"])).expect("put");
        }

        let resized = StoreConfig::new(temp_dir.path()).with_map_size_mb(20);
        {
            let store = LmdbStore::open(&resized).expect("reopen with another map size");
            let db = store.declare_subdb("members", true).expect("declare");
            store.put(&db, "h", &strings(&["b"])).expect("put");
        }

        let store = LmdbStore::open(&resized.read_only()).expect("reopen read-only");
        let db = store.declare_subdb("members", true).expect("open existing");
        assert_eq!(store.get(&db, "g").expect("get"), Some(strings(&["a"])));
        assert_eq!(store.get(&db, "h").expect("get"), Some(strings(&["b"])));
    }

    #[test]
    fn test_iter_key_with_more_duplicates_than_a_page() {
        let (store, _temp_dir) = create_test_store();
        let db = store.declare_subdb("members", true).expect("declare");

        let many: Vec<String> = (0..PAGE_SIZE * 3 + 7).map(|i| format!("v{i:05}")).collect();
        store.put(&db, "a", &strings(&["first"])).expect("put");
        store.put(&db, "big", &many).expect("put");
        store.put(&db, "c", &strings(&["last"])).expect("put");

        let pairs: Vec<(String, String)> = store
            .iter(&db)
            .expect("iter")
            .collect::<StoreResult<_>>()
            .expect("iteration should succeed");

        assert_eq!(pairs.len(), many.len() + 2);
        assert_eq!(pairs[0], ("a".to_string(), "first".to_string()));
        assert_eq!(pairs[1], ("big".to_string(), "v00000".to_string()));
        assert_eq!(pairs[pairs.len() - 1], ("c".to_string(), "last".to_string()));
        let mut sorted = pairs.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, pairs);
    }

    #[test]
    fn test_oversized_key_or_value_is_io_error() {
        let (store, _temp_dir) = create_test_store();
        let members = store.declare_subdb("members", true).expect("declare");
        let long = "x".repeat(5000);

        assert!(matches!(
            store.put(&members, &long, &strings(&["v"])),
            Err(StoreError::Io { .. })
        ));
        assert!(matches!(
            store.put(&members, "k", &[long.clone()]),
            Err(StoreError::Io { .. })
        ));
        assert_eq!(store.get(&members, "k").expect("get"), None);

        // Plain databases accept long values.
        let single = store.declare_subdb("entryUUID", false).expect("declare");
        store.put(&single, "k", &[long.clone()]).expect("put");
        assert_eq!(store.get(&single, "k").expect("get"), Some(vec![long]));
    }

    #[test]
    fn test_open_invalid_path_fails() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let file_path = temp_dir.path().join("not-a-dir");
        std::fs::write(&file_path, b"x").expect("write file");

        let result = LmdbStore::open(&StoreConfig::new(&file_path));
        assert!(matches!(result, Err(StoreError::Open { .. })));
    }
}
