//! dircache Test Utilities
//!
//! Shared test infrastructure for the dircache workspace:
//! - An in-memory [`Directory`] that records every search
//! - Fixtures for users and groups in the stock layout
//! - Proptest generators for entries and whole directories
//! - Tracing setup for tests

use std::sync::Mutex;

pub use dircache_core::{DirCacheError, DirCacheResult, DirectoryError, Entry, StoreConfig};
pub use dircache_index::{CacheDefinition, Directory, Registry, Shard};
pub use dircache_storage::{KvStore, LmdbStore, MemoryStore};

use dircache_index::standard::{is_group, is_user, GROUP_FILTER, USER_FILTER};
use dircache_index::MatchFn;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-writer subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// IN-MEMORY DIRECTORY
// ============================================================================

/// One recorded call to [`Directory::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    pub filter: String,
    pub attributes: Vec<String>,
}

/// Directory backed by a list of entries.
///
/// Filters are opaque, so each one the test expects must be registered with a
/// predicate standing in for it. Searching an unregistered filter fails.
/// Results carry only the requested attributes.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: Vec<Entry>,
    filters: Vec<(String, MatchFn)>,
    searches: Mutex<Vec<SearchRecord>>,
}

impl std::fmt::Debug for InMemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDirectory")
            .field("entries", &self.entries.len())
            .field("filters", &self.filters.iter().map(|(f, _)| f).collect::<Vec<_>>())
            .finish()
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory understanding the stock user and group filters.
    pub fn standard() -> Self {
        Self::new()
            .with_filter(USER_FILTER, is_user)
            .with_filter(GROUP_FILTER, is_group)
    }

    pub fn with_filter(mut self, filter: impl Into<String>, predicate: MatchFn) -> Self {
        self.filters.push((filter.into(), predicate));
        self
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.insert(entry);
        self
    }

    pub fn with_entries(mut self, entries: impl IntoIterator<Item = Entry>) -> Self {
        for entry in entries {
            self.insert(entry);
        }
        self
    }

    /// Add or replace (by DN) an entry.
    pub fn insert(&mut self, entry: Entry) {
        self.remove(&entry.dn);
        self.entries.push(entry);
    }

    /// Remove an entry by DN, returning it.
    pub fn remove(&mut self, dn: &str) -> Option<Entry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.dn.eq_ignore_ascii_case(dn))?;
        Some(self.entries.remove(pos))
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Every search issued so far, in order.
    pub fn searches(&self) -> Vec<SearchRecord> {
        self.searches
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn clear_searches(&self) {
        if let Ok(mut searches) = self.searches.lock() {
            searches.clear();
        }
    }
}

fn project(entry: &Entry, attributes: &[String]) -> Entry {
    let mut projected = Entry::new(entry.dn.clone());
    for (name, values) in &entry.attributes {
        if attributes.iter().any(|a| a.eq_ignore_ascii_case(name)) {
            projected.attributes.insert(name.clone(), values.clone());
        }
    }
    projected
}

impl Directory for InMemoryDirectory {
    fn search(&self, filter: &str, attributes: &[String]) -> Result<Vec<Entry>, DirectoryError> {
        self.searches
            .lock()
            .map_err(|_| DirectoryError::SearchFailed {
                filter: filter.to_string(),
                reason: "search log poisoned".to_string(),
            })?
            .push(SearchRecord {
                filter: filter.to_string(),
                attributes: attributes.to_vec(),
            });

        let predicate = self
            .filters
            .iter()
            .find(|(known, _)| known == filter)
            .map(|(_, predicate)| *predicate)
            .ok_or_else(|| DirectoryError::SearchFailed {
                filter: filter.to_string(),
                reason: "filter not registered".to_string(),
            })?;

        Ok(self
            .entries
            .iter()
            .filter(|entry| predicate(entry))
            .map(|entry| project(entry, attributes))
            .collect())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Users and groups laid out the way the stock caches expect.

    use super::*;
    use dircache_index::standard::{GROUP_OBJECT_TYPE, OBJECT_TYPE_ATTRIBUTE, USER_OBJECT_TYPE};

    pub const BASE_DN: &str = "dc=example,dc=org";

    pub fn user_dn(uid: &str) -> String {
        format!("uid={uid},cn=users,{BASE_DN}")
    }

    pub fn group_dn(cn: &str) -> String {
        format!("cn={cn},cn=groups,{BASE_DN}")
    }

    pub fn machine_dn(name: &str) -> String {
        format!("cn={name},cn=computers,{BASE_DN}")
    }

    /// A fresh random `entryUUID` in the directory's usual spelling.
    pub fn new_uuid() -> String {
        uuid::Uuid::new_v4().hyphenated().to_string()
    }

    pub fn user_entry(uid: &str, uuid: &str) -> Entry {
        Entry::new(user_dn(uid))
            .with_attribute(OBJECT_TYPE_ATTRIBUTE, [USER_OBJECT_TYPE])
            .with_attribute("entryUUID", [uuid])
            .with_attribute("uid", [uid])
    }

    /// Group with direct `users` and nested `groups`; `memberUid` lists the
    /// users.
    pub fn group_entry(cn: &str, uuid: &str, users: &[&str], groups: &[&str]) -> Entry {
        let members: Vec<String> = users
            .iter()
            .map(|uid| user_dn(uid))
            .chain(groups.iter().map(|g| group_dn(g)))
            .collect();
        Entry::new(group_dn(cn))
            .with_attribute(OBJECT_TYPE_ATTRIBUTE, [GROUP_OBJECT_TYPE])
            .with_attribute("entryUUID", [uuid])
            .with_attribute("cn", [cn])
            .with_attribute("uniqueMember", members)
            .with_attribute("memberUid", users.iter().copied())
    }

    /// Add a machine account to a group: listed in `uniqueMember`, and in
    /// `memberUid` with a trailing `$`.
    pub fn with_machine_member(mut group: Entry, name: &str) -> Entry {
        let mut members: Vec<String> = group.values("uniqueMember").into_iter().map(str::to_owned).collect();
        members.push(machine_dn(name));
        let mut uids: Vec<String> = group.values("memberUid").into_iter().map(str::to_owned).collect();
        uids.push(format!("{name}$"));
        group.set("uniqueMember", members);
        group.set("memberUid", uids);
        group
    }

    /// Small directory: `staff` holds alice and nests `admins`, which holds
    /// bob and a machine account.
    pub fn small_directory() -> InMemoryDirectory {
        InMemoryDirectory::standard().with_entries([
            user_entry("alice", "AAAAAAAA-0000-0000-0000-000000000001"),
            user_entry("bob", "BBBBBBBB-0000-0000-0000-000000000002"),
            group_entry("staff", "CCCCCCCC-0000-0000-0000-000000000003", &["alice"], &["admins"]),
            with_machine_member(
                group_entry("admins", "DDDDDDDD-0000-0000-0000-000000000004", &["bob"], &[]),
                "host1",
            ),
        ])
    }

    /// Registry over a fresh in-memory store with the stock caches.
    pub fn standard_registry() -> Registry<MemoryStore> {
        let mut registry = Registry::open(MemoryStore::new());
        if let Err(err) = registry.register_all(dircache_index::standard::definitions()) {
            panic!("stock caches failed to register: {err}");
        }
        registry
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for entries and directories.

    use super::fixtures::{group_entry, user_entry};
    use super::*;
    use proptest::prelude::*;

    /// Short account name.
    pub fn arb_uid() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,7}"
    }

    /// Random UUID rendered as a hyphenated string.
    pub fn arb_uuid() -> impl Strategy<Value = String> {
        any::<[u8; 16]>().prop_map(|bytes| uuid::Uuid::from_bytes(bytes).hyphenated().to_string())
    }

    /// The same text with a random mix of upper and lower case.
    pub fn arb_case_variant(text: String) -> impl Strategy<Value = String> {
        let len = text.chars().count();
        proptest::collection::vec(any::<bool>(), len).prop_map(move |upper| {
            text.chars()
                .zip(upper)
                .map(|(c, up)| if up { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
                .collect()
        })
    }

    /// Attribute values, possibly repeated and possibly blank.
    pub fn arb_values() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(prop_oneof!["[a-c]{1,3}", Just(String::new())], 0..6)
    }

    pub fn arb_user_entry() -> impl Strategy<Value = Entry> {
        (arb_uid(), arb_uuid()).prop_map(|(uid, uuid)| user_entry(&uid, &uuid))
    }

    /// A directory of users and groups with random direct and nested
    /// memberships. Nesting may form cycles.
    pub fn arb_directory() -> impl Strategy<Value = InMemoryDirectory> {
        (proptest::collection::btree_set(arb_uid(), 1..6), 1usize..5)
            .prop_flat_map(|(uids, group_count)| {
                let uids: Vec<String> = uids.into_iter().collect();
                let user_count = uids.len();
                (
                    Just(uids),
                    proptest::collection::vec(
                        proptest::collection::vec(any::<bool>(), user_count),
                        group_count,
                    ),
                    proptest::collection::vec(
                        proptest::collection::vec(any::<bool>(), group_count),
                        group_count,
                    ),
                )
            })
            .prop_map(|(uids, user_membership, group_membership)| {
                let mut directory = InMemoryDirectory::standard();
                for (i, uid) in uids.iter().enumerate() {
                    directory.insert(user_entry(uid, &format!("00000000-0000-0000-0000-{i:012}")));
                }
                for (g, users) in user_membership.iter().enumerate() {
                    let cn = format!("group{g}");
                    let members: Vec<&str> = uids
                        .iter()
                        .zip(users)
                        .filter(|(_, member)| **member)
                        .map(|(uid, _)| uid.as_str())
                        .collect();
                    let nested: Vec<String> = group_membership[g]
                        .iter()
                        .enumerate()
                        .filter(|(other, member)| **member && *other != g)
                        .map(|(other, _)| format!("group{other}"))
                        .collect();
                    let nested: Vec<&str> = nested.iter().map(String::as_str).collect();
                    directory.insert(group_entry(
                        &cn,
                        &format!("11111111-0000-0000-0000-{g:012}"),
                        &members,
                        &nested,
                    ));
                }
                directory
            })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache contents.

    use super::*;

    /// Assert the values stored under `key` in `cache`.
    pub fn assert_cache_values<S: KvStore>(
        registry: &Registry<S>,
        cache: &str,
        key: &str,
        expected: &[&str],
    ) {
        let actual = match registry.get_cache(cache).and_then(|c| c.get_values(key)) {
            Ok(values) => values,
            Err(err) => panic!("reading {cache}[{key}] failed: {err}"),
        };
        let expected: Vec<String> = expected.iter().map(|v| v.to_string()).collect();
        assert_eq!(actual, expected, "values of {cache}[{key}]");
    }

    /// Assert that `key` is absent from `cache`.
    pub fn assert_cache_missing<S: KvStore>(registry: &Registry<S>, cache: &str, key: &str) {
        match registry.get_cache(cache).and_then(|c| c.get(key)) {
            Ok(None) => {}
            Ok(Some(value)) => panic!("expected {cache}[{key}] to be absent, found {value:?}"),
            Err(err) => panic!("reading {cache}[{key}] failed: {err}"),
        }
    }
}
