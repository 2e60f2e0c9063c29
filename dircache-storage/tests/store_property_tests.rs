//! Property-Based Tests for the Key/Value Stores
//!
//! Property: for any sequence of puts, deletes and clears, the LMDB store and
//! the in-memory store hold exactly the same pairs, in the same order.
//!
//! This validates:
//! - `put` replaces the whole value set of a key
//! - an empty `put` behaves as a delete
//! - sub-databases are isolated from one another
//! - paged iteration yields every pair exactly once

use dircache_core::StoreConfig;
use dircache_storage::{KvStore, LmdbStore, MemoryStore};
use proptest::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Put { multi: bool, key: String, values: Vec<String> },
    Delete { multi: bool, key: String },
    Clear { multi: bool },
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (any::<bool>(), arb_key(), proptest::collection::vec("[v-z]{1,3}", 0..5))
            .prop_map(|(multi, key, values)| Op::Put { multi, key, values }),
        3 => (any::<bool>(), arb_key()).prop_map(|(multi, key)| Op::Delete { multi, key }),
        1 => any::<bool>().prop_map(|multi| Op::Clear { multi }),
    ]
}

fn pairs<S: KvStore>(store: &S, handle: &S::Handle) -> Vec<(String, String)> {
    store
        .iter(handle)
        .expect("iter")
        .collect::<Result<Vec<_>, _>>()
        .expect("iterate")
}

fn run<S: KvStore>(store: &S, ops: &[Op]) -> (Vec<(String, String)>, Vec<(String, String)>) {
    let single = store.declare_subdb("single", false).expect("declare");
    let multi = store.declare_subdb("multi", true).expect("declare");

    for op in ops {
        match op {
            Op::Put { multi: m, key, values } => {
                let handle = if *m { &multi } else { &single };
                store.put(handle, key, values).expect("put");
            }
            Op::Delete { multi: m, key } => {
                let handle = if *m { &multi } else { &single };
                store.delete(handle, key).expect("delete");
            }
            Op::Clear { multi: m } => {
                let handle = if *m { &multi } else { &single };
                store.clear(handle).expect("clear");
            }
        }
    }

    (pairs(store, &single), pairs(store, &multi))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_lmdb_matches_memory_model(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let dir = TempDir::new().expect("tempdir");
        let lmdb = LmdbStore::open(&StoreConfig::new(dir.path()).with_map_size_mb(8)).expect("open");
        let memory = MemoryStore::new();

        let expected = run(&memory, &ops);
        let actual = run(&lmdb, &ops);

        prop_assert_eq!(&actual, &expected);

        let (single, multi) = actual;
        let single_handle = lmdb.declare_subdb("single", false).expect("declare");
        let multi_handle = lmdb.declare_subdb("multi", true).expect("declare");
        prop_assert_eq!(lmdb.len(&single_handle).expect("len"), single.len() as u64);
        prop_assert_eq!(lmdb.len(&multi_handle).expect("len"), multi.len() as u64);
    }

    #[test]
    fn prop_put_replaces_value_set(
        first in proptest::collection::btree_set("[a-z]{1,4}", 1..6),
        second in proptest::collection::btree_set("[a-z]{1,4}", 1..6),
    ) {
        let dir = TempDir::new().expect("tempdir");
        let store = LmdbStore::open(&StoreConfig::new(dir.path()).with_map_size_mb(8)).expect("open");
        let handle = store.declare_subdb("members", true).expect("declare");

        let first: Vec<String> = first.into_iter().collect();
        let second: Vec<String> = second.into_iter().collect();
        store.put(&handle, "k", &first).expect("put");
        store.put(&handle, "k", &second).expect("put");

        prop_assert_eq!(store.get(&handle, "k").expect("get"), Some(second));
    }
}

#[test]
fn test_iteration_spans_many_pages() {
    let dir = TempDir::new().expect("tempdir");
    let store = LmdbStore::open(&StoreConfig::new(dir.path()).with_map_size_mb(32)).expect("open");
    let handle = store.declare_subdb("big", true).expect("declare");

    for k in 0..40 {
        let values: Vec<String> = (0..60).map(|v| format!("value-{v:03}")).collect();
        store.put(&handle, &format!("key-{k:03}"), &values).expect("put");
    }

    let all = pairs(&store, &handle);
    assert_eq!(all.len(), 40 * 60);
    assert!(all.windows(2).all(|w| w[0] < w[1]), "strictly ordered, no repeats");
}
