//! Incremental updates driven by directory change notifications.

use dircache_core::{DirCacheResult, Entry};
use dircache_storage::KvStore;

use crate::registry::{ApplyStats, Registry};
use crate::shard::{ApplyOutcome, Shard};

/// Routes single-entry changes to the shards that care about them.
///
/// A shard cares about an entry when its matcher accepts it; shards without a
/// matcher see every entry and skip those lacking their key attribute.
pub struct UpdateDispatcher<'a, S: KvStore> {
    registry: &'a Registry<S>,
    scope: Vec<usize>,
}

impl<'a, S: KvStore> UpdateDispatcher<'a, S> {
    pub(crate) fn new(registry: &'a Registry<S>, scope: Vec<usize>) -> Self {
        Self { registry, scope }
    }

    /// Names of the caches this dispatcher writes to.
    pub fn cache_names(&self) -> Vec<&'a str> {
        self.scope
            .iter()
            .map(|&index| self.registry.cache_at(index).name())
            .collect()
    }

    /// An entry was added or modified.
    pub fn on_change(&self, entry: &Entry) -> DirCacheResult<ApplyStats> {
        self.handle(Some(entry), None)
    }

    /// An entry was deleted; `old` is its last known state.
    pub fn on_delete(&self, old: &Entry) -> DirCacheResult<ApplyStats> {
        self.handle(None, Some(old))
    }

    /// Apply a transition from `old` to `new`.
    ///
    /// Keys the old state produced but the new one no longer does are
    /// deleted before the new state is written, so renames and scope changes
    /// leave nothing behind.
    pub fn handle(&self, new: Option<&Entry>, old: Option<&Entry>) -> DirCacheResult<ApplyStats> {
        let mut stats = ApplyStats::default();

        for &index in &self.scope {
            let cache = self.registry.cache_at(index);
            for shard in cache.shards() {
                for outcome in transition(shard, cache, new, old)? {
                    stats.record(&outcome);
                }
            }
        }

        tracing::debug!(
            new = new.map(|e| e.dn.as_str()),
            old = old.map(|e| e.dn.as_str()),
            stored = stats.stored,
            deleted = stats.deleted,
            "Dispatched entry update"
        );
        Ok(stats)
    }
}

fn transition<S: KvStore>(
    shard: &Shard,
    cache: &crate::cache::Cache<S>,
    new: Option<&Entry>,
    old: Option<&Entry>,
) -> DirCacheResult<Vec<ApplyOutcome>> {
    let old_key = old
        .filter(|entry| shard.matches(entry))
        .and_then(|entry| shard.extract_key(entry));
    let new = new.filter(|entry| shard.matches(entry));
    let new_key = new.and_then(|entry| shard.extract_key(entry));

    let mut outcomes = Vec::with_capacity(2);
    if let Some(old_key) = old_key {
        if new_key.as_deref() != Some(old_key.as_str()) {
            outcomes.push(cache.remove(&old_key)?);
        }
    }
    if let Some(entry) = new {
        outcomes.push(shard.apply(entry, cache)?);
    }
    Ok(outcomes)
}
