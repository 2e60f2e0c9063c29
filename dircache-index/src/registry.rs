//! Cache registry: owns every cache, plans merged directory queries and
//! drives full rebuilds.
//!
//! # Rebuild visibility
//!
//! A rebuild clears each selected cache and repopulates it entry by entry,
//! committing as it goes. It is not atomic across caches or queries: a reader
//! running alongside may see one cache already cleared and partly refilled
//! while another is untouched. Readers needing a consistent global view must
//! wait for the rebuild to finish. A failed rebuild leaves whatever it had
//! committed in place.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dircache_core::{DirCacheError, DirCacheResult, Entry, RegistryError};
use dircache_storage::KvStore;
use serde::Serialize;

use crate::cache::{Cache, CacheDefinition};
use crate::directory::Directory;
use crate::dispatch::UpdateDispatcher;
use crate::shard::{ApplyOutcome, Shard};

/// Counters for shard applications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyStats {
    pub stored: u64,
    pub deleted: u64,
    pub skipped: u64,
}

impl ApplyStats {
    pub fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Stored { .. } => self.stored += 1,
            ApplyOutcome::Deleted { .. } => self.deleted += 1,
            ApplyOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: ApplyStats) {
        self.stored += other.stored;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }
}

/// Per-cache result of a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheRebuildStats {
    /// Pairs removed by the initial clear.
    pub cleared: u64,
    pub applied: ApplyStats,
}

/// Summary of one rebuild run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Directory searches issued.
    pub queries: usize,
    /// Entries returned across all searches.
    pub entries_seen: usize,
    pub caches: BTreeMap<String, CacheRebuildStats>,
}

impl RebuildReport {
    fn start<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            queries: 0,
            entries_seen: 0,
            caches: names
                .into_iter()
                .map(|name| (name.to_string(), CacheRebuildStats::default()))
                .collect(),
        }
    }

    /// Shard applications summed over every cache.
    pub fn totals(&self) -> ApplyStats {
        let mut totals = ApplyStats::default();
        for stats in self.caches.values() {
            totals.merge(stats.applied);
        }
        totals
    }
}

/// One merged directory query.
#[derive(Debug, Clone)]
pub struct PlannedQuery<'a> {
    pub filter: &'a str,
    /// Shards fed by this query, in registration order.
    pub shards: Vec<&'a Shard>,
    /// Union of the shards' required attributes, without `dn`.
    pub attributes: BTreeSet<String>,
}

/// Snapshot of every cache: cache name -> key -> values.
pub type Dump = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Owns every cache and the store they share.
///
/// Built once at startup: register caches with [`Registry::register`], then
/// share it by reference with whatever drives rebuilds and updates.
pub struct Registry<S: KvStore> {
    store: Arc<S>,
    caches: Vec<Cache<S>>,
}

impl<S: KvStore> Registry<S> {
    /// Create an empty registry over an opened store.
    pub fn open(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// Create an empty registry over a store shared with other components.
    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            store,
            caches: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Register a cache and declare its sub-database.
    pub fn register(&mut self, definition: CacheDefinition) -> DirCacheResult<&Cache<S>> {
        if self.cache_index(definition.name()).is_ok() {
            return Err(DirCacheError::Registry(RegistryError::DuplicateCache {
                name: definition.name().to_string(),
            }));
        }

        let cache = definition.bind(Arc::clone(&self.store))?;
        tracing::debug!(
            cache = %cache.name(),
            single_value = cache.is_single_value(),
            shards = cache.shards().len(),
            "Registered cache"
        );
        self.caches.push(cache);
        Ok(&self.caches[self.caches.len() - 1])
    }

    /// Register several caches in order.
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = CacheDefinition>,
    ) -> DirCacheResult<()> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    pub fn get_cache(&self, name: &str) -> DirCacheResult<&Cache<S>> {
        Ok(&self.caches[self.cache_index(name)?])
    }

    /// Registered caches in registration order.
    pub fn caches(&self) -> impl Iterator<Item = &Cache<S>> {
        self.caches.iter()
    }

    pub fn cache_names(&self) -> Vec<&str> {
        self.caches.iter().map(Cache::name).collect()
    }

    pub(crate) fn cache_index(&self, name: &str) -> DirCacheResult<usize> {
        self.caches
            .iter()
            .position(|cache| cache.name() == name)
            .ok_or_else(|| {
                DirCacheError::Registry(RegistryError::UnknownCache {
                    name: name.to_string(),
                })
            })
    }

    pub(crate) fn cache_at(&self, index: usize) -> &Cache<S> {
        &self.caches[index]
    }

    /// Resolve cache names to indices, all names or none.
    pub(crate) fn select(&self, names: Option<&[&str]>) -> DirCacheResult<Vec<usize>> {
        let mut selected = match names {
            None => (0..self.caches.len()).collect::<Vec<_>>(),
            Some(names) => names
                .iter()
                .map(|name| self.cache_index(name))
                .collect::<DirCacheResult<Vec<_>>>()?,
        };
        selected.sort_unstable();
        selected.dedup();
        Ok(selected)
    }

    /// Group every shard by exact source filter.
    pub fn plan_queries(&self) -> Vec<PlannedQuery<'_>> {
        let all: Vec<usize> = (0..self.caches.len()).collect();
        self.plan_for(&all)
    }

    /// Group the shards of the selected caches by exact source filter.
    ///
    /// Queries appear in the order their filter was first registered.
    fn plan_for(&self, selected: &[usize]) -> Vec<PlannedQuery<'_>> {
        let mut plan: Vec<PlannedQuery<'_>> = Vec::new();

        for &index in selected {
            for shard in self.caches[index].shards() {
                let query = match plan
                    .iter_mut()
                    .position(|q| q.filter == shard.source_filter())
                {
                    Some(pos) => &mut plan[pos],
                    None => {
                        plan.push(PlannedQuery {
                            filter: shard.source_filter(),
                            shards: Vec::new(),
                            attributes: BTreeSet::new(),
                        });
                        let last = plan.len() - 1;
                        &mut plan[last]
                    }
                };
                query.shards.push(shard);
                query.attributes.extend(shard.required_attributes());
            }
        }

        plan
    }

    /// Rebuild every cache from the directory.
    pub fn rebuild_all<D: Directory + ?Sized>(&self, directory: &D) -> DirCacheResult<RebuildReport> {
        self.rebuild(directory, None)
    }

    /// Clear and repopulate the named caches (all when `None`).
    ///
    /// Every name is validated before anything is cleared. Each merged filter
    /// is searched exactly once; every returned entry is applied to every shard
    /// subscribed to that filter.
    pub fn rebuild<D: Directory + ?Sized>(
        &self,
        directory: &D,
        names: Option<&[&str]>,
    ) -> DirCacheResult<RebuildReport> {
        let selected = self.select(names)?;
        let mut report = RebuildReport::start(selected.iter().map(|&i| self.caches[i].name()));

        tracing::info!(caches = ?report.caches.keys().collect::<Vec<_>>(), "Starting rebuild");

        for &index in &selected {
            let cache = &self.caches[index];
            let cleared = cache.clear()?;
            tracing::debug!(cache = %cache.name(), cleared, "Cleared cache");
            if let Some(stats) = report.caches.get_mut(cache.name()) {
                stats.cleared = cleared;
            }
        }

        for query in self.plan_for(&selected) {
            let attributes: Vec<String> = query.attributes.iter().cloned().collect();
            tracing::debug!(
                filter = query.filter,
                attributes = ?attributes,
                shards = query.shards.len(),
                "Searching directory"
            );

            let entries = directory.search(query.filter, &attributes)?;
            report.queries += 1;
            report.entries_seen += entries.len();

            for entry in &entries {
                for shard in &query.shards {
                    let cache = self.get_cache(shard.cache_name())?;
                    let outcome = shard.apply(entry, cache)?;
                    if let Some(stats) = report.caches.get_mut(cache.name()) {
                        stats.applied.record(&outcome);
                    }
                }
            }
        }

        report.finished_at = Utc::now();
        let totals = report.totals();
        tracing::info!(
            queries = report.queries,
            entries = report.entries_seen,
            stored = totals.stored,
            deleted = totals.deleted,
            skipped = totals.skipped,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Rebuild finished"
        );
        Ok(report)
    }

    /// Dispatcher covering every registered cache.
    pub fn dispatcher(&self) -> UpdateDispatcher<'_, S> {
        UpdateDispatcher::new(self, (0..self.caches.len()).collect())
    }

    /// Dispatcher restricted to the named caches.
    pub fn dispatcher_for(&self, names: &[&str]) -> DirCacheResult<UpdateDispatcher<'_, S>> {
        Ok(UpdateDispatcher::new(self, self.select(Some(names))?))
    }

    /// Apply a changed entry to every matching shard.
    pub fn on_change(&self, entry: &Entry) -> DirCacheResult<ApplyStats> {
        self.dispatcher().on_change(entry)
    }

    /// Remove a deleted entry from every matching shard.
    pub fn on_delete(&self, old: &Entry) -> DirCacheResult<ApplyStats> {
        self.dispatcher().on_delete(old)
    }

    /// Materialize every cache. Intended for tests and admin tooling.
    pub fn dump(&self) -> DirCacheResult<Dump> {
        let mut dump = Dump::new();
        for cache in &self.caches {
            let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for pair in cache.iter()? {
                let (key, value) = pair?;
                entries.entry(key).or_default().push(value);
            }
            dump.insert(cache.name().to_string(), entries);
        }
        Ok(dump)
    }
}
