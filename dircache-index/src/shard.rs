//! Shards: single extraction rules from directory entries to cache entries.

use std::collections::BTreeSet;
use std::fmt;

use dircache_core::{is_dn_attribute, DirCacheResult, Entry, DEFAULT_KEY_ATTRIBUTE};
use dircache_storage::KvStore;

use crate::cache::Cache;

/// Computes the values a shard emits for one entry.
pub type DeriveFn = fn(&Shard, &Entry) -> Vec<String>;

/// Decides whether an entry is in a shard's scope during incremental updates.
pub type MatchFn = fn(&Entry) -> bool;

/// What a single `apply` or `remove` did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The key now holds `values` values.
    Stored { key: String, values: usize },
    /// The key was removed (or was already absent).
    Deleted { key: String },
    /// The entry carries no key for this shard.
    Skipped,
}

/// One extraction rule feeding a cache.
///
/// Immutable once built. The source filter is opaque: it is only compared for
/// equality when planning queries and handed verbatim to the directory.
#[derive(Clone)]
pub struct Shard {
    cache_name: String,
    source_filter: String,
    key_attribute: String,
    value_attribute: String,
    extra_attributes: Vec<String>,
    derive: DeriveFn,
    matcher: Option<MatchFn>,
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("cache_name", &self.cache_name)
            .field("source_filter", &self.source_filter)
            .field("key_attribute", &self.key_attribute)
            .field("value_attribute", &self.value_attribute)
            .field("extra_attributes", &self.extra_attributes)
            .field("has_matcher", &self.matcher.is_some())
            .finish()
    }
}

impl Shard {
    /// Shard keyed by `entryUUID` that emits `value_attribute` verbatim.
    pub fn new(
        cache_name: impl Into<String>,
        source_filter: impl Into<String>,
        value_attribute: impl Into<String>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            source_filter: source_filter.into(),
            key_attribute: DEFAULT_KEY_ATTRIBUTE.to_string(),
            value_attribute: value_attribute.into(),
            extra_attributes: Vec::new(),
            derive: derive::attribute_values,
            matcher: None,
        }
    }

    /// Use another attribute (or `dn`) as the cache key.
    pub fn with_key(mut self, key_attribute: impl Into<String>) -> Self {
        self.key_attribute = key_attribute.into();
        self
    }

    /// Attributes the derivation reads besides key and value.
    pub fn with_extra<I, A>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.extra_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Replace the default "read `value_attribute`" derivation.
    pub fn with_derive(mut self, derive: DeriveFn) -> Self {
        self.derive = derive;
        self
    }

    /// Restrict incremental updates to entries accepted by `matcher`.
    pub fn with_matcher(mut self, matcher: MatchFn) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn source_filter(&self) -> &str {
        &self.source_filter
    }

    pub fn key_attribute(&self) -> &str {
        &self.key_attribute
    }

    pub fn value_attribute(&self) -> &str {
        &self.value_attribute
    }

    pub fn extra_attributes(&self) -> &[String] {
        &self.extra_attributes
    }

    /// Attributes to request from the directory: key, value and extras,
    /// without the `dn` pseudo-attribute.
    pub fn required_attributes(&self) -> BTreeSet<String> {
        std::iter::once(&self.key_attribute)
            .chain(std::iter::once(&self.value_attribute))
            .chain(self.extra_attributes.iter())
            .filter(|attr| !is_dn_attribute(attr))
            .cloned()
            .collect()
    }

    /// True if the entry is in scope for this shard.
    ///
    /// Without a matcher every entry is accepted; entries that lack the key
    /// attribute then fall through as [`ApplyOutcome::Skipped`].
    pub fn matches(&self, entry: &Entry) -> bool {
        self.matcher.map_or(true, |matcher| matcher(entry))
    }

    /// Lower-cased first value of the key attribute, or `None` to skip.
    pub fn extract_key(&self, entry: &Entry) -> Option<String> {
        entry
            .first(&self.key_attribute)
            .filter(|key| !key.is_empty())
            .map(str::to_lowercase)
    }

    /// Values this shard emits for the entry.
    pub fn extract_values(&self, entry: &Entry) -> Vec<String> {
        (self.derive)(self, entry)
    }

    /// Write this shard's view of `entry` into `cache`.
    ///
    /// A missing key is a silent skip. Zero derived values delete the key.
    pub fn apply<S: KvStore>(&self, entry: &Entry, cache: &Cache<S>) -> DirCacheResult<ApplyOutcome> {
        let Some(key) = self.extract_key(entry) else {
            tracing::trace!(
                cache = %self.cache_name,
                dn = %entry.dn,
                key_attribute = %self.key_attribute,
                "Skipping entry without key"
            );
            return Ok(ApplyOutcome::Skipped);
        };
        let values = self.extract_values(entry);
        cache.store(&key, values)
    }

    /// Remove the key `entry` maps to from `cache`.
    pub fn remove<S: KvStore>(&self, entry: &Entry, cache: &Cache<S>) -> DirCacheResult<ApplyOutcome> {
        match self.extract_key(entry) {
            Some(key) => cache.remove(&key),
            None => Ok(ApplyOutcome::Skipped),
        }
    }
}

/// Stock derivations.
pub mod derive {
    use super::*;

    /// Values of the shard's value attribute, verbatim.
    pub fn attribute_values(shard: &Shard, entry: &Entry) -> Vec<String> {
        entry
            .values(shard.value_attribute())
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Values of the shard's value attribute, lower-cased.
    pub fn lowercased_values(shard: &Shard, entry: &Entry) -> Vec<String> {
        entry
            .values(shard.value_attribute())
            .into_iter()
            .map(str::to_lowercase)
            .collect()
    }
}
