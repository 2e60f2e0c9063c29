//! dircache Index - Shards, Caches and the Registry
//!
//! Turns directory entries into denormalized key/value indices:
//!
//! - [`Shard`]: one extraction rule (key attribute, value derivation, filter)
//! - [`Cache`]: a named key space fed by one or more shards
//! - [`Registry`]: owns the caches, merges their queries and drives rebuilds
//! - [`UpdateDispatcher`]: routes single-entry change notifications
//!
//! The directory itself is reached only through the [`Directory`] trait.

pub mod cache;
pub mod directory;
pub mod dispatch;
pub mod lookup;
pub mod nested;
pub mod registry;
pub mod shard;
pub mod standard;

pub use cache::{Cache, CacheDefinition, CacheValue};
pub use directory::Directory;
pub use dispatch::UpdateDispatcher;
pub use registry::{ApplyStats, CacheRebuildStats, Dump, PlannedQuery, RebuildReport, Registry};
pub use shard::{ApplyOutcome, DeriveFn, MatchFn, Shard};
