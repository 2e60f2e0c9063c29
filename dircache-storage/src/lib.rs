//! dircache Storage - Key/Value Backends
//!
//! Defines the [`KvStore`] abstraction the caches write through, with an
//! LMDB engine for production and an in-memory engine for tests.

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbStore, LmdbSubDb};
pub use memory::{MemoryStore, MemorySubDb};
pub use traits::{KvStore, StoreIter};
