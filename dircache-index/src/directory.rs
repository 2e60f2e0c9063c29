//! The directory service as seen from a rebuild.

use dircache_core::{DirectoryError, Entry};

/// Source of truth queried during a full rebuild.
///
/// Implementations receive the filter verbatim and must return every entry it
/// selects, carrying at least the requested attributes. The DN always travels
/// in [`Entry::dn`] and is never part of `attributes`.
pub trait Directory {
    fn search(&self, filter: &str, attributes: &[String]) -> Result<Vec<Entry>, DirectoryError>;
}

impl<D: Directory + ?Sized> Directory for &D {
    fn search(&self, filter: &str, attributes: &[String]) -> Result<Vec<Entry>, DirectoryError> {
        (**self).search(filter, attributes)
    }
}

impl<D: Directory + ?Sized> Directory for Box<D> {
    fn search(&self, filter: &str, attributes: &[String]) -> Result<Vec<Entry>, DirectoryError> {
        (**self).search(filter, attributes)
    }
}
