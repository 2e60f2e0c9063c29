//! dircache Core - Entry Types
//!
//! Plain data shared by every other crate: the directory [`Entry`] handed to
//! shards, DN helpers, the error taxonomy and the store configuration.
//! Nothing in here performs I/O.

pub mod config;
pub mod dn;
pub mod error;

pub use config::StoreConfig;
pub use error::{
    ConfigError, DirCacheError, DirCacheResult, DirectoryError, RegistryError, StoreError,
    StoreResult,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pseudo-attribute naming the entry's own distinguished name.
///
/// Never requested from the directory: the DN always travels in the entry
/// envelope.
pub const DN_ATTRIBUTE: &str = "dn";

/// Attribute used as cache key when a shard does not name one.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "entryUUID";

/// True if `attribute` is the `dn` pseudo-attribute (case-insensitive).
pub fn is_dn_attribute(attribute: &str) -> bool {
    attribute.eq_ignore_ascii_case(DN_ATTRIBUTE)
}

// ============================================================================
// ENTRY
// ============================================================================

/// One directory object: a DN plus its attributes.
///
/// Attribute names keep the spelling the directory returned; lookups through
/// [`Entry::values`] are case-insensitive as in LDAP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub dn: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Build an entry from raw attribute values as returned on the wire.
    ///
    /// Values are decoded as UTF-8; invalid sequences are replaced.
    pub fn from_raw<I, K, V>(dn: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_ref()).into_owned())
                    .collect();
                (name.into(), values)
            })
            .collect();
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Builder-style attribute setter, replacing any previous values.
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set(name, values);
        self
    }

    /// Replace all values of an attribute.
    pub fn set<I, V>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        if let Some(existing) = self.attribute_name(&name).map(str::to_owned) {
            self.attributes.remove(&existing);
        }
        self.attributes
            .insert(name, values.into_iter().map(Into::into).collect());
    }

    /// Values of an attribute; empty when absent.
    ///
    /// The `dn` pseudo-attribute resolves to the entry's own DN.
    pub fn values(&self, name: &str) -> Vec<&str> {
        if is_dn_attribute(name) {
            return vec![self.dn.as_str()];
        }
        match self.attribute_name(name) {
            Some(key) => self.attributes[key].iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    /// First value of an attribute, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).into_iter().next()
    }

    /// True if the attribute carries `value` (case-insensitive comparison).
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.values(name)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value))
    }

    fn attribute_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.attributes.get_key_value(name) {
            return Some(key.as_str());
        }
        self.attributes
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}
