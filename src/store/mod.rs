//! Persistent record store.
//!
//! The registry and the allocation pool persist everything through the
//! [`RecordStore`] trait: a durable mapping from section names to groups of
//! key/value strings. Each individual operation is atomic; no multi-key
//! transactions are offered, so callers serialize read-modify-write sequences
//! themselves (see [`crate::ip::locks`]). Stores shared between processes also
//! hand out a [`StoreLease`] that excludes every other handle on the same
//! backing data while a sequence runs.
//!
//! Two adapters are provided:
//!
//! - [`MemoryStore`]: process-local, used by tests and the `memory` backend
//! - [`IniFileStore`]: durable INI-style file, one `[section]` per record

pub mod ini_file;
pub mod memory;

pub use ini_file::IniFileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::path::PathBuf;

/// In-memory image of a store: section -> key -> value
pub(crate) type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// One `(section, key, value)` triple as enumerated by [`RecordStore::list_lines`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLine {
    pub section: String,
    pub key: String,
    pub value: String,
}

/// Errors raised by store adapters
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on record store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record store at line {line}: {content:?}")]
    Corrupt { line: usize, content: String },

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Anything held for the lifetime of a lease
trait Held {}
impl<T> Held for T {}

/// Exclusive access to a store across several operations. Dropping the
/// lease releases it.
#[must_use = "the lease is released as soon as it is dropped"]
pub struct StoreLease<'a> {
    _held: Option<Box<dyn Held + 'a>>,
}

impl<'a> StoreLease<'a> {
    /// Lease of a store that needs no exclusion beyond the scope locks
    pub fn none() -> Self {
        Self { _held: None }
    }

    /// Lease that keeps `held` alive until it is dropped
    pub fn holding<T: 'a>(held: T) -> Self {
        Self {
            _held: Some(Box::new(held)),
        }
    }
}

/// Durable section/key/value storage consumed by the IPAM core
pub trait RecordStore: Send + Sync {
    /// Exclude other handles on the same data until the lease is dropped.
    /// Leases may nest on one thread. Process-local stores rely on the scope
    /// locks alone.
    fn lease(&self) -> Result<StoreLease<'_>, StoreError> {
        Ok(StoreLease::none())
    }

    /// Read one value
    fn get(&self, section: &str, key: &str) -> Result<Option<String>, StoreError>;

    /// Write one value, creating the section if needed
    fn set(&self, section: &str, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a whole section; removing a missing section is not an error
    fn delete(&self, section: &str) -> Result<(), StoreError>;

    /// Remove a single key; removing a missing key is not an error
    fn remove(&self, section: &str, key: &str) -> Result<(), StoreError>;

    /// Enumerate stored triples, optionally restricted to one section
    fn list_lines(&self, section: Option<&str>) -> Result<Vec<StoreLine>, StoreError>;
}

/// Flatten sections into triples, ordered by section then key
pub(crate) fn sections_to_lines(sections: &Sections, only: Option<&str>) -> Vec<StoreLine> {
    sections
        .iter()
        .filter(|(name, _)| only.map_or(true, |wanted| wanted == name.as_str()))
        .flat_map(|(name, entries)| {
            entries.iter().map(move |(key, value)| StoreLine {
                section: name.clone(),
                key: key.clone(),
                value: value.clone(),
            })
        })
        .collect()
}

/// Apply a single-key removal, dropping the section once it is empty
pub(crate) fn remove_key(sections: &mut Sections, section: &str, key: &str) -> bool {
    let Some(entries) = sections.get_mut(section) else {
        return false;
    };
    let removed = entries.remove(key).is_some();
    if entries.is_empty() {
        sections.remove(section);
    }
    removed
}
