//! Store configuration

use std::path::PathBuf;

/// Directory used when no location is configured.
pub const DEFAULT_LOCATION: &str = "single-file-store";

/// Configuration of a single-file store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the data file.
    pub location: String,
    /// Maximum number of entries to keep. A positive value bounds the
    /// store and enables LRU eviction; 0 disables the bound.
    pub max_entries: usize,
    /// Forwarded to the purge scheduler driving `purge`; the store
    /// itself does not interpret it.
    pub purge_synchronously: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: String::new(),
            max_entries: 0,
            purge_synchronously: false,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_purge_synchronously(mut self, purge_synchronously: bool) -> Self {
        self.purge_synchronously = purge_synchronously;
        self
    }

    /// Path of the data file for `cache_name`:
    /// `<location>/<cache_name>.dat`, with the well-known default when
    /// the location is empty.
    pub fn data_file_path(&self, cache_name: &str) -> PathBuf {
        let location = if self.location.trim().is_empty() {
            DEFAULT_LOCATION
        } else {
            self.location.as_str()
        };
        PathBuf::from(location).join(format!("{}.dat", cache_name))
    }
}
