//! Import hook for older on-disk layouts

use crate::error::Result;

use super::entry::StoreEntry;

/// An older store layout whose entries can be drained into this one.
///
/// Passed to `start`, which re-stores every yielded entry through the
/// regular `store` path. The importer owns backup and parsing of the
/// old layout; this crate only consumes the entries.
pub trait LegacyStore<K, V> {
    /// Drain all entries of the old layout. Called once during `start`.
    fn drain(&mut self) -> Result<Vec<StoreEntry<K, V>>>;
}
