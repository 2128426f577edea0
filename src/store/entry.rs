//! Cache entries handed to and returned from the store

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A key, a value and an absolute expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry<K, V> {
    pub key: K,
    pub value: V,
    /// Expiry in ms since the epoch; -1 means the entry never expires.
    pub expiry_time: i64,
}

impl<K, V> StoreEntry<K, V> {
    /// An entry that never expires.
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            expiry_time: -1,
        }
    }

    /// An entry expiring at an absolute timestamp (ms since the epoch).
    pub fn expiring_at(key: K, value: V, expiry_time: i64) -> Self {
        Self {
            key,
            value,
            expiry_time,
        }
    }

    /// An entry expiring `lifespan` from now.
    pub fn with_lifespan(key: K, value: V, lifespan: Duration) -> Self {
        Self {
            key,
            value,
            expiry_time: now_millis() + lifespan.as_millis() as i64,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry_time > 0 && self.expiry_time < now
    }
}

/// Current wall-clock time in ms since the epoch.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
