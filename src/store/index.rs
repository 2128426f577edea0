//! In-memory key → slot index

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use hashlink::LinkedHashMap;

use super::slot::Slot;

/// Mapping from key to the current live slot.
///
/// When the store is bounded the index preserves access order: the front
/// of the map is always the least recently used entry, which makes the
/// eviction victim an O(1) pop. Unbounded stores use a plain hash map.
#[derive(Debug)]
pub enum Index<K> {
    Bounded {
        map: LinkedHashMap<K, Arc<Slot>>,
        max_entries: usize,
    },
    Unbounded(HashMap<K, Arc<Slot>>),
}

impl<K: Hash + Eq + Clone> Index<K> {
    /// Create an index; `max_entries == 0` disables the bound.
    pub fn new(max_entries: usize) -> Self {
        if max_entries > 0 {
            Self::Bounded {
                map: LinkedHashMap::new(),
                max_entries,
            }
        } else {
            Self::Unbounded(HashMap::new())
        }
    }

    /// Look up the slot for `key`. In bounded mode the key is promoted
    /// to most recently used.
    pub fn get(&mut self, key: &K) -> Option<Arc<Slot>> {
        match self {
            Self::Bounded { map, .. } => {
                let slot = map.remove(key)?;
                map.insert(key.clone(), Arc::clone(&slot));
                Some(slot)
            }
            Self::Unbounded(map) => map.get(key).cloned(),
        }
    }

    /// Map `key` to `slot`, returning the displaced slot if the key was
    /// already present. Counts as an access in bounded mode.
    pub fn insert(&mut self, key: K, slot: Arc<Slot>) -> Option<Arc<Slot>> {
        match self {
            Self::Bounded { map, .. } => map.insert(key, slot),
            Self::Unbounded(map) => map.insert(key, slot),
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<Arc<Slot>> {
        match self {
            Self::Bounded { map, .. } => map.remove(key),
            Self::Unbounded(map) => map.remove(key),
        }
    }

    /// Lookup without promoting.
    pub fn contains_key(&self, key: &K) -> bool {
        match self {
            Self::Bounded { map, .. } => map.contains_key(key),
            Self::Unbounded(map) => map.contains_key(key),
        }
    }

    /// Remove and return the least recently used slot if the bound is
    /// exceeded. Never fires in unbounded mode.
    pub fn evict_excess(&mut self) -> Option<Arc<Slot>> {
        match self {
            Self::Bounded { map, max_entries } if map.len() > *max_entries => {
                map.pop_front().map(|(_, slot)| slot)
            }
            _ => None,
        }
    }

    /// Remove every expired entry and return the freed slots.
    pub fn take_expired(&mut self, now: i64) -> Vec<Arc<Slot>> {
        let expired: Vec<K> = match self {
            Self::Bounded { map, .. } => map
                .iter()
                .filter(|(_, slot)| slot.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect(),
            Self::Unbounded(map) => map
                .iter()
                .filter(|(_, slot)| slot.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect(),
        };
        expired
            .iter()
            .filter_map(|key| self.remove(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bounded { map, .. } => map.len(),
            Self::Unbounded(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys.
    pub fn keys(&self) -> Vec<K> {
        match self {
            Self::Bounded { map, .. } => map.keys().cloned().collect(),
            Self::Unbounded(map) => map.keys().cloned().collect(),
        }
    }

    /// Snapshot of all live slots.
    pub fn slots(&self) -> Vec<Arc<Slot>> {
        match self {
            Self::Bounded { map, .. } => map.values().cloned().collect(),
            Self::Unbounded(map) => map.values().cloned().collect(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Self::Bounded { map, .. } => map.clear(),
            Self::Unbounded(map) => map.clear(),
        }
    }
}
