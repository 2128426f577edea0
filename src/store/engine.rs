//! Store engine tying the index, allocator and data file together
//!
//! Lock discipline: there are two monitors, the index mutex and the
//! allocator mutex (free list + append pointer). Where both are needed
//! the index mutex is acquired first; no path takes them in the other
//! order. Slot reader locks are only ever acquired while holding the
//! index monitor, which is what makes the free list safe: a slot can
//! reach the free list only after leaving the index, so no new reader
//! can lock it there, and existing readers drain in finite time.

use std::collections::HashSet;
use std::hash::Hash;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

use super::config::StoreConfig;
use super::data_file::{encode_record, DataFile, RecordHeader};
use super::entry::{now_millis, StoreEntry};
use super::free_list::Allocator;
use super::index::Index;
use super::legacy::LegacyStore;
use super::marshal::Marshaller;
use super::slot::{Slot, HEADER_SIZE};

/// A persistent cache store keeping all values in one data file, with
/// keys and file positions held in memory.
///
/// Fully thread safe; loads and stores of distinct entries proceed
/// concurrently. The in-memory index is rebuilt from the file on
/// `start`, so no separate index persistence is needed.
pub struct SingleFileStore<K, V> {
    cache_name: String,
    config: StoreConfig,
    marshaller: Box<dyn Marshaller<K, V>>,
    state: RwLock<Option<StoreState<K>>>,
}

struct StoreState<K> {
    file: DataFile,
    index: Mutex<Index<K>>,
    alloc: Mutex<Allocator>,
}

/// Counters describing the current shape of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Live entries in the index.
    pub entries: usize,
    /// Dead slots awaiting reuse.
    pub free_slots: usize,
    /// End-of-data position, i.e. the next append offset.
    pub file_end: u64,
}

impl<K, V> SingleFileStore<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a stopped store. `start` must be called before use.
    pub fn new(
        cache_name: impl Into<String>,
        config: StoreConfig,
        marshaller: Box<dyn Marshaller<K, V>>,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            config,
            marshaller,
            state: RwLock::new(None),
        }
    }

    /// Open the data file and rebuild the in-memory index from it.
    ///
    /// A file starting with the format magic is walked record by record;
    /// anything else (including an empty file) is reset to a fresh
    /// header. When a `legacy` importer is given, the file is reset
    /// first and every imported entry is re-stored through the regular
    /// `store` path.
    pub fn start(&self, legacy: Option<&mut dyn LegacyStore<K, V>>) -> Result<()> {
        let mut guard = self.state.write().unwrap();
        if guard.is_some() {
            debug!(cache = %self.cache_name, "Store already started");
            return Ok(());
        }

        let path = self.config.data_file_path(&self.cache_name);
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .map_err(|_| StoreError::DirectoryCannotBeCreated(dir.display().to_string()))?;
            }
        }
        let file = DataFile::open(&path)?;
        info!(path = ?path, "Opened data file");

        let state = guard.insert(StoreState {
            file,
            index: Mutex::new(Index::new(self.config.max_entries)),
            alloc: Mutex::new(Allocator::new()),
        });
        let state = &*state;

        if let Some(importer) = legacy {
            // the old layout replaces whatever the data file held
            self.clear_state(state)?;
            let entries = importer
                .drain()
                .map_err(|e| StoreError::LegacyUpgrade(e.to_string()))?;
            let count = entries.len();
            for entry in entries {
                self.store_in_state(state, entry)?;
            }
            info!(entries = count, "Imported legacy store");
        }

        if state.file.has_magic()? {
            self.rebuild_index(state)?;
        } else {
            self.clear_state(state)?;
        }
        Ok(())
    }

    /// Close the data file and drop the in-memory index and free list.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self.state.write().unwrap();
        if let Some(state) = guard.take() {
            state.file.sync()?;
            info!(cache = %self.cache_name, "Stopped store");
        }
        Ok(())
    }

    /// Write an entry, replacing any previous mapping for its key.
    pub fn store(&self, entry: StoreEntry<K, V>) -> Result<()> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;
        self.store_in_state(state, entry)
    }

    /// Load the entry for `key`, or `None` if absent or expired. An
    /// expired entry is removed and its slot freed.
    pub fn load(&self, key: &K) -> Result<Option<StoreEntry<K, V>>> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;
        self.load_in_state(state, key)
    }

    /// Load every live entry.
    pub fn load_all(&self) -> Result<Vec<StoreEntry<K, V>>> {
        self.load_some(usize::MAX)
    }

    /// Load up to `n` live entries. The sample is unordered.
    pub fn load_some(&self, n: usize) -> Result<Vec<StoreEntry<K, V>>> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;

        let keys = state.index.lock().unwrap().keys();
        let mut entries = Vec::new();
        for key in keys {
            if let Some(entry) = self.load_in_state(state, &key)? {
                entries.push(entry);
                if entries.len() >= n {
                    break;
                }
            }
        }
        Ok(entries)
    }

    /// Snapshot of all keys, minus `exclude` when given.
    pub fn load_all_keys(&self, exclude: Option<&HashSet<K>>) -> Result<HashSet<K>> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;

        let mut keys: HashSet<K> = state.index.lock().unwrap().keys().into_iter().collect();
        if let Some(exclude) = exclude {
            for key in exclude {
                keys.remove(key);
            }
        }
        Ok(keys)
    }

    /// Whether `key` is currently mapped. Consults only the index; no
    /// I/O and no expiry check.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;
        let found = state.index.lock().unwrap().contains_key(key);
        Ok(found)
    }

    /// Remove the mapping for `key`, freeing its slot. Returns whether
    /// a mapping existed.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;

        let removed = state.index.lock().unwrap().remove(key);
        match removed {
            Some(slot) => {
                self.free_slot(state, slot)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop every entry and truncate the file back to a bare magic
    /// header. Blocks until all in-flight readers have finished.
    pub fn clear(&self) -> Result<()> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;
        self.clear_state(state)
    }

    /// Remove and free every expired entry.
    pub fn purge(&self) -> Result<()> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;
        self.purge_internal(state)
    }

    /// Streaming import is not supported by this store.
    pub fn from_stream(&self, _input: &mut dyn Read) -> Result<()> {
        Err(StoreError::Unsupported("from_stream"))
    }

    /// Streaming export is not supported by this store.
    pub fn to_stream(&self, _output: &mut dyn Write) -> Result<()> {
        Err(StoreError::Unsupported("to_stream"))
    }

    /// Current entry, free-slot and file-end counters.
    pub fn stats(&self) -> Result<StoreStats> {
        let guard = self.state.read().unwrap();
        let state = guard.as_ref().ok_or(StoreError::NotStarted)?;

        let entries = state.index.lock().unwrap().len();
        let alloc = state.alloc.lock().unwrap();
        Ok(StoreStats {
            entries,
            free_slots: alloc.free_list().len(),
            file_end: alloc.file_pos(),
        })
    }

    fn store_in_state(&self, state: &StoreState<K>, entry: StoreEntry<K, V>) -> Result<()> {
        let key_bytes = self.marshaller.key_to_bytes(&entry.key)?;
        let data = self.marshaller.value_to_bytes(&entry.value)?;

        let total = HEADER_SIZE as usize + key_bytes.len() + data.len();
        let len = u32::try_from(total).map_err(|_| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "record too large for the on-disk format",
            ))
        })?;

        let (offset, size) = state.alloc.lock().unwrap().allocate(len);
        let slot = Arc::new(Slot::record(
            offset,
            size,
            key_bytes.len() as u32,
            data.len() as u32,
            entry.expiry_time,
        ));

        // the record must be fully on disk before the index points at it
        let record = encode_record(&slot, &key_bytes, &data);
        if let Err(e) = state.file.write_all_at(&record, offset) {
            // hand the region back so it is not leaked
            self.free_slot(state, slot)?;
            return Err(e.into());
        }

        let displaced = {
            let mut index = state.index.lock().unwrap();
            let mut dead = index.insert(entry.key, slot);
            if dead.is_none() {
                dead = index.evict_excess();
                if dead.is_some() {
                    debug!(cache = %self.cache_name, "Evicted least recently used entry");
                }
            }
            dead
        };
        if let Some(dead) = displaced {
            self.free_slot(state, dead)?;
        }
        Ok(())
    }

    fn load_in_state(&self, state: &StoreState<K>, key: &K) -> Result<Option<StoreEntry<K, V>>> {
        let now = now_millis();
        let (slot, expired) = {
            let mut index = state.index.lock().unwrap();
            let slot = match index.get(key) {
                Some(slot) => slot,
                None => return Ok(None),
            };
            let expired = slot.is_expired(now);
            if expired {
                index.remove(key);
            }
            // lock the slot for reading before the index monitor is
            // released, while it is still reachable
            slot.lock();
            (slot, expired)
        };

        if expired {
            let freed = self.free_slot(state, Arc::clone(&slot));
            slot.unlock();
            freed?;
            return Ok(None);
        }

        let mut data = vec![0u8; slot.data_len as usize];
        let read = state.file.read_exact_at(
            &mut data,
            slot.offset + u64::from(HEADER_SIZE) + u64::from(slot.key_len),
        );
        // deserialization does not need the slot lock
        slot.unlock();
        read?;

        let value = self.marshaller.value_from_bytes(&data)?;
        Ok(Some(StoreEntry {
            key: key.clone(),
            value,
            expiry_time: slot.expiry_time,
        }))
    }

    /// Invalidate a slot on disk and hand it to the free list.
    fn free_slot(&self, state: &StoreState<K>, slot: Arc<Slot>) -> Result<()> {
        state.file.mark_free(slot.offset)?;
        state.alloc.lock().unwrap().release(slot);
        Ok(())
    }

    fn clear_state(&self, state: &StoreState<K>) -> Result<()> {
        let mut index = state.index.lock().unwrap();
        let mut alloc = state.alloc.lock().unwrap();

        // wait until all readers are done with their slots
        for slot in index.slots() {
            slot.wait_unlocked();
        }
        for slot in alloc.free_list().iter() {
            slot.wait_unlocked();
        }

        index.clear();
        alloc.clear();

        state.file.truncate()?;
        state.file.write_magic()?;
        info!(cache = %self.cache_name, "Cleared store");
        Ok(())
    }

    fn purge_internal(&self, state: &StoreState<K>) -> Result<()> {
        let now = now_millis();
        let mut index = state.index.lock().unwrap();
        let expired = index.take_expired(now);
        let count = expired.len();
        for slot in expired {
            self.free_slot(state, slot)?;
        }
        if count > 0 {
            debug!(cache = %self.cache_name, purged = count, "Purged expired entries");
        }
        Ok(())
    }

    fn rebuild_index(&self, state: &StoreState<K>) -> Result<()> {
        let mut index = state.index.lock().unwrap();
        let mut alloc = state.alloc.lock().unwrap();

        let mut header = [0u8; HEADER_SIZE as usize];
        loop {
            let offset = alloc.file_pos();
            let read = state.file.read_full_at(&mut header, offset)?;
            if read < header.len() {
                // end of file, possibly mid-header
                break;
            }
            let rec = RecordHeader::decode(&header);
            if rec.size < HEADER_SIZE {
                warn!(
                    offset,
                    size = rec.size,
                    "Record header smaller than minimum, halting index rebuild"
                );
                break;
            }
            alloc.advance(rec.size);

            if rec.key_len > 0 {
                let mut key_bytes = vec![0u8; rec.key_len as usize];
                state
                    .file
                    .read_exact_at(&mut key_bytes, offset + u64::from(HEADER_SIZE))?;
                let key = self.marshaller.key_from_bytes(&key_bytes)?;
                index.insert(
                    key,
                    Arc::new(Slot::record(
                        offset,
                        rec.size,
                        rec.key_len,
                        rec.data_len,
                        rec.expiry_time,
                    )),
                );
            } else {
                alloc.release(Arc::new(Slot::free_region(offset, rec.size)));
            }
        }

        info!(
            entries = index.len(),
            free_slots = alloc.free_list().len(),
            "Rebuilt index from data file"
        );
        Ok(())
    }
}
