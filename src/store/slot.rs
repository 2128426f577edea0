//! Slot descriptors for regions of the data file

use std::cmp::Ordering;
use std::sync::{Condvar, Mutex};

/// Size of the fixed record header in bytes.
pub const HEADER_SIZE: u32 = 20;

/// Byte offset of the `key_len` field within a record header.
pub const KEYLEN_POS: u64 = 4;

/// A contiguous region of the data file holding one record.
///
/// The record layout on disk is:
/// - 4 bytes: total size of the region (may exceed the record)
/// - 4 bytes: serialized key length, 0 if the region is free
/// - 4 bytes: serialized value length
/// - 8 bytes: expiry timestamp (ms since epoch, -1 = never)
/// - `key_len` bytes of serialized key
/// - `data_len` bytes of serialized value
///
/// The descriptor fields are immutable; the reader count is runtime-only
/// state that keeps the region from being physically reused while a
/// concurrent load is still streaming it.
#[derive(Debug)]
pub struct Slot {
    /// File offset of this region.
    pub offset: u64,
    /// Total size of this region, including the header. May exceed
    /// `HEADER_SIZE + key_len + data_len` when the region was recycled
    /// from a larger free slot.
    pub size: u32,
    /// Length of the serialized key. 0 marks the region free on disk.
    pub key_len: u32,
    /// Length of the serialized value.
    pub data_len: u32,
    /// Expiry timestamp in ms since epoch, -1 if the entry never expires.
    pub expiry_time: i64,
    readers: Mutex<u32>,
    unlocked: Condvar,
}

impl Slot {
    /// Create a descriptor for a region that carries no record, as used
    /// by the free list and as an allocation probe.
    pub fn free_region(offset: u64, size: u32) -> Self {
        Self {
            offset,
            size,
            key_len: 0,
            data_len: 0,
            expiry_time: -1,
            readers: Mutex::new(0),
            unlocked: Condvar::new(),
        }
    }

    /// Create a descriptor for a region holding a live record.
    pub fn record(offset: u64, size: u32, key_len: u32, data_len: u32, expiry_time: i64) -> Self {
        Self {
            offset,
            size,
            key_len,
            data_len,
            expiry_time,
            readers: Mutex::new(0),
            unlocked: Condvar::new(),
        }
    }

    /// Register a reader. The region must not be reused until every
    /// reader has called `unlock`.
    pub fn lock(&self) {
        *self.readers.lock().unwrap() += 1;
    }

    /// Deregister a reader, waking any `wait_unlocked` caller once the
    /// count returns to zero.
    pub fn unlock(&self) {
        let mut readers = self.readers.lock().unwrap();
        *readers -= 1;
        if *readers == 0 {
            self.unlocked.notify_all();
        }
    }

    /// Non-blocking check whether any reader currently holds this slot.
    pub fn is_locked(&self) -> bool {
        *self.readers.lock().unwrap() > 0
    }

    /// Block until the last reader has released this slot.
    pub fn wait_unlocked(&self) {
        let mut readers = self.readers.lock().unwrap();
        while *readers > 0 {
            readers = self.unlocked.wait(readers).unwrap();
        }
    }

    /// Whether this entry's expiry time has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry_time > 0 && self.expiry_time < now
    }
}

// Free-list order: by size first so a best-fit lookup is a range scan,
// offset as the tie breaker.
impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size
            .cmp(&other.size)
            .then(self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && self.offset == other.offset
    }
}

impl Eq for Slot {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_slot_ordering() {
        let small = Slot::free_region(100, 32);
        let large = Slot::free_region(4, 64);
        let large_later = Slot::free_region(200, 64);

        assert!(small < large);
        assert!(large < large_later);
        assert_eq!(large, Slot::free_region(4, 64));
    }

    #[test]
    fn test_lock_protocol() {
        let slot = Slot::record(4, 64, 8, 16, -1);

        assert!(!slot.is_locked());
        slot.lock();
        slot.lock();
        assert!(slot.is_locked());
        slot.unlock();
        assert!(slot.is_locked());
        slot.unlock();
        assert!(!slot.is_locked());
    }

    #[test]
    fn test_wait_unlocked_blocks_until_drained() {
        let slot = Arc::new(Slot::record(4, 64, 8, 16, -1));
        slot.lock();

        let reader = Arc::clone(&slot);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            reader.unlock();
        });

        slot.wait_unlocked();
        assert!(!slot.is_locked());
        handle.join().unwrap();
    }

    #[test]
    fn test_expiry() {
        let immortal = Slot::record(4, 64, 8, 16, -1);
        assert!(!immortal.is_expired(i64::MAX));

        let mortal = Slot::record(4, 64, 8, 16, 1000);
        assert!(!mortal.is_expired(999));
        assert!(!mortal.is_expired(1000));
        assert!(mortal.is_expired(1001));
    }
}
