//! Free-region tracking and allocation

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use super::data_file::DATA_START;
use super::slot::Slot;

/// Dead slots available for reuse, ordered by `(size, offset)`.
#[derive(Debug, Default)]
pub struct FreeList {
    slots: BTreeSet<Arc<Slot>>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dead slot.
    pub fn insert(&mut self, slot: Arc<Slot>) {
        self.slots.insert(slot);
    }

    /// Remove and return the smallest unlocked slot of at least `len`
    /// bytes. Slots still held by concurrent readers are skipped; they
    /// become eligible again once their readers drain.
    pub fn take_best_fit(&mut self, len: u32) -> Option<Arc<Slot>> {
        let probe = Arc::new(Slot::free_region(0, len));
        let found = self
            .slots
            .range::<Arc<Slot>, _>((Bound::Included(&probe), Bound::Unbounded))
            .find(|slot| !slot.is_locked())
            .cloned();
        if let Some(slot) = &found {
            self.slots.remove(slot);
        }
        found
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Slot>> {
        self.slots.iter()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Resolves space requests against the free list, falling back to
/// appending at the end of the file. Owns the append pointer so both are
/// guarded by the same mutex.
#[derive(Debug)]
pub struct Allocator {
    free: FreeList,
    file_pos: u64,
}

impl Allocator {
    pub fn new() -> Self {
        Self {
            free: FreeList::new(),
            file_pos: DATA_START,
        }
    }

    /// Allocate at least `len` bytes, returning the region's offset and
    /// total size. A recycled region is returned whole; the surplus over
    /// `len` is retained inside it rather than split off.
    pub fn allocate(&mut self, len: u32) -> (u64, u32) {
        if let Some(slot) = self.free.take_best_fit(len) {
            return (slot.offset, slot.size);
        }
        let offset = self.file_pos;
        self.file_pos += u64::from(len);
        (offset, len)
    }

    /// Hand a dead slot back for reuse.
    pub fn release(&mut self, slot: Arc<Slot>) {
        self.free.insert(slot);
    }

    /// Advance the append pointer past an existing record, as the index
    /// rebuild walks the file.
    pub fn advance(&mut self, size: u32) {
        self.file_pos += u64::from(size);
    }

    /// Current end-of-data position.
    pub fn file_pos(&self) -> u64 {
        self.file_pos
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free
    }

    /// Drop all free slots and rewind the append pointer to the start
    /// of the data area.
    pub fn clear(&mut self) {
        self.free.clear();
        self.file_pos = DATA_START;
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}
