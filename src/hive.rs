//! Stable-address segmented storage for resource records.
//!
//! Records live in fixed-capacity blocks that are allocated whole and never
//! move or shrink, so the address of a live record is stable from its insert
//! until its own erase, regardless of unrelated churn in the same pool.
//! Vacant slots are recycled through a free list; each slot carries a
//! generation counter so a stale id is detectable instead of silently
//! denoting the slot's next occupant.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

/// Locator for a slot in a [`Hive`].
///
/// The index encodes block and offset directly (block = index / capacity),
/// so an id is its own O(1) locator. The generation distinguishes the
/// current occupant from any previous occupant recycled through the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Sentinel id that never denotes a live slot.
    pub const fn dangling() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
        }
    }

    /// Whether this is the dangling sentinel.
    pub fn is_dangling(&self) -> bool {
        self.index == u32::MAX
    }

    /// Raw slot index (for debugging).
    pub fn raw_index(&self) -> u32 {
        self.index
    }

    /// Raw generation (for debugging).
    pub fn raw_generation(&self) -> u32 {
        self.generation
    }
}

/// One storage slot. Odd generation = occupied, even = vacant.
struct Slot<R> {
    generation: AtomicU32,
    value: UnsafeCell<MaybeUninit<R>>,
}

impl<R> Slot<R> {
    fn vacant() -> Self {
        Self {
            generation: AtomicU32::new(0),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

/// Stable-address pool of records.
///
/// Structural state (the block table and the vacant list) sits behind short
/// internal locks, so `insert` and `erase` on unrelated slots may run from
/// any number of threads. The hive serializes nothing per slot: exclusivity
/// over one specific record is the caller's obligation, normally discharged
/// by the reference-count protocol layered on top.
pub struct Hive<R> {
    /// Fixed-capacity blocks. The vector may grow and relocate the box
    /// pointers, but the slots inside each box never move.
    blocks: RwLock<Vec<Box<[Slot<R>]>>>,

    /// Indices of vacant slots available for reuse.
    vacant: Mutex<Vec<u32>>,

    /// Slots per block.
    block_capacity: usize,

    /// Number of live records.
    live: AtomicUsize,
}

impl<R> Hive<R> {
    /// Create an empty hive with the given block capacity.
    ///
    /// # Panics
    /// Panics if `block_capacity` is zero.
    pub fn new(block_capacity: usize) -> Self {
        assert!(block_capacity > 0, "block capacity must be nonzero");
        Self {
            blocks: RwLock::new(Vec::new()),
            vacant: Mutex::new(Vec::new()),
            block_capacity,
            live: AtomicUsize::new(0),
        }
    }

    /// Allocate `blocks` additional blocks up front.
    pub fn preallocate(&self, blocks: usize) {
        let mut vacant = self.vacant.lock();
        for _ in 0..blocks {
            let base = self.push_block_locked();
            vacant.extend(base..base + self.block_capacity as u32);
        }
    }

    /// Append one block and return the index of its first slot. The caller
    /// must hold the vacant lock to keep lock order vacant -> blocks.
    fn push_block_locked(&self) -> u32 {
        let mut blocks = self.blocks.write();
        let base = (blocks.len() * self.block_capacity) as u32;
        let block: Box<[Slot<R>]> = (0..self.block_capacity).map(|_| Slot::vacant()).collect();
        blocks.push(block);
        log::debug!("pool grew to {} block(s)", blocks.len());
        base
    }

    /// Pop a vacant index, growing by one block if none remain.
    fn reserve_index(&self) -> u32 {
        let mut vacant = self.vacant.lock();
        if let Some(index) = vacant.pop() {
            return index;
        }
        let base = self.push_block_locked();
        vacant.extend(base + 1..base + self.block_capacity as u32);
        base
    }

    /// Resolve an index to its slot. The returned pointer is stable for the
    /// lifetime of the hive; only the generation tells whether it currently
    /// holds a record.
    fn slot(&self, index: u32) -> Option<NonNull<Slot<R>>> {
        let blocks = self.blocks.read();
        let block = blocks.get(index as usize / self.block_capacity)?;
        Some(NonNull::from(&block[index as usize % self.block_capacity]))
    }

    /// Insert a record, returning its id. Never moves existing records.
    pub fn insert(&self, value: R) -> SlotId {
        let index = self.reserve_index();
        let slot = self.slot(index).expect("reserved index resolves to a slot");
        // SAFETY: a reserved index is invisible to every other thread until
        // its generation goes odd below.
        let slot = unsafe { slot.as_ref() };
        // SAFETY: the slot is vacant and exclusively ours.
        unsafe { (*slot.value.get()).write(value) };
        let generation = slot.generation.load(Ordering::Relaxed).wrapping_add(1);
        // Release-publish the payload write along with the generation.
        slot.generation.store(generation, Ordering::Release);
        self.live.fetch_add(1, Ordering::Relaxed);
        SlotId { index, generation }
    }

    /// Whether `id` still denotes the live record it was issued for.
    pub fn contains(&self, id: SlotId) -> bool {
        if id.is_dangling() || id.generation & 1 == 0 {
            return false;
        }
        self.slot(id.index).is_some_and(|slot| {
            // SAFETY: only the generation atomic is read.
            unsafe { slot.as_ref() }.generation.load(Ordering::Acquire) == id.generation
        })
    }

    /// Shared access to a live record.
    ///
    /// # Safety
    /// The caller must guarantee the record is not erased for the duration
    /// of the borrow. The hive serializes nothing per record.
    pub unsafe fn get(&self, id: SlotId) -> Option<&R> {
        if id.is_dangling() || id.generation & 1 == 0 {
            return None;
        }
        let slot = self.slot(id.index)?;
        let slot = slot.as_ref();
        if slot.generation.load(Ordering::Acquire) != id.generation {
            return None;
        }
        Some(&*(*slot.value.get()).as_ptr())
    }

    /// Erase a live record, moving its payload out and recycling the slot.
    /// Returns `None` if `id` is stale. The generation is bumped before the
    /// slot is offered for reuse, so checked lookups racing this erase see a
    /// stale id rather than a half-dead record.
    ///
    /// # Safety
    /// The caller must hold the last reference to the record: no other
    /// thread may access it concurrently or after this call.
    pub unsafe fn erase(&self, id: SlotId) -> Option<R> {
        if id.is_dangling() || id.generation & 1 == 0 {
            return None;
        }
        let slot = self.slot(id.index)?;
        let slot = slot.as_ref();
        if slot.generation.load(Ordering::Acquire) != id.generation {
            return None;
        }
        slot.generation
            .store(id.generation.wrapping_add(1), Ordering::Release);
        // SAFETY: the record was live and we are its sole accessor.
        let value = (*slot.value.get()).assume_init_read();
        self.live.fetch_sub(1, Ordering::Relaxed);
        // Only now may an insert reuse the index.
        self.vacant.lock().push(id.index);
        Some(value)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Whether the hive holds no live records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slots across all blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.read().len() * self.block_capacity
    }

    /// Number of allocated blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Number of vacant slots ready for reuse.
    pub fn free_slots(&self) -> usize {
        self.vacant.lock().len()
    }
}

impl<R> Drop for Hive<R> {
    fn drop(&mut self) {
        for block in self.blocks.get_mut().iter_mut() {
            for slot in block.iter_mut() {
                if *slot.generation.get_mut() & 1 == 1 {
                    // SAFETY: odd generation means the slot holds a record.
                    unsafe { slot.value.get_mut().assume_init_drop() };
                }
            }
        }
    }
}

// SAFETY: owned records are handed to whichever thread erases them.
unsafe impl<R: Send> Send for Hive<R> {}
// SAFETY: shared access hands out &R (`R: Sync`) and erase moves records
// across threads (`R: Send`); structural state is locked or atomic.
unsafe impl<R: Send + Sync> Sync for Hive<R> {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_insert_get_erase() {
        let hive: Hive<String> = Hive::new(4);

        let id = hive.insert("quad".to_owned());
        assert!(hive.contains(id));
        assert_eq!(hive.len(), 1);

        let value = unsafe { hive.get(id) }.unwrap();
        assert_eq!(value, "quad");

        let taken = unsafe { hive.erase(id) }.unwrap();
        assert_eq!(taken, "quad");
        assert!(!hive.contains(id));
        assert!(hive.is_empty());
    }

    #[test]
    fn test_generation_invalidation_on_reuse() {
        let hive: Hive<u32> = Hive::new(4);

        let id1 = hive.insert(1);
        unsafe { hive.erase(id1) };

        let id2 = hive.insert(2);

        // Same slot, new generation
        assert_eq!(id1.raw_index(), id2.raw_index());
        assert_ne!(id1.raw_generation(), id2.raw_generation());

        assert!(!hive.contains(id1));
        assert!(hive.contains(id2));
        assert!(unsafe { hive.get(id1) }.is_none());
        assert!(unsafe { hive.erase(id1) }.is_none());
    }

    #[test]
    fn test_addresses_stable_across_churn() {
        let hive: Hive<u64> = Hive::new(2);

        let id = hive.insert(0xBEEF);
        let before = unsafe { hive.get(id) }.unwrap() as *const u64;

        // Force growth well past the first block, plus erase churn.
        let mut ids = Vec::new();
        for i in 0..64 {
            ids.push(hive.insert(i));
        }
        for chunk in ids.chunks(2) {
            unsafe { hive.erase(chunk[0]) };
        }

        let after = unsafe { hive.get(id) }.unwrap() as *const u64;
        assert_eq!(before, after);
        assert_eq!(unsafe { *after }, 0xBEEF);
    }

    #[test]
    fn test_preallocate_blocks() {
        let hive: Hive<u8> = Hive::new(8);
        hive.preallocate(3);

        assert_eq!(hive.block_count(), 3);
        assert_eq!(hive.capacity(), 24);
        assert_eq!(hive.free_slots(), 24);
    }

    #[test]
    fn test_drop_releases_live_records() {
        struct Canary(Arc<AtomicUsize>);

        impl Drop for Canary {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let hive: Hive<Canary> = Hive::new(4);

        let erased = hive.insert(Canary(Arc::clone(&drops)));
        hive.insert(Canary(Arc::clone(&drops)));
        hive.insert(Canary(Arc::clone(&drops)));

        unsafe { hive.erase(erased) };
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(hive);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dangling_id() {
        let hive: Hive<u32> = Hive::new(4);
        let id = SlotId::dangling();

        assert!(id.is_dangling());
        assert!(!hive.contains(id));
        assert!(unsafe { hive.get(id) }.is_none());
    }
}
