//! Ownership front-end: creation, the reference-count protocol, and the
//! exactly-once finalize path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::HubConfig;
use crate::error::HubError;
use crate::handle::{RawHandle, Resource};
use crate::hive::Hive;
use crate::record::{LifecycleState, Record};
use crate::retire::Finalizer;

/// Shared front-end over one resource pool.
///
/// A hub is created once by its owner and cloned into every component that
/// creates or releases resources; clones share the same pool. There is no
/// process-global hub: "one pool for the process" is expressed by passing
/// one hub around.
///
/// All raw-handle operations are checked: a stale handle (one whose record
/// was already finalized) yields [`HubError::StaleHandle`] instead of
/// undefined behavior. Balancing `add_ref`/`release` cannot be checked,
/// which is why [`release`](Self::release) is `unsafe`: an extra release on
/// a live record finalizes it out from under the remaining holders.
pub struct ResourceHub<T> {
    inner: Arc<HubInner<T>>,
}

struct HubInner<T> {
    hive: Hive<Record<T>>,
    finalizer: Option<Finalizer<T>>,
    created: AtomicU64,
    finalized: AtomicU64,
}

impl<T> Clone for ResourceHub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ResourceHub<T> {
    /// Hub whose finalizer simply drops payloads.
    pub fn new(config: &HubConfig) -> Self {
        Self::build(config, None)
    }

    /// Hub with an injected backend finalizer, invoked exactly once per
    /// resource after logical destruction and before slot reclamation.
    pub fn with_finalizer(config: &HubConfig, finalizer: Finalizer<T>) -> Self {
        Self::build(config, Some(finalizer))
    }

    fn build(config: &HubConfig, finalizer: Option<Finalizer<T>>) -> Self {
        let hive = Hive::new(config.block_capacity);
        hive.preallocate(config.preallocate_blocks);
        Self {
            inner: Arc::new(HubInner {
                hive,
                finalizer,
                created: AtomicU64::new(0),
                finalized: AtomicU64::new(0),
            }),
        }
    }

    /// Create a resource. The returned handle owns the first strong
    /// reference, established before anything escapes this call.
    pub fn create(&self, payload: T) -> Resource<T> {
        let id = self.inner.hive.insert(Record::new(payload));
        self.inner.created.fetch_add(1, Ordering::Relaxed);
        log::trace!("created resource at {:?}", id);
        Resource::new(self.clone(), RawHandle::new(id))
    }

    /// Create a resource and hand its reference straight to a raw handle,
    /// C-API style. The caller owns one reference and must `release` it.
    pub fn create_raw(&self, payload: T) -> RawHandle<T> {
        self.create(payload).into_raw()
    }

    /// Resolve a raw handle to its record, rejecting stale handles.
    fn record(&self, raw: RawHandle<T>) -> Result<&Record<T>, HubError> {
        // SAFETY: a strong reference backs every legitimate checked call and
        // keeps the record alive for this borrow; stale handles fail the
        // generation check instead.
        unsafe { self.inner.hive.get(raw.id) }.ok_or(HubError::StaleHandle)
    }

    /// Add one strong reference. Checked and increment-only, so it is safe
    /// on its own; the balance obligation falls on
    /// [`release`](Self::release).
    pub fn add_ref(&self, raw: RawHandle<T>) -> Result<(), HubError> {
        self.record(raw)?.acquire();
        Ok(())
    }

    /// Drop one strong reference. The call that drives the count to zero
    /// finalizes the record; the handle (and every copy of it) is invalid
    /// from that point on.
    ///
    /// # Safety
    /// The caller must own the strong reference being handed over (from
    /// [`create_raw`](Self::create_raw), [`add_ref`](Self::add_ref),
    /// [`Resource::export_raw`] or [`Resource::into_raw`]), and no borrow
    /// backed by that reference may still be alive. A release that was
    /// never acquired can drive the count to zero early, running
    /// finalization under the feet of the remaining holders.
    pub unsafe fn release(&self, raw: RawHandle<T>) -> Result<(), HubError> {
        let record = self.record(raw)?;
        if record.release() {
            self.finalize(raw, record);
        }
        Ok(())
    }

    /// Logical destruction: advance the record to
    /// [`LifecycleState::Destroyed`]. Idempotent, any number of calls is
    /// valid, and the reference count is untouched; the CPU-side record
    /// stays in the pool until the last reference is released.
    pub fn destroy(&self, raw: RawHandle<T>) -> Result<(), HubError> {
        if self.record(raw)?.destroy() {
            log::trace!("destroyed resource at {:?}", raw.id);
        }
        Ok(())
    }

    /// Current lifecycle state of the record.
    pub fn state(&self, raw: RawHandle<T>) -> Result<LifecycleState, HubError> {
        Ok(self.record(raw)?.state())
    }

    /// Current strong count (racy by nature; for diagnostics).
    pub fn ref_count(&self, raw: RawHandle<T>) -> Result<u64, HubError> {
        Ok(self.record(raw)?.ref_count())
    }

    /// Mark the resource temporarily unusable (e.g. mapped).
    pub fn mark_unavailable(&self, raw: RawHandle<T>) -> Result<(), HubError> {
        self.record(raw)?.mark_unavailable()
    }

    /// Return the resource to the usable state.
    pub fn mark_available(&self, raw: RawHandle<T>) -> Result<(), HubError> {
        self.record(raw)?.mark_available()
    }

    /// Whether the handle still denotes a live record.
    pub fn contains(&self, raw: RawHandle<T>) -> bool {
        self.inner.hive.contains(raw.id)
    }

    /// Take over one caller-owned raw reference as an owning handle. No
    /// count change: the raw handle's reference now belongs to the result.
    pub fn adopt_raw(&self, raw: RawHandle<T>) -> Result<Resource<T>, HubError> {
        if !self.inner.hive.contains(raw.id) {
            return Err(HubError::StaleHandle);
        }
        Ok(Resource::new(self.clone(), raw))
    }

    /// Owning handle from a raw handle the caller keeps: adds a reference.
    pub fn upgrade(&self, raw: RawHandle<T>) -> Result<Resource<T>, HubError> {
        self.add_ref(raw)?;
        Ok(Resource::new(self.clone(), raw))
    }

    /// Pool and lifecycle counters.
    pub fn stats(&self) -> HubStats {
        HubStats {
            live: self.inner.hive.len(),
            created: self.inner.created.load(Ordering::Relaxed),
            finalized: self.inner.finalized.load(Ordering::Relaxed),
            blocks: self.inner.hive.block_count(),
            free_slots: self.inner.hive.free_slots(),
        }
    }

    /// Borrow a payload backed by an owning handle.
    pub(crate) fn payload_of(&self, raw: RawHandle<T>) -> &T {
        let record = self
            .record(raw)
            .expect("owning handle denotes a live record");
        // SAFETY: the owning handle's strong reference pins the payload.
        unsafe { record.payload() }.expect("payload present while references remain")
    }

    /// Teardown path for the unique thread whose release hit zero.
    fn finalize(&self, raw: RawHandle<T>, record: &Record<T>) {
        // A resource the caller never destroyed is destroyed here, so the
        // backend teardown is never skipped.
        if record.destroy() {
            log::trace!("destroyed resource at {:?} during finalize", raw.id);
        }

        // SAFETY: release() returned true, making this thread the sole
        // accessor of the record.
        if let Some(payload) = unsafe { record.take_payload() } {
            match self.inner.finalizer.as_ref() {
                Some(run) => run(payload),
                None => drop(payload),
            }
        }

        // SAFETY: the count is zero and the payload is gone; nothing can
        // legitimately reach the record anymore. The address is invalid
        // after this point.
        let erased = unsafe { self.inner.hive.erase(raw.id) };
        debug_assert!(erased.is_some(), "finalized record was already erased");

        self.inner.finalized.fetch_add(1, Ordering::Relaxed);
        log::trace!("finalized resource at {:?}", raw.id);
    }
}

impl<T> Drop for HubInner<T> {
    fn drop(&mut self) {
        let live = self.hive.len();
        if live > 0 {
            log::warn!("hub dropped with {live} live resource(s); their finalizer will not run");
        }
    }
}

/// Snapshot of a hub's pool and lifecycle counters.
#[derive(Debug, Clone, Default)]
pub struct HubStats {
    /// Records currently alive.
    pub live: usize,
    /// Resources created since the hub was built.
    pub created: u64,
    /// Resources finalized since the hub was built.
    pub finalized: u64,
    /// Storage blocks allocated.
    pub blocks: usize,
    /// Vacant slots ready for reuse.
    pub free_slots: usize,
}
