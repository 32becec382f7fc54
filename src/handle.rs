//! Handle types: the copyable raw handle and the RAII owning handle.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr;

use crate::error::HubError;
use crate::hive::SlotId;
use crate::hub::ResourceHub;
use crate::record::LifecycleState;

/// A non-owning, copyable handle to a resource.
///
/// A raw handle does not keep its resource alive by existing; it stands for
/// whatever strong references the caller balances through
/// [`ResourceHub::add_ref`] and [`ResourceHub::release`]. This is the shape
/// a C-style API hands across its boundary.
pub struct RawHandle<T> {
    pub(crate) id: SlotId,
    _marker: PhantomData<fn() -> T>,
}

// Manual implementations to avoid bounds on T: a handle is just an id.
impl<T> Copy for RawHandle<T> {}

impl<T> Clone for RawHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for RawHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for RawHandle<T> {}

impl<T> std::hash::Hash for RawHandle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for RawHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawHandle").field(&self.id).finish()
    }
}

impl<T> RawHandle<T> {
    pub(crate) fn new(id: SlotId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// A handle that never denotes a live resource.
    pub const fn dangling() -> Self {
        Self {
            id: SlotId::dangling(),
            _marker: PhantomData,
        }
    }

    /// Whether this is the dangling sentinel.
    pub fn is_dangling(&self) -> bool {
        self.id.is_dangling()
    }

    /// The underlying slot id (for debugging and diagnostics).
    pub fn slot(&self) -> SlotId {
        self.id
    }
}

/// An owning handle: one strong reference, released on drop.
///
/// Cloning adds a reference; dropping the last owner (raw references
/// included) finalizes the resource.
pub struct Resource<T> {
    hub: ResourceHub<T>,
    raw: RawHandle<T>,
}

impl<T> Resource<T> {
    pub(crate) fn new(hub: ResourceHub<T>, raw: RawHandle<T>) -> Self {
        Self { hub, raw }
    }

    /// Borrow the backend payload.
    ///
    /// Sound because this handle's strong reference keeps the record (whose
    /// address never moves) alive for at least the borrow.
    pub fn get(&self) -> &T {
        self.hub.payload_of(self.raw)
    }

    /// Logical destruction. Idempotent; the reference count is untouched.
    pub fn destroy(&self) {
        self.hub
            .destroy(self.raw)
            .expect("owning handle denotes a live record");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.hub
            .state(self.raw)
            .expect("owning handle denotes a live record")
    }

    /// Current strong count (racy by nature; for diagnostics).
    pub fn ref_count(&self) -> u64 {
        self.hub
            .ref_count(self.raw)
            .expect("owning handle denotes a live record")
    }

    /// Mark the resource temporarily unusable (e.g. mapped).
    pub fn mark_unavailable(&self) -> Result<(), HubError> {
        self.hub.mark_unavailable(self.raw)
    }

    /// Return the resource to the usable state.
    pub fn mark_available(&self) -> Result<(), HubError> {
        self.hub.mark_available(self.raw)
    }

    /// The raw handle, without adding a reference. The result is backed by
    /// this owner and dangles once the last reference is released.
    pub fn raw(&self) -> RawHandle<T> {
        self.raw
    }

    /// Add a reference and return a raw handle that is valid independently
    /// of this owner. The caller must balance it with one
    /// [`ResourceHub::release`].
    ///
    /// This is the mandatory bookkeeping step when a raw handle crosses an
    /// API boundary: without it the handle would dangle as soon as the local
    /// owner goes out of scope.
    pub fn export_raw(&self) -> RawHandle<T> {
        self.hub
            .add_ref(self.raw)
            .expect("owning handle denotes a live record");
        self.raw
    }

    /// Dissolve into a raw handle, transferring this owner's reference to it
    /// without releasing. The caller must balance it with one
    /// [`ResourceHub::release`].
    pub fn into_raw(self) -> RawHandle<T> {
        let this = mem::ManuallyDrop::new(self);
        let raw = this.raw;
        // Skip only the release in Drop; the hub clone itself must still go,
        // or the pool would be kept alive by every minted raw handle.
        // SAFETY: `this` is never dropped, so the hub is moved out exactly
        // once and nothing reads the field again.
        drop(unsafe { ptr::read(&this.hub) });
        raw
    }

    /// The hub this resource lives in.
    pub fn hub(&self) -> &ResourceHub<T> {
        &self.hub
    }
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        self.hub
            .add_ref(self.raw)
            .expect("owning handle denotes a live record");
        Self {
            hub: self.hub.clone(),
            raw: self.raw,
        }
    }
}

impl<T> Drop for Resource<T> {
    fn drop(&mut self) {
        // SAFETY: this hands over the reference this handle owns, and every
        // borrow issued by `get` ended when the handle became droppable.
        let released = unsafe { self.hub.release(self.raw) };
        debug_assert!(released.is_ok(), "owning handle was stale at drop");
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("slot", &self.raw.id)
            .field("state", &self.state())
            .field("refs", &self.ref_count())
            .finish()
    }
}
