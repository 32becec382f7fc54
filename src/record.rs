//! Per-resource record: destruction state machine plus strong counter.
//!
//! Logical destruction and physical reclamation are decoupled. `destroy`
//! only advances the lifecycle state; the payload leaves the record when the
//! strong count hits zero, and exactly one thread observes that transition.

use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, AtomicU8, Ordering};

use crate::error::HubError;

/// Logical lifecycle of a resource, independent of its reference count.
///
/// Transitions only move toward `Destroyed`; a destroyed resource never
/// becomes usable again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Usable.
    Available = 0,
    /// Temporarily unusable, e.g. mapped for host access.
    Unavailable = 1,
    /// Logically destroyed; awaiting physical reclamation.
    Destroyed = 2,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Available,
            1 => Self::Unavailable,
            _ => Self::Destroyed,
        }
    }
}

/// One resource record as stored in the pool.
pub(crate) struct Record<T> {
    state: AtomicU8,

    /// Strong references. Starts at 1: the creator's reference exists before
    /// the record is reachable from anywhere else, so the count is never
    /// observable at zero ahead of the real zero transition.
    refs: AtomicU64,

    /// Backend payload, moved out once by the finalizing thread.
    payload: UnsafeCell<Option<T>>,
}

impl<T> Record<T> {
    pub(crate) fn new(payload: T) -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Available as u8),
            refs: AtomicU64::new(1),
            payload: UnsafeCell::new(Some(payload)),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn ref_count(&self) -> u64 {
        self.refs.load(Ordering::Relaxed)
    }

    /// Add one strong reference.
    pub(crate) fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one strong reference. Returns true for exactly the call that
    /// brought the count to zero; that caller must finalize the record.
    pub(crate) fn release(&self) -> bool {
        if self.refs.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        // Pairs with the Release decrements above: every write made by
        // another holder before its release is visible to the finalizer.
        fence(Ordering::Acquire);
        true
    }

    /// Advance to `Destroyed`. Returns true only for the call that performed
    /// the transition; repeat calls are defined no-ops. A mapped
    /// (`Unavailable`) record is implicitly unmapped by the transition.
    pub(crate) fn destroy(&self) -> bool {
        self.state
            .swap(LifecycleState::Destroyed as u8, Ordering::AcqRel)
            != LifecycleState::Destroyed as u8
    }

    pub(crate) fn mark_unavailable(&self) -> Result<(), HubError> {
        self.transition(LifecycleState::Available, LifecycleState::Unavailable)
    }

    pub(crate) fn mark_available(&self) -> Result<(), HubError> {
        self.transition(LifecycleState::Unavailable, LifecycleState::Available)
    }

    /// CAS transition between the two live states. Already being in the
    /// target state is fine; `Destroyed` is terminal.
    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), HubError> {
        match self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(current) if current == to as u8 => Ok(()),
            Err(_) => Err(HubError::AlreadyDestroyed),
        }
    }

    /// Move the payload out for teardown. `None` if already taken.
    ///
    /// # Safety
    /// Only the unique finalizing thread (the one `release` returned true
    /// for) may call this; nothing else may touch the payload concurrently.
    pub(crate) unsafe fn take_payload(&self) -> Option<T> {
        (*self.payload.get()).take()
    }

    /// Borrow the payload.
    ///
    /// # Safety
    /// The caller must hold a strong reference for the borrow's duration.
    pub(crate) unsafe fn payload(&self) -> Option<&T> {
        (*self.payload.get()).as_ref()
    }
}

// SAFETY: the payload cell is written only on the creation and finalize
// paths, both exclusive by protocol. Shared reads need `T: Sync`; the
// finalize-time move across threads needs `T: Send`.
unsafe impl<T: Send + Sync> Sync for Record<T> {}
