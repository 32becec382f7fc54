//! Backend-finalizer injection and the deferred-teardown queue.
//!
//! The core guarantees *when* and *how many times* teardown runs (exactly
//! once per resource, after logical destruction, before slot reclamation);
//! *what* it does belongs to the host. A host that frees backend memory
//! inline passes a plain closure; one that batches frees per submission
//! plugs in a [`RetireQueue`] and drains it at its own pace.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

/// The backend destructor, invoked exactly once per resource on the thread
/// whose release drove the count to zero.
pub type Finalizer<T> = Box<dyn Fn(T) + Send + Sync>;

/// Lock-free sink for payloads awaiting deferred teardown.
pub struct RetireQueue<T> {
    queue: SegQueue<T>,
}

impl<T> RetireQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Hand a payload over for deferred teardown.
    pub fn retire(&self, payload: T) {
        self.queue.push(payload);
    }

    /// Drain everything queued so far through `teardown`, returning how many
    /// payloads were processed.
    pub fn drain<F: FnMut(T)>(&self, mut teardown: F) -> usize {
        let mut count = 0;
        while let Some(payload) = self.queue.pop() {
            teardown(payload);
            count += 1;
        }
        count
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Approximate number of pending payloads.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// A finalizer that enqueues here instead of tearing down inline.
    pub fn finalizer(self: &Arc<Self>) -> Finalizer<T>
    where
        T: Send + 'static,
    {
        let queue = Arc::clone(self);
        Box::new(move |payload| queue.retire(payload))
    }
}

impl<T> Default for RetireQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retire_and_drain() {
        let queue = RetireQueue::new();
        assert!(queue.is_empty());

        queue.retire("a");
        queue.retire("b");
        assert_eq!(queue.len(), 2);

        let mut seen = Vec::new();
        let drained = queue.drain(|payload| seen.push(payload));

        assert_eq!(drained, 2);
        assert_eq!(seen, vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_finalizer_enqueues() {
        let queue = Arc::new(RetireQueue::new());
        let finalizer = queue.finalizer();

        finalizer(41u32);
        finalizer(42u32);

        let mut seen = Vec::new();
        queue.drain(|payload| seen.push(payload));
        assert_eq!(seen, vec![41, 42]);
    }
}
