//! Deferred destruction of finished threads.
//!
//! A finishing thread is still executing its own dispatch call, on its own
//! stack, until the context switch away from it completes. Its resources can
//! only be released afterwards, by whichever thread resumes next. The slot
//! holds at most one such thread.

use crate::errors::{fatal, Fault};
use crate::thread::{ThreadId, ThreadRef, ThreadState};

/// Holding cell for the thread awaiting destruction.
#[derive(Debug, Default)]
pub enum DestroySlot {
    /// Nothing to destroy
    #[default]
    Empty,
    /// A finished thread whose context may still be live
    Pending(ThreadRef),
    /// Resources are being released
    Draining,
}

impl DestroySlot {
    pub const fn new() -> Self {
        DestroySlot::Empty
    }

    /// Park a finishing thread. Aborts if the slot is not empty.
    #[track_caller]
    pub fn mark(&mut self, thread: ThreadRef) {
        match self {
            DestroySlot::Empty => {
                log::debug!("Thread [{}] marked for destruction // {}", thread.id(), thread.name());
                *self = DestroySlot::Pending(thread);
            }
            DestroySlot::Pending(pending) => fatal(Fault::DuplicateFinish {
                pending: Some(pending.id()),
                finishing: thread.id(),
            }),
            DestroySlot::Draining => fatal(Fault::DuplicateFinish {
                pending: None,
                finishing: thread.id(),
            }),
        }
    }

    /// Release the pending thread, if any. Idempotent.
    ///
    /// Returns the id of the destroyed thread.
    pub fn drain(&mut self) -> Option<ThreadId> {
        match core::mem::replace(self, DestroySlot::Draining) {
            DestroySlot::Pending(thread) => {
                let id = thread.id();
                log::info!("Destroying thread [{}] // {}", id, thread.name());
                thread.set_status(ThreadState::Finished);
                thread.release();
                drop(thread);
                *self = DestroySlot::Empty;
                Some(id)
            }
            DestroySlot::Empty | DestroySlot::Draining => {
                *self = DestroySlot::Empty;
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DestroySlot::Empty)
    }

    /// Thread waiting to be destroyed.
    pub fn pending(&self) -> Option<&ThreadRef> {
        match self {
            DestroySlot::Pending(thread) => Some(thread),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadBuilder;
    use alloc::sync::Arc;

    #[test]
    fn test_mark_and_drain() {
        let thread = ThreadBuilder::new().stack_words(32).build(ThreadId::new(4));
        let weak = Arc::downgrade(&thread);

        let mut slot = DestroySlot::new();
        slot.mark(thread);
        assert!(!slot.is_empty());
        assert_eq!(slot.pending().map(|t| t.id()), Some(ThreadId::new(4)));

        assert_eq!(slot.drain(), Some(ThreadId::new(4)));
        assert!(slot.is_empty());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_drain_is_idempotent() {
        let mut slot = DestroySlot::new();
        assert_eq!(slot.drain(), None);
        assert_eq!(slot.drain(), None);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_drain_releases_shared_thread() {
        let thread = ThreadBuilder::new().stack_words(32).build(ThreadId::new(2));
        let mut slot = DestroySlot::new();
        slot.mark(thread.clone());
        slot.drain();

        assert!(thread.is_released());
        assert_eq!(thread.status(), ThreadState::Finished);
    }

    #[test]
    #[should_panic(expected = "still pending destruction")]
    fn test_second_mark_is_fatal() {
        let mut slot = DestroySlot::new();
        slot.mark(ThreadBuilder::new().build(ThreadId::new(1)));
        slot.mark(ThreadBuilder::new().build(ThreadId::new(2)));
    }

    #[test]
    #[should_panic(expected = "being drained")]
    fn test_mark_while_draining_is_fatal() {
        let mut slot = DestroySlot::Draining;
        slot.mark(ThreadBuilder::new().build(ThreadId::new(1)));
    }
}
