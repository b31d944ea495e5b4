//! Dispatch: handing the processor to the selected thread.

use super::mlfq::Scheduler;
use crate::arch::{Arch, IntOff};
use crate::errors::{fatal, Fault};
use crate::thread::{ThreadId, ThreadRef, ThreadState};
use alloc::sync::Arc;

impl<A: Arch> Scheduler<A> {
    /// Switch the processor to `next`.
    ///
    /// The outgoing thread's status must already reflect why it stops
    /// (ready, blocked or finished). With `finishing` set it is parked for
    /// deferred destruction, which happens once the switch away from it has
    /// completed. When `next` is the current thread nothing is switched.
    ///
    /// On return, execution continues on behalf of the outgoing thread: the
    /// switch primitive comes back here only when that thread is resumed.
    pub fn run(&mut self, next: ThreadRef, finishing: bool, token: &IntOff) {
        token.check(&self.arch);
        let old = self.current.clone();

        if finishing {
            self.to_be_destroyed.mark(old.clone());
        }

        old.save_user_state(&self.arch);

        if !old.check_stack_overflow() {
            fatal(Fault::StackOverflow(old.id()));
        }

        if old.status() == ThreadState::Running {
            log::debug!(
                "Tick [{}]: Thread [{}] is replaced, and it has executed [{}] ticks // {}",
                self.arch.total_ticks(),
                old.id(),
                old.cur_cpu_burst(),
                old.name()
            );
        }

        self.current = next.clone();
        next.set_status(ThreadState::Running);

        if Arc::ptr_eq(&old, &next) {
            return;
        }

        next.set_cur_cpu_burst(0);
        log::debug!(
            "Tick [{}]: Switching from thread [{}] to thread [{}] // {} -> {}",
            self.arch.total_ticks(),
            old.id(),
            next.id(),
            old.name(),
            next.name()
        );

        // SAFETY: interrupts are off (token checked above), `next` came out of
        // a ready queue or is a freshly built thread with an initial context,
        // and `old` is kept alive by `old` itself until this call returns.
        unsafe { self.arch.context_switch(&old, &next) };

        token.check(&self.arch);
        log::trace!("Now in thread [{}] // {}", old.id(), old.name());

        self.check_to_be_destroyed(token);
        old.restore_user_state(&self.arch);
    }

    /// Destroy the thread parked by a finishing dispatch, if any.
    ///
    /// Must only be called once the processor has switched away from that
    /// thread's context. Calling it with nothing pending is a no-op.
    pub fn check_to_be_destroyed(&mut self, token: &IntOff) -> Option<ThreadId> {
        token.check(&self.arch);
        self.to_be_destroyed.drain()
    }
}
