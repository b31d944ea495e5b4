//! Thread builder for configuring thread records.

use super::{AddressSpace, Thread, ThreadId, ThreadRef};
use crate::mem::Stack;

extern crate alloc;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

/// Priority given to threads that do not ask for one (bottom of L2).
pub const DEFAULT_PRIORITY: i32 = 50;

/// Builder for thread records.
///
/// The priority is not validated here: an out-of-band priority is a fatal
/// fault at admission time, not a construction error.
pub struct ThreadBuilder {
    name: Option<String>,
    priority: i32,
    approximate_burst: u64,
    stack_words: Option<usize>,
    entry: usize,
    space: Option<Box<dyn AddressSpace>>,
}

impl ThreadBuilder {
    /// Create a new thread builder with default settings.
    pub fn new() -> Self {
        Self {
            name: None,
            priority: DEFAULT_PRIORITY,
            approximate_burst: 0,
            stack_words: None,
            entry: 0,
            space: None,
        }
    }

    /// Set the thread name for debugging purposes.
    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the thread priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the initial burst estimate, in ticks.
    pub fn approximate_burst(mut self, ticks: u64) -> Self {
        self.approximate_burst = ticks;
        self
    }

    /// Give the thread its own kernel stack of `words` 64-bit words.
    ///
    /// Without one the thread runs on a stack it does not own (the boot
    /// stack) and is never checked for overflow.
    pub fn stack_words(mut self, words: usize) -> Self {
        self.stack_words = Some(words);
        self
    }

    /// Address the thread starts executing at.
    pub fn entry(mut self, entry: usize) -> Self {
        self.entry = entry;
        self
    }

    /// Attach a user address space.
    pub fn address_space(mut self, space: Box<dyn AddressSpace>) -> Self {
        self.space = Some(space);
        self
    }

    /// Build the thread record.
    pub fn build(self, id: ThreadId) -> ThreadRef {
        let name = self
            .name
            .unwrap_or_else(|| alloc::format!("thread-{}", id));
        let stack = self.stack_words.map(Stack::new);
        let stack_top = stack.as_ref().map_or(0, Stack::top);

        let thread = Thread::new(
            id,
            name,
            self.priority,
            self.approximate_burst,
            stack,
            self.space,
        );
        thread.setup_initial_context(self.entry, stack_top);
        Arc::new(thread)
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadState;

    #[test]
    fn test_builder_defaults() {
        let thread = ThreadBuilder::new().build(ThreadId::new(3));
        assert_eq!(thread.name(), "thread-3");
        assert_eq!(thread.priority(), DEFAULT_PRIORITY);
        assert_eq!(thread.approximate_burst(), 0);
        assert_eq!(thread.aging(), 0);
        assert_eq!(thread.status(), ThreadState::Blocked);
        assert!(!thread.has_address_space());
    }

    #[test]
    fn test_builder_configuration() {
        let thread = ThreadBuilder::new()
            .name("worker")
            .priority(120)
            .approximate_burst(25)
            .stack_words(128)
            .entry(0x8000)
            .build(ThreadId::new(9));

        assert_eq!(thread.name(), "worker");
        assert_eq!(thread.priority(), 120);
        assert_eq!(thread.approximate_burst(), 25);

        let top = thread.with_stack(|s| s.top()).unwrap();
        let ctx = thread.context();
        assert_eq!(ctx.pc, 0x8000);
        assert_eq!(ctx.sp, top as u64);
    }
}
