//! Kernel stacks with an overflow canary.
//!
//! Stacks grow down, so the lowest word of the allocation is the last one a
//! runaway thread would clobber. A fixed canary sits there and is checked by
//! the dispatcher every time the owning thread gives up the processor.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec;

/// Pattern written at the stack limit.
pub const STACK_CANARY: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Smallest stack accepted, in words (canary plus a minimal frame).
pub const MIN_STACK_WORDS: usize = 16;

/// An owned kernel stack.
pub struct Stack {
    words: Box<[u64]>,
}

impl Stack {
    /// Allocate a zeroed stack of `words` 64-bit words and install the canary.
    ///
    /// Requests below [`MIN_STACK_WORDS`] are rounded up.
    pub fn new(words: usize) -> Self {
        let mut words = vec![0u64; words.max(MIN_STACK_WORDS)].into_boxed_slice();
        words[0] = STACK_CANARY;
        Self { words }
    }

    /// Usable size in bytes.
    pub fn size(&self) -> usize {
        self.words.len() * core::mem::size_of::<u64>()
    }

    /// Initial stack pointer: one past the highest word, 16-byte aligned.
    pub fn top(&self) -> usize {
        let end = self.words.as_ptr() as usize + self.size();
        end & !0xF
    }

    /// Lowest address of the allocation (where the canary lives).
    pub fn limit(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// Whether the canary is still intact.
    pub fn check_canary(&self) -> bool {
        self.words[0] == STACK_CANARY
    }

    /// Raw access to the stack memory.
    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.words
    }
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("limit", &format_args!("{:#x}", self.limit()))
            .field("size", &self.size())
            .field("canary_ok", &self.check_canary())
            .finish()
    }
}
