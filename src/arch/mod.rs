//! Machine abstraction: the collaborators the scheduler drives but does not own.
//!
//! The scheduler never touches registers, timers or interrupt controllers
//! itself. It asks an [`Arch`] implementation to report the interrupt level,
//! to tell whether the timer just fired, to move user registers in and out of
//! a thread record, and to perform the actual context switch.

use crate::thread::Thread;

pub mod irq;
pub mod sim;

pub use irq::IntOff;
pub use sim::SimArch;

/// Number of user-visible registers saved for threads with an address space.
pub const NUM_USER_REGS: usize = 40;

/// Kernel execution context of a thread.
///
/// Filled and consumed only by [`Arch::context_switch`]; the scheduler treats
/// it as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct SavedContext {
    /// Callee-saved general purpose registers
    pub regs: [u64; 12],
    /// Stack pointer
    pub sp: u64,
    /// Resume address
    pub pc: u64,
}

impl Default for SavedContext {
    fn default() -> Self {
        Self { regs: [0; 12], sp: 0, pc: 0 }
    }
}

/// User-mode register file of a thread running in its own address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRegisters(pub [u64; NUM_USER_REGS]);

impl Default for UserRegisters {
    fn default() -> Self {
        Self([0; NUM_USER_REGS])
    }
}

/// Machine services used by the scheduler.
///
/// Everything here is called with interrupts disabled, on the single
/// processor, from inside a scheduler operation.
pub trait Arch {
    /// Whether interrupts are currently enabled.
    fn interrupts_enabled(&self) -> bool;

    /// Set the interrupt level, returning the previous one.
    fn set_interrupts(&self, enabled: bool) -> bool;

    /// Whether the event being handled is the periodic timer interrupt.
    fn timer_interrupt(&self) -> bool;

    /// Ticks elapsed since boot.
    fn total_ticks(&self) -> u64;

    /// Transfer the processor from `prev` to `next`.
    ///
    /// Returns only when a later switch targets `prev` again, at which point
    /// execution continues right after this call.
    ///
    /// # Safety
    ///
    /// - Interrupts must be disabled
    /// - `next` must hold a valid execution context (either set up at creation
    ///   or saved by a previous switch away from it)
    /// - `prev` must stay alive until it is switched back to or destroyed
    unsafe fn context_switch(&self, prev: &Thread, next: &Thread);

    /// Copy the machine's user registers into `regs`.
    fn save_user_registers(&self, regs: &mut UserRegisters);

    /// Load the machine's user registers from `regs`.
    fn restore_user_registers(&self, regs: &UserRegisters);

    /// Nothing is runnable: wait for the next interrupt and service it.
    ///
    /// Called outside any scheduler operation, with the caller's interrupt
    /// level restored. Handlers make threads ready through a
    /// [`Waker`](crate::kernel::Waker).
    fn idle(&self);
}
