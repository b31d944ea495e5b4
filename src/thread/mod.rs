//! Thread records as seen by the scheduler.
//!
//! A [`Thread`] carries the scheduling state (status, priority, burst
//! estimates, aging credit) next to the opaque pieces the dispatcher saves and
//! restores on behalf of other subsystems: the kernel execution context, the
//! user register file, the kernel stack and an optional address space.
//!
//! Threads are shared through [`ThreadRef`]. Thread management owns the
//! handles; the scheduler keeps clones while a thread is queued, current, or
//! waiting to be destroyed.

use crate::arch::{Arch, SavedContext, UserRegisters};
use crate::mem::Stack;
use portable_atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};

extern crate alloc;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;

pub mod builder;

pub use builder::ThreadBuilder;

/// Shared handle to a thread record.
pub type ThreadRef = Arc<Thread>;

/// Unique identifier for threads.
///
/// Thread IDs are never reused and are guaranteed to be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(core::num::NonZeroUsize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Create a thread ID.
    ///
    /// Zero is reserved; debug builds reject it, release builds map it to 1.
    pub fn new(id: u64) -> Self {
        debug_assert_ne!(id, 0, "thread id 0 is reserved");
        let id = core::num::NonZeroUsize::new(id as usize).unwrap_or(core::num::NonZeroUsize::MIN);
        Self(id)
    }

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Sitting in a ready queue
    Ready = 0,
    /// Owns the processor
    Running = 1,
    /// Waiting for an event
    Blocked = 2,
    /// Done; waiting to be destroyed
    Finished = 3,
}

impl ThreadState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ThreadState::Ready,
            1 => ThreadState::Running,
            2 => ThreadState::Blocked,
            _ => ThreadState::Finished,
        }
    }
}

/// Per-thread user address space, owned by the memory subsystem.
///
/// The dispatcher only asks it to save and restore its translation state
/// around a switch.
pub trait AddressSpace: Send {
    /// Called when the owning thread gives up the processor.
    fn save_state(&mut self);

    /// Called when the owning thread gets the processor back.
    fn restore_state(&mut self);
}

/// A schedulable thread.
pub struct Thread {
    id: ThreadId,
    name: String,
    status: AtomicU8,
    priority: AtomicI32,
    approximate_burst: AtomicU64,
    cur_cpu_burst: AtomicU64,
    aging: AtomicU64,
    context: spin::Mutex<SavedContext>,
    user_registers: spin::Mutex<UserRegisters>,
    stack: spin::Mutex<Option<Stack>>,
    space: spin::Mutex<Option<Box<dyn AddressSpace>>>,
    released: AtomicBool,
}

impl Thread {
    pub(crate) fn new(
        id: ThreadId,
        name: String,
        priority: i32,
        approximate_burst: u64,
        stack: Option<Stack>,
        space: Option<Box<dyn AddressSpace>>,
    ) -> Self {
        Self {
            id,
            name,
            status: AtomicU8::new(ThreadState::Blocked as u8),
            priority: AtomicI32::new(priority),
            approximate_burst: AtomicU64::new(approximate_burst),
            cur_cpu_burst: AtomicU64::new(0),
            aging: AtomicU64::new(0),
            context: spin::Mutex::new(SavedContext::default()),
            user_registers: spin::Mutex::new(UserRegisters::default()),
            stack: spin::Mutex::new(stack),
            space: spin::Mutex::new(space),
            released: AtomicBool::new(false),
        }
    }

    /// Get the thread's unique identifier.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the thread's current state.
    pub fn status(&self) -> ThreadState {
        ThreadState::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Set the thread's state.
    pub fn set_status(&self, status: ThreadState) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    /// Change the priority.
    ///
    /// Takes effect on the next admission; a queued thread is not moved.
    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    /// Estimated CPU ticks this thread runs before blocking.
    pub fn approximate_burst(&self) -> u64 {
        self.approximate_burst.load(Ordering::Acquire)
    }

    pub fn set_approximate_burst(&self, ticks: u64) {
        self.approximate_burst.store(ticks, Ordering::Release);
    }

    /// Ticks consumed since this thread last started running.
    pub fn cur_cpu_burst(&self) -> u64 {
        self.cur_cpu_burst.load(Ordering::Acquire)
    }

    pub fn set_cur_cpu_burst(&self, ticks: u64) {
        self.cur_cpu_burst.store(ticks, Ordering::Release);
    }

    /// Credit `ticks` of CPU time to the current burst.
    pub fn add_cpu_burst(&self, ticks: u64) {
        self.cur_cpu_burst.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Estimated ticks left in the current burst; negative once overrun.
    pub fn remaining_burst(&self) -> i64 {
        let estimate = i64::try_from(self.approximate_burst()).unwrap_or(i64::MAX);
        let used = i64::try_from(self.cur_cpu_burst()).unwrap_or(i64::MAX);
        estimate.saturating_sub(used)
    }

    /// Waiting credit accumulated in L2/L3.
    pub fn aging(&self) -> u64 {
        self.aging.load(Ordering::Acquire)
    }

    pub fn set_aging(&self, aging: u64) {
        self.aging.store(aging, Ordering::Release);
    }

    /// Lock the kernel execution context.
    ///
    /// Only the context-switch primitive and thread setup should need this.
    pub fn context(&self) -> spin::MutexGuard<'_, SavedContext> {
        self.context.lock()
    }

    /// Point the initial context at `entry`, running on `stack_top`.
    pub fn setup_initial_context(&self, entry: usize, stack_top: usize) {
        let mut ctx = self.context.lock();
        ctx.regs = [0; 12];
        ctx.sp = stack_top as u64;
        ctx.pc = entry as u64;
    }

    /// Copy of the saved user registers.
    pub fn user_registers(&self) -> UserRegisters {
        self.user_registers.lock().clone()
    }

    /// Whether the thread runs a user program in its own address space.
    pub fn has_address_space(&self) -> bool {
        self.space.lock().is_some()
    }

    /// Save user registers and address-space state before giving up the CPU.
    pub fn save_user_state<A: Arch + ?Sized>(&self, arch: &A) {
        let mut space = self.space.lock();
        if let Some(space) = space.as_mut() {
            arch.save_user_registers(&mut self.user_registers.lock());
            space.save_state();
        }
    }

    /// Restore user registers and address-space state after getting the CPU back.
    pub fn restore_user_state<A: Arch + ?Sized>(&self, arch: &A) {
        let mut space = self.space.lock();
        if let Some(space) = space.as_mut() {
            arch.restore_user_registers(&self.user_registers.lock());
            space.restore_state();
        }
    }

    /// Whether the stack canary is intact.
    ///
    /// Threads running on a stack they do not own (the boot thread) always pass.
    pub fn check_stack_overflow(&self) -> bool {
        self.stack.lock().as_ref().map_or(true, Stack::check_canary)
    }

    /// Run `f` on the thread's stack, if it has one.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut Stack) -> R) -> Option<R> {
        self.stack.lock().as_mut().map(f)
    }

    /// Free the stack and address space.
    ///
    /// Must only run once the processor is no longer executing on this
    /// thread's stack.
    pub(crate) fn release(&self) {
        self.stack.lock().take();
        self.space.lock().take();
        self.released.store(true, Ordering::Release);
    }

    /// Whether the thread has been torn down by deferred destruction.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("priority", &self.priority())
            .field("approximate_burst", &self.approximate_burst())
            .field("cur_cpu_burst", &self.cur_cpu_burst())
            .field("aging", &self.aging())
            .finish()
    }
}
