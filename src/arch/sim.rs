//! In-memory machine for host-side runs and tests.
//!
//! `SimArch` keeps the interrupt level, the timer flag and the tick counter
//! in atomics and records every context switch instead of performing it. A
//! recorded switch returns immediately, which is exactly what the dispatcher
//! observes when the outgoing thread is later switched back to.

use super::{Arch, SavedContext, UserRegisters};
use crate::thread::{Thread, ThreadId};
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

extern crate alloc;
use alloc::vec::Vec;

/// One recorded context switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRecord {
    /// Outgoing thread
    pub from: ThreadId,
    /// Incoming thread
    pub to: ThreadId,
    /// Context the incoming thread resumed with
    pub resumed: SavedContext,
}

/// Simulated uniprocessor.
pub struct SimArch {
    interrupts: AtomicBool,
    timer: AtomicBool,
    ticks: AtomicU64,
    registers: spin::Mutex<UserRegisters>,
    switches: spin::Mutex<Vec<SwitchRecord>>,
    register_saves: AtomicUsize,
    register_restores: AtomicUsize,
}

impl SimArch {
    /// A machine at tick 0 with interrupts disabled, as at boot.
    pub fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(false),
            timer: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            registers: spin::Mutex::new(UserRegisters::default()),
            switches: spin::Mutex::new(Vec::new()),
            register_saves: AtomicUsize::new(0),
            register_restores: AtomicUsize::new(0),
        }
    }

    /// Advance the clock.
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Mark whether the event being handled is a timer interrupt.
    pub fn set_timer_interrupt(&self, fired: bool) {
        self.timer.store(fired, Ordering::Release);
    }

    /// Every switch performed so far.
    pub fn switches(&self) -> Vec<SwitchRecord> {
        self.switches.lock().clone()
    }

    /// `(saves, restores)` of user registers so far.
    pub fn register_traffic(&self) -> (usize, usize) {
        (
            self.register_saves.load(Ordering::Acquire),
            self.register_restores.load(Ordering::Acquire),
        )
    }

    /// Overwrite the machine's user registers.
    pub fn load_registers(&self, regs: UserRegisters) {
        *self.registers.lock() = regs;
    }

    /// Current machine user registers.
    pub fn registers(&self) -> UserRegisters {
        self.registers.lock().clone()
    }
}

impl Default for SimArch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for SimArch {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::Acquire)
    }

    fn set_interrupts(&self, enabled: bool) -> bool {
        self.interrupts.swap(enabled, Ordering::AcqRel)
    }

    fn timer_interrupt(&self) -> bool {
        self.timer.load(Ordering::Acquire)
    }

    fn total_ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    unsafe fn context_switch(&self, prev: &Thread, next: &Thread) {
        let resumed = next.context().clone();
        self.switches.lock().push(SwitchRecord {
            from: prev.id(),
            to: next.id(),
            resumed,
        });
    }

    fn save_user_registers(&self, regs: &mut UserRegisters) {
        *regs = self.registers.lock().clone();
        self.register_saves.fetch_add(1, Ordering::AcqRel);
    }

    fn restore_user_registers(&self, regs: &UserRegisters) {
        *self.registers.lock() = regs.clone();
        self.register_restores.fetch_add(1, Ordering::AcqRel);
    }

    fn idle(&self) {
        // No device model: with nothing runnable and no pending interrupt
        // the simulated machine halts.
        panic!("machine halted: no runnable thread at tick {}", self.total_ticks());
    }
}
