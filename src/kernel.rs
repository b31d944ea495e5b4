//! Kernel event driver.
//!
//! [`Kernel`] is the glue between thread-level events and the scheduler.
//! Each entry point disables interrupts, obtains the [`IntOff`] token, runs
//! the admission / selection / dispatch sequence the event calls for, and
//! restores the previous interrupt level.

use crate::arch::{Arch, IntOff};
use crate::config::SchedConfig;
use crate::errors::ConfigResult;
use crate::sched::{Scheduler, Selection};
use crate::thread::{ThreadBuilder, ThreadId, ThreadRef, ThreadState};
use portable_atomic::{AtomicUsize, Ordering};

extern crate alloc;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Threads made ready from interrupt context, admitted at the next entry point.
type Inbox = Arc<spin::Mutex<Vec<ThreadRef>>>;

/// Handle for waking threads from outside the kernel's borrow.
///
/// Interrupt handlers (and [`Arch::idle`]) cannot reach the [`Kernel`] while
/// it is driving a scheduling sequence. They hand woken threads to a `Waker`
/// instead; the kernel admits them before its next selection.
///
/// Call with interrupts disabled or from interrupt context.
#[derive(Clone)]
pub struct Waker {
    inbox: Inbox,
}

impl Waker {
    /// Queue a blocked thread for admission.
    pub fn wake(&self, thread: ThreadRef) {
        self.inbox.lock().push(thread);
    }

    /// Number of threads waiting for admission.
    pub fn pending(&self) -> usize {
        self.inbox.lock().len()
    }
}

/// Main kernel handle that drives the scheduler.
///
/// # Type Parameters
///
/// * `A` - Machine implementation
pub struct Kernel<A: Arch> {
    /// Scheduler instance
    scheduler: Scheduler<A>,
    /// Next thread ID to assign
    next_thread_id: AtomicUsize,
    /// Tick count up to which CPU time has been charged to a thread
    last_charge: u64,
    /// Tick count at the previous timer interrupt
    last_timer: u64,
    /// Ticks not yet converted into aging sweeps
    aging_credit: u64,
    /// Threads woken through a [`Waker`]
    inbox: Inbox,
}

impl<A: Arch> Kernel<A> {
    /// Boot the kernel: the thread described by `boot` becomes current.
    pub fn new(arch: A, boot: ThreadBuilder) -> Self {
        let next_thread_id = AtomicUsize::new(1); // Start from 1, never use 0
        let boot = boot.build(take_id(&next_thread_id));
        Self::assemble(Scheduler::new(arch, boot), next_thread_id)
    }

    /// Boot with a custom scheduler configuration.
    pub fn with_config(arch: A, config: SchedConfig, boot: ThreadBuilder) -> ConfigResult<Self> {
        let next_thread_id = AtomicUsize::new(1);
        let boot = boot.build(take_id(&next_thread_id));
        let scheduler = Scheduler::with_config(arch, config, boot)?;
        Ok(Self::assemble(scheduler, next_thread_id))
    }

    fn assemble(scheduler: Scheduler<A>, next_thread_id: AtomicUsize) -> Self {
        let now = scheduler.arch().total_ticks();
        Self {
            scheduler,
            next_thread_id,
            last_charge: now,
            last_timer: now,
            aging_credit: 0,
            inbox: Arc::new(spin::Mutex::new(Vec::new())),
        }
    }

    /// Generate a new unique thread ID.
    pub fn next_thread_id(&self) -> ThreadId {
        take_id(&self.next_thread_id)
    }

    pub fn scheduler(&self) -> &Scheduler<A> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<A> {
        &mut self.scheduler
    }

    pub fn arch(&self) -> &A {
        self.scheduler.arch()
    }

    /// Thread currently owning the processor.
    pub fn current(&self) -> &ThreadRef {
        self.scheduler.current()
    }

    /// Handle for waking threads from interrupt context.
    pub fn waker(&self) -> Waker {
        Waker {
            inbox: Arc::clone(&self.inbox),
        }
    }

    /// Charge the ticks since the last accounting point to the current thread.
    fn charge_elapsed(&mut self) {
        let now = self.arch().total_ticks();
        let elapsed = now.saturating_sub(self.last_charge);
        self.last_charge = now;
        self.current().add_cpu_burst(elapsed);
    }

    /// Admit everything handed to a [`Waker`] since the last entry point.
    fn admit_woken(&mut self) {
        let inbox = Arc::clone(&self.inbox);
        self.with_scheduler(|sched, token| {
            let woken = core::mem::take(&mut *inbox.lock());
            for thread in woken {
                check_wakeable(&thread);
                sched.ready_to_run(thread, token);
            }
        });
    }

    /// Run `f` on the scheduler with interrupts disabled.
    fn with_scheduler<R>(&mut self, f: impl FnOnce(&mut Scheduler<A>, &IntOff) -> R) -> R {
        let was_enabled = self.scheduler.arch().set_interrupts(false);
        let token = IntOff::assert(self.scheduler.arch());
        let result = f(&mut self.scheduler, &token);
        self.scheduler.arch().set_interrupts(was_enabled);
        result
    }

    /// Build a thread with a fresh id and make it ready.
    pub fn spawn(&mut self, builder: ThreadBuilder) -> ThreadRef {
        let thread = builder.build(self.next_thread_id());
        log::debug!(
            "Spawned thread [{}] // {} priority {} burst {}",
            thread.id(),
            thread.name(),
            thread.priority(),
            thread.approximate_burst()
        );
        let queued = thread.clone();
        self.with_scheduler(|sched, token| sched.ready_to_run(queued, token));
        thread
    }

    /// Make a blocked thread ready again.
    pub fn wake(&mut self, thread: ThreadRef) {
        check_wakeable(&thread);
        self.with_scheduler(|sched, token| sched.ready_to_run(thread, token));
    }

    /// Offer the processor to the scheduler while staying runnable.
    ///
    /// The current thread keeps the processor unless the selection policy
    /// prefers a queued thread, in which case it is re-admitted and the
    /// processor is dispatched.
    pub fn yield_now(&mut self) {
        self.charge_elapsed();
        self.admit_woken();
        self.with_scheduler(|sched, token| {
            if let Selection::Next(next) = sched.find_next_to_run(token) {
                let current = sched.current().clone();
                sched.ready_to_run(current, token);
                sched.run(next, false, token);
            }
        });
    }

    /// Give up the processor until woken (or for good, with `finishing`).
    ///
    /// A blocking thread's burst estimate is refreshed from the burst it just
    /// completed. While nothing is runnable the machine idles with the
    /// caller's interrupt level restored, so pending interrupts can wake a
    /// thread through a [`Waker`].
    pub fn sleep(&mut self, finishing: bool) {
        self.charge_elapsed();
        self.with_scheduler(|sched, _token| {
            let current = sched.current();
            if finishing {
                current.set_status(ThreadState::Finished);
                return;
            }
            let estimate = sched
                .config()
                .estimate_burst(current.approximate_burst(), current.cur_cpu_burst());
            log::debug!(
                "Tick [{}]: Thread [{}] burst estimate {} -> {} (measured {}) // {}",
                sched.arch().total_ticks(),
                current.id(),
                current.approximate_burst(),
                estimate,
                current.cur_cpu_burst(),
                current.name()
            );
            current.set_approximate_burst(estimate);
            current.set_status(ThreadState::Blocked);
        });

        loop {
            self.admit_woken();
            let dispatched = self.with_scheduler(|sched, token| {
                match sched.find_next_to_run(token) {
                    Selection::Next(next) => {
                        sched.run(next, finishing, token);
                        true
                    }
                    Selection::Idle => false,
                    Selection::Current => unreachable!(
                        "selection kept thread [{}] that is not running",
                        sched.current().id()
                    ),
                }
            });
            if dispatched {
                return;
            }
            log::trace!("Tick [{}]: no runnable thread, idling", self.arch().total_ticks());
            self.arch().idle();
        }
    }

    /// Terminate the current thread.
    pub fn finish(&mut self) {
        self.sleep(true);
    }

    /// Timer interrupt entry point.
    ///
    /// Charges the elapsed ticks to the current thread, runs one aging sweep
    /// per elapsed aging interval, then yields.
    pub fn on_timer_interrupt(&mut self) {
        self.charge_elapsed();
        let now = self.arch().total_ticks();
        let elapsed = now.saturating_sub(self.last_timer);
        self.last_timer = now;

        let interval = self.scheduler.config().aging_interval_ticks;
        self.aging_credit += elapsed;
        let sweeps = self.aging_credit / interval;
        self.aging_credit %= interval;

        self.with_scheduler(|sched, token| {
            for _ in 0..sweeps {
                sched.aging(token);
            }
        });
        self.yield_now();
    }
}

fn check_wakeable(thread: &ThreadRef) {
    debug_assert_eq!(
        thread.status(),
        ThreadState::Blocked,
        "thread [{}] woken while not blocked",
        thread.id()
    );
}

fn take_id(counter: &AtomicUsize) -> ThreadId {
    ThreadId::new(counter.fetch_add(1, Ordering::AcqRel) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::SimArch;
    use crate::errors::ConfigError;
    use crate::sched::Band;

    fn kernel(priority: i32, burst: u64) -> Kernel<SimArch> {
        Kernel::new(
            SimArch::new(),
            ThreadBuilder::new().name("main").priority(priority).approximate_burst(burst),
        )
    }

    #[test]
    fn test_boot_thread_gets_first_id() {
        let kernel = kernel(60, 0);
        assert_eq!(kernel.current().id(), ThreadId::new(1));
        assert_eq!(kernel.current().status(), ThreadState::Running);
        assert_eq!(kernel.next_thread_id(), ThreadId::new(2));
        assert_eq!(kernel.next_thread_id(), ThreadId::new(3));
    }

    #[test]
    fn test_with_config_rejects_bad_weight() {
        let config = SchedConfig::new().burst_weight_percent(101);
        let result = Kernel::with_config(SimArch::new(), config, ThreadBuilder::new());
        assert!(matches!(result, Err(ConfigError::InvalidBurstWeight(101))));
    }

    #[test]
    fn test_spawn_admits_and_restores_interrupts() {
        let mut kernel = kernel(60, 0);
        kernel.arch().set_interrupts(true);

        let t = kernel.spawn(ThreadBuilder::new().priority(120).approximate_burst(5));

        assert_eq!(t.id(), ThreadId::new(2));
        assert_eq!(t.status(), ThreadState::Ready);
        assert_eq!(kernel.scheduler().queue_of(t.id()), Some(Band::L1));
        assert!(kernel.arch().interrupts_enabled());
    }

    #[test]
    fn test_wake_requeues_blocked_thread() {
        let mut kernel = kernel(60, 0);
        let t = ThreadBuilder::new().priority(10).build(kernel.next_thread_id());
        assert_eq!(t.status(), ThreadState::Blocked);

        kernel.wake(t.clone());
        assert_eq!(t.status(), ThreadState::Ready);
        assert_eq!(kernel.scheduler().queue_of(t.id()), Some(Band::L3));
    }

    #[test]
    fn test_yield_preempted_by_l1() {
        let mut kernel = kernel(60, 0);
        let boot = kernel.current().clone();
        let t = kernel.spawn(ThreadBuilder::new().priority(120).approximate_burst(5));

        kernel.yield_now();

        assert!(Arc::ptr_eq(kernel.current(), &t));
        assert_eq!(boot.status(), ThreadState::Ready);
        assert_eq!(kernel.scheduler().queue_of(boot.id()), Some(Band::L2));
        assert_eq!(kernel.arch().switches().len(), 1);
    }

    #[test]
    fn test_yield_keeps_processor_over_l2() {
        let mut kernel = kernel(60, 0);
        kernel.spawn(ThreadBuilder::new().priority(90));

        kernel.yield_now();

        assert_eq!(kernel.current().id(), ThreadId::new(1));
        assert!(kernel.arch().switches().is_empty());
    }

    #[test]
    fn test_sleep_updates_burst_estimate() {
        let mut kernel = kernel(60, 10);
        let boot = kernel.current().clone();
        boot.add_cpu_burst(30);
        let t = kernel.spawn(ThreadBuilder::new().priority(70));

        kernel.sleep(false);

        assert_eq!(boot.approximate_burst(), 20);
        assert_eq!(boot.status(), ThreadState::Blocked);
        assert!(Arc::ptr_eq(kernel.current(), &t));
        assert_eq!(kernel.scheduler().queue_of(boot.id()), None);
    }

    #[test]
    fn test_finish_destroys_thread() {
        let mut kernel = kernel(60, 0);
        let boot = kernel.current().clone();
        let t = kernel.spawn(ThreadBuilder::new().priority(30).stack_words(64));

        kernel.finish();

        assert!(Arc::ptr_eq(kernel.current(), &t));
        assert!(boot.is_released());
        assert_eq!(boot.status(), ThreadState::Finished);
        assert!(kernel.scheduler().pending_destruction().is_none());
    }

    #[test]
    #[should_panic(expected = "machine halted")]
    fn test_sleep_with_nothing_runnable_idles() {
        let mut kernel = kernel(60, 0);
        kernel.sleep(false);
    }

    #[test]
    fn test_timer_charges_ticks_and_ages() {
        let mut kernel = kernel(120, 1000);
        let t = kernel.spawn(ThreadBuilder::new().priority(60));
        t.set_aging(1450);

        kernel.arch().advance(250);
        kernel.on_timer_interrupt();

        assert_eq!(kernel.current().cur_cpu_burst(), 250);
        assert_eq!(t.priority(), 70);
        assert_eq!(t.aging(), 150);

        kernel.arch().advance(30);
        kernel.on_timer_interrupt();
        assert_eq!(t.aging(), 150);

        kernel.arch().advance(20);
        kernel.on_timer_interrupt();
        assert_eq!(t.aging(), 250);
        assert_eq!(kernel.current().id(), ThreadId::new(1));
    }

    #[test]
    fn test_timer_round_robin_in_l3() {
        let mut kernel = kernel(20, 0);
        let boot = kernel.current().clone();
        let t = kernel.spawn(ThreadBuilder::new().priority(30));
        kernel.arch().set_timer_interrupt(true);

        kernel.arch().advance(10);
        kernel.on_timer_interrupt();
        assert!(Arc::ptr_eq(kernel.current(), &t));
        assert_eq!(kernel.scheduler().l3().ids(), [boot.id()]);

        kernel.arch().advance(10);
        kernel.on_timer_interrupt();
        assert!(Arc::ptr_eq(kernel.current(), &boot));
        assert_eq!(kernel.scheduler().l3().ids(), [t.id()]);
        assert_eq!(kernel.arch().switches().len(), 2);
    }

    /// Machine whose idle hook delivers one wakeup, as a device interrupt would.
    struct WakingArch {
        sim: SimArch,
        on_idle: spin::Mutex<Option<(Waker, ThreadRef)>>,
        idles: AtomicUsize,
    }

    impl WakingArch {
        fn new() -> Self {
            Self {
                sim: SimArch::new(),
                on_idle: spin::Mutex::new(None),
                idles: AtomicUsize::new(0),
            }
        }
    }

    impl Arch for WakingArch {
        fn interrupts_enabled(&self) -> bool {
            self.sim.interrupts_enabled()
        }

        fn set_interrupts(&self, enabled: bool) -> bool {
            self.sim.set_interrupts(enabled)
        }

        fn timer_interrupt(&self) -> bool {
            self.sim.timer_interrupt()
        }

        fn total_ticks(&self) -> u64 {
            self.sim.total_ticks()
        }

        unsafe fn context_switch(&self, prev: &crate::thread::Thread, next: &crate::thread::Thread) {
            // SAFETY: forwarded unchanged from the caller.
            unsafe { self.sim.context_switch(prev, next) }
        }

        fn save_user_registers(&self, regs: &mut crate::arch::UserRegisters) {
            self.sim.save_user_registers(regs);
        }

        fn restore_user_registers(&self, regs: &crate::arch::UserRegisters) {
            self.sim.restore_user_registers(regs);
        }

        fn idle(&self) {
            self.idles.fetch_add(1, Ordering::SeqCst);
            self.sim.advance(5);
            match self.on_idle.lock().take() {
                Some((waker, thread)) => waker.wake(thread),
                None => self.sim.idle(),
            }
        }
    }

    #[test]
    fn test_block_charges_burst_before_estimate() {
        let mut kernel = kernel(60, 0);
        let boot = kernel.current().clone();
        let t = kernel.spawn(ThreadBuilder::new().priority(70));

        kernel.arch().advance(90);
        kernel.sleep(false);
        assert_eq!(boot.approximate_burst(), 45);
        assert!(Arc::ptr_eq(kernel.current(), &t));

        kernel.arch().advance(10);
        kernel.on_timer_interrupt();
        assert_eq!(t.cur_cpu_burst(), 10);
    }

    #[test]
    fn test_yield_charges_outgoing_thread() {
        let mut kernel = kernel(60, 0);
        let boot = kernel.current().clone();
        let t = kernel.spawn(ThreadBuilder::new().priority(120).approximate_burst(5));

        kernel.arch().advance(40);
        kernel.yield_now();
        assert!(Arc::ptr_eq(kernel.current(), &t));
        assert_eq!(boot.cur_cpu_burst(), 40);

        kernel.arch().advance(3);
        kernel.on_timer_interrupt();
        assert_eq!(t.cur_cpu_burst(), 3);
        assert_eq!(boot.cur_cpu_burst(), 40);
    }

    #[test]
    fn test_sleep_idles_until_woken() {
        let mut kernel = Kernel::new(WakingArch::new(), ThreadBuilder::new().priority(60));
        let boot = kernel.current().clone();
        let t = ThreadBuilder::new().priority(70).build(kernel.next_thread_id());
        *kernel.arch().on_idle.lock() = Some((kernel.waker(), t.clone()));

        kernel.sleep(false);

        assert!(Arc::ptr_eq(kernel.current(), &t));
        assert_eq!(t.status(), ThreadState::Running);
        assert_eq!(boot.status(), ThreadState::Blocked);
        assert_eq!(kernel.arch().idles.load(Ordering::SeqCst), 1);
        assert!(!kernel.arch().interrupts_enabled());
    }

    #[test]
    fn test_waker_admitted_at_yield() {
        let mut kernel = kernel(60, 0);
        let waker = kernel.waker();
        let t = ThreadBuilder::new().priority(130).approximate_burst(2).build(kernel.next_thread_id());

        waker.wake(t.clone());
        assert_eq!(waker.pending(), 1);
        assert_eq!(kernel.scheduler().ready_count(), 0);

        kernel.yield_now();
        assert_eq!(waker.pending(), 0);
        assert!(Arc::ptr_eq(kernel.current(), &t));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "woken while not blocked")]
    fn test_waking_running_thread_rejected() {
        let mut kernel = kernel(60, 0);
        let boot = kernel.current().clone();
        kernel.wake(boot);
    }
}
