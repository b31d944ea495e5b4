//! Three-level feedback queue scheduler: state, admission and selection.
//!
//! L1 serves the shortest estimated burst and preempts, L2 serves the highest
//! priority and never preempts a running thread, L3 is round robin driven by
//! the timer. A non-empty higher band is always consulted first.

use super::band::{Band, L1_MIN_PRIORITY, L2_MIN_PRIORITY};
use super::destroy::DestroySlot;
use super::queue::{Fifo, HighestPriority, ReadyQueue, ShortestBurst};
use crate::arch::{Arch, IntOff};
use crate::config::SchedConfig;
use crate::errors::{fatal, ConfigResult, Fault};
use crate::thread::{ThreadId, ThreadRef, ThreadState};
use core::fmt;

/// Outcome of [`Scheduler::find_next_to_run`].
#[derive(Debug)]
pub enum Selection {
    /// Dispatch this thread; it has been removed from its queue
    Next(ThreadRef),
    /// Leave the current thread on the processor
    Current,
    /// Nothing can run, not even the current thread
    Idle,
}

impl Selection {
    /// The dequeued thread, if any.
    pub fn thread(&self) -> Option<&ThreadRef> {
        match self {
            Selection::Next(thread) => Some(thread),
            _ => None,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Selection::Current)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Selection::Idle)
    }
}

/// Scheduler state for the single processor.
///
/// Every operation takes `&mut self` and an [`IntOff`] token, so none of them
/// can run concurrently with another or call back into the scheduler.
pub struct Scheduler<A: Arch> {
    pub(super) arch: A,
    pub(super) config: SchedConfig,
    pub(super) l1: ReadyQueue<ShortestBurst>,
    pub(super) l2: ReadyQueue<HighestPriority>,
    pub(super) l3: ReadyQueue<Fifo>,
    pub(super) current: ThreadRef,
    pub(super) to_be_destroyed: DestroySlot,
}

impl<A: Arch> Scheduler<A> {
    /// Create a scheduler with `boot` as the running thread.
    pub fn new(arch: A, boot: ThreadRef) -> Self {
        boot.set_status(ThreadState::Running);
        Self {
            arch,
            config: SchedConfig::default(),
            l1: ReadyQueue::new(),
            l2: ReadyQueue::new(),
            l3: ReadyQueue::new(),
            current: boot,
            to_be_destroyed: DestroySlot::new(),
        }
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(arch: A, config: SchedConfig, boot: ThreadRef) -> ConfigResult<Self> {
        config.validate()?;
        let mut sched = Self::new(arch, boot);
        sched.config = config;
        Ok(sched)
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Thread currently owning the processor.
    pub fn current(&self) -> &ThreadRef {
        &self.current
    }

    pub fn l1(&self) -> &ReadyQueue<ShortestBurst> {
        &self.l1
    }

    pub fn l2(&self) -> &ReadyQueue<HighestPriority> {
        &self.l2
    }

    pub fn l3(&self) -> &ReadyQueue<Fifo> {
        &self.l3
    }

    /// Thread waiting for deferred destruction.
    pub fn pending_destruction(&self) -> Option<&ThreadRef> {
        self.to_be_destroyed.pending()
    }

    /// Band whose queue holds the thread with `id`.
    pub fn queue_of(&self, id: ThreadId) -> Option<Band> {
        if self.l1.contains(id) {
            Some(Band::L1)
        } else if self.l2.contains(id) {
            Some(Band::L2)
        } else if self.l3.contains(id) {
            Some(Band::L3)
        } else {
            None
        }
    }

    /// Number of threads in all ready queues.
    pub fn ready_count(&self) -> usize {
        self.l1.len() + self.l2.len() + self.l3.len()
    }

    /// Mark `thread` ready and queue it in the band its priority maps to.
    ///
    /// The aging credit is kept. A priority outside [0, 150) is fatal.
    pub fn ready_to_run(&mut self, thread: ThreadRef, token: &IntOff) {
        token.check(&self.arch);
        thread.set_status(ThreadState::Ready);

        let band = match Band::of(thread.priority()) {
            Some(band) => band,
            None => fatal(Fault::InvalidPriority {
                thread: thread.id(),
                priority: thread.priority(),
            }),
        };
        self.enqueue(band, thread);
    }

    /// Insert into `band`'s queue with that queue's ordering.
    pub(super) fn enqueue(&mut self, band: Band, thread: ThreadRef) {
        log::debug!(
            "Tick [{}]: Thread [{}] is inserted into queue {} // {}",
            self.arch.total_ticks(),
            thread.id(),
            band,
            thread.name()
        );
        match band {
            Band::L1 => self.l1.insert(thread),
            Band::L2 => self.l2.insert(thread),
            Band::L3 => self.l3.append(thread),
        }
    }

    /// Decide who runs next.
    ///
    /// The current thread counts as still wanting the processor only while its
    /// status is `Running`; callers that block, finish or yield update the
    /// status (or not) before calling.
    pub fn find_next_to_run(&mut self, token: &IntOff) -> Selection {
        token.check(&self.arch);
        let current_running = self.current.status() == ThreadState::Running;

        if let Some(front) = self.l1.peek_front() {
            let preempt = !current_running
                || self.current.priority() < L1_MIN_PRIORITY
                || self.current.approximate_burst()
                    > self
                        .current
                        .cur_cpu_burst()
                        .saturating_add(front.approximate_burst());
            return if preempt {
                self.dequeue(Band::L1)
            } else {
                self.keep_current(Band::L1)
            };
        }

        if !self.l2.is_empty() {
            return if !current_running {
                self.dequeue(Band::L2)
            } else {
                self.keep_current(Band::L2)
            };
        }

        if !self.l3.is_empty() {
            let round_robin =
                self.arch.timer_interrupt() && self.current.priority() < L2_MIN_PRIORITY;
            return if round_robin || !current_running {
                self.dequeue(Band::L3)
            } else {
                self.keep_current(Band::L3)
            };
        }

        if current_running {
            Selection::Current
        } else {
            Selection::Idle
        }
    }

    fn dequeue(&mut self, band: Band) -> Selection {
        let next = match band {
            Band::L1 => self.l1.remove_front(),
            Band::L2 => self.l2.remove_front(),
            Band::L3 => self.l3.remove_front(),
        };
        let Some(next) = next else {
            return Selection::Current;
        };
        next.set_aging(0);

        let tick = self.arch.total_ticks();
        log::debug!(
            "Tick [{}]: Thread [{}] is removed from queue {} // {}",
            tick,
            next.id(),
            band,
            next.name()
        );
        log::debug!(
            "Tick [{}]: Thread [{}] is now selected for execution // {}",
            tick,
            next.id(),
            next.name()
        );
        Selection::Next(next)
    }

    fn keep_current(&self, band: Band) -> Selection {
        log::trace!(
            "Tick [{}]: Thread [{}] keeps running over queue {}",
            self.arch.total_ticks(),
            self.current.id(),
            band
        );
        Selection::Current
    }

    /// Log the ready queues.
    pub fn print(&self) {
        log::info!("{}", self);
    }
}

impl<A: Arch> fmt::Display for Scheduler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ready list contents:")?;
        writeln!(f, "L1: {}", self.l1)?;
        writeln!(f, "L2: {}", self.l2)?;
        write!(f, "L3: {}", self.l3)
    }
}
