//! Aging sweep.
//!
//! Threads waiting in L2 and L3 accumulate credit on every sweep. Each full
//! threshold of credit converts into a priority bump; a thread whose priority
//! crosses into the next band moves to that band's queue. L1 is the top band
//! and is left alone.

use super::band::{Band, MAX_PRIORITY};
use super::mlfq::Scheduler;
use super::queue::ReadyQueue;
use crate::arch::{Arch, IntOff};
use crate::config::SchedConfig;
use crate::thread::Thread;

impl<A: Arch> Scheduler<A> {
    /// Age every thread in L2, then every thread in L3.
    ///
    /// Priority only grows (capped at 149), so a thread either stays in its
    /// band or moves up. Each level is rebuilt into a fresh queue that
    /// replaces the old one in a single assignment.
    pub fn aging(&mut self, token: &IntOff) {
        token.check(&self.arch);
        let tick = self.arch.total_ticks();

        let mut l2 = ReadyQueue::new();
        for thread in self.l2.drain() {
            age(&self.config, &thread, tick);
            match Band::of(thread.priority()) {
                Some(Band::L2) => l2.insert(thread),
                _ => {
                    log_move(tick, &thread, Band::L2, Band::L1);
                    self.l1.insert(thread);
                }
            }
        }
        self.l2 = l2;

        let mut l3 = ReadyQueue::new();
        for thread in self.l3.drain() {
            age(&self.config, &thread, tick);
            match Band::of(thread.priority()) {
                Some(Band::L3) => l3.append(thread),
                Some(Band::L2) => {
                    log_move(tick, &thread, Band::L3, Band::L2);
                    self.l2.insert(thread);
                }
                _ => {
                    log_move(tick, &thread, Band::L3, Band::L1);
                    self.l1.insert(thread);
                }
            }
        }
        self.l3 = l3;
    }
}

fn log_move(tick: u64, thread: &Thread, from: Band, to: Band) {
    log::debug!(
        "Tick [{}]: Thread [{}] is removed from queue {} // {}",
        tick,
        thread.id(),
        from,
        thread.name()
    );
    log::debug!(
        "Tick [{}]: Thread [{}] is inserted into queue {} // {}",
        tick,
        thread.id(),
        to,
        thread.name()
    );
}

/// Credit one sweep to `thread` and convert full thresholds into priority.
fn age(config: &SchedConfig, thread: &Thread, tick: u64) {
    let mut aging = thread.aging() + config.aging_step;
    let bumps = aging / config.aging_threshold;
    if bumps > 0 {
        let old = thread.priority();
        let raised = i64::from(old) + i64::from(config.aging_bonus) * bumps as i64;
        let new = raised.min(i64::from(MAX_PRIORITY - 1)) as i32;
        log::debug!(
            "Tick [{}]: Thread [{}] changes its priority from [{}] to [{}] // {}",
            tick,
            thread.id(),
            old,
            new,
            thread.name()
        );
        thread.set_priority(new);
        aging -= config.aging_threshold * bumps;
    }
    thread.set_aging(aging);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::SimArch;
    use crate::thread::{ThreadBuilder, ThreadId, ThreadRef};

    fn thread(id: u64, priority: i32, burst: u64) -> ThreadRef {
        ThreadBuilder::new()
            .priority(priority)
            .approximate_burst(burst)
            .build(ThreadId::new(id))
    }

    fn scheduler() -> (Scheduler<SimArch>, IntOff) {
        let sched = Scheduler::new(SimArch::new(), thread(1, 120, 1000));
        let token = IntOff::assert(sched.arch());
        (sched, token)
    }

    #[test]
    fn test_step_below_threshold() {
        let (mut sched, token) = scheduler();
        let t = thread(2, 60, 0);
        sched.ready_to_run(t.clone(), &token);

        sched.aging(&token);
        assert_eq!(t.aging(), 100);
        assert_eq!(t.priority(), 60);
    }

    #[test]
    fn test_threshold_bumps_priority() {
        let (mut sched, token) = scheduler();
        let t = thread(2, 60, 0);
        t.set_aging(1500);
        sched.ready_to_run(t.clone(), &token);

        sched.aging(&token);
        assert_eq!(t.priority(), 70);
        assert_eq!(t.aging(), 100);
        assert_eq!(sched.l2().ids(), [t.id()]);
    }

    #[test]
    fn test_multiple_thresholds_at_once() {
        let (mut sched, token) = scheduler();
        let t = thread(2, 0, 0);
        t.set_aging(3000);
        sched.ready_to_run(t.clone(), &token);

        sched.aging(&token);
        assert_eq!(t.priority(), 20);
        assert_eq!(t.aging(), 100);
    }

    #[test]
    fn test_l3_promoted_to_l2() {
        let (mut sched, token) = scheduler();
        let t = thread(2, 45, 0);
        t.set_aging(1400);
        sched.ready_to_run(t.clone(), &token);
        sched.ready_to_run(thread(3, 80, 0), &token);
        sched.ready_to_run(thread(4, 52, 0), &token);

        sched.aging(&token);
        assert_eq!(t.priority(), 55);
        assert_eq!(sched.l2().ids(), [ThreadId::new(3), t.id(), ThreadId::new(4)]);
        assert!(sched.l3().is_empty());
    }

    #[test]
    fn test_l3_stays_fifo() {
        let (mut sched, token) = scheduler();
        for (id, aging) in [(2, 0), (3, 1400), (4, 700)] {
            let t = thread(id, 10, 0);
            t.set_aging(aging);
            sched.ready_to_run(t, &token);
        }

        sched.aging(&token);
        assert_eq!(
            sched.l3().ids(),
            [ThreadId::new(2), ThreadId::new(3), ThreadId::new(4)]
        );
    }

    #[test]
    fn test_l2_reordered_after_bump() {
        let (mut sched, token) = scheduler();
        let low = thread(2, 60, 0);
        low.set_aging(1400);
        sched.ready_to_run(thread(3, 65, 0), &token);
        sched.ready_to_run(low.clone(), &token);
        assert_eq!(sched.l2().ids(), [ThreadId::new(3), low.id()]);

        sched.aging(&token);
        assert_eq!(sched.l2().ids(), [low.id(), ThreadId::new(3)]);
        assert!(sched.l2().is_ordered());
    }

    #[test]
    fn test_l1_untouched() {
        let (mut sched, token) = scheduler();
        let a = thread(2, 100, 7);
        let b = thread(3, 140, 3);
        a.set_aging(1450);
        sched.ready_to_run(a.clone(), &token);
        sched.ready_to_run(b.clone(), &token);

        for _ in 0..20 {
            sched.aging(&token);
        }
        assert_eq!(sched.l1().ids(), [b.id(), a.id()]);
        assert_eq!(a.aging(), 1450);
        assert_eq!(a.priority(), 100);
    }

    #[test]
    fn test_priority_capped() {
        let config = SchedConfig::new().aging_bonus(100);
        let mut sched =
            Scheduler::with_config(SimArch::new(), config, thread(1, 120, 1000)).unwrap();
        let token = IntOff::assert(sched.arch());
        let t = thread(2, 90, 0);
        t.set_aging(1400);
        sched.ready_to_run(t.clone(), &token);

        sched.aging(&token);
        assert_eq!(t.priority(), MAX_PRIORITY - 1);
        assert_eq!(sched.l1().ids(), [t.id()]);
    }
}
