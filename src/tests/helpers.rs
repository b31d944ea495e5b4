//! Test helper utilities and common functionality.

use crate::arch::{IntOff, SimArch};
use crate::sched::Scheduler;
use crate::thread::{ThreadBuilder, ThreadId, ThreadRef};
use portable_atomic::{AtomicU64, Ordering};

/// Test thread factory handing out consecutive ids.
pub(crate) struct TestThreadFactory {
    next_id: AtomicU64,
}

impl TestThreadFactory {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Thread named `t<id>` with the given priority and burst estimate.
    pub(crate) fn thread(&self, priority: i32, burst: u64) -> ThreadRef {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        ThreadBuilder::new()
            .name(format!("t{}", id))
            .priority(priority)
            .approximate_burst(burst)
            .build(ThreadId::new(id))
    }

    /// Scheduler booted on a fresh thread, plus a token for it.
    pub(crate) fn scheduler(&self, priority: i32, burst: u64) -> (Scheduler<SimArch>, IntOff) {
        let sched = Scheduler::new(SimArch::new(), self.thread(priority, burst));
        let token = IntOff::assert(sched.arch());
        (sched, token)
    }
}

/// Ids as plain numbers, for compact assertions.
pub(crate) fn raw_ids(ids: impl IntoIterator<Item = ThreadId>) -> Vec<usize> {
    ids.into_iter().map(ThreadId::get).collect()
}

struct CaptureLogger;

std::thread_local! {
    static CAPTURED: std::cell::RefCell<Vec<String>> = std::cell::RefCell::new(Vec::new());
}

impl log::Log for CaptureLogger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        CAPTURED.with(|lines| lines.borrow_mut().push(record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Run `f` and return the log lines it emitted on this test thread.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
    static INSTALL: std::sync::Once = std::sync::Once::new();
    INSTALL.call_once(|| {
        // Another logger already installed only means nothing is captured.
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Trace);
    });

    CAPTURED.with(|lines| lines.borrow_mut().clear());
    let result = f();
    let lines = CAPTURED.with(|lines| lines.borrow_mut().drain(..).collect());
    (result, lines)
}
