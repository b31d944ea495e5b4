#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! CPU scheduling core for a uniprocessor teaching kernel.
//!
//! Threads are queued in one of three feedback levels according to their
//! priority, and the level decides the service order:
//!
//! - **L1** (priority 100..150): shortest estimated burst first, preemptive
//! - **L2** (priority 50..100): highest priority first, never preempts
//! - **L3** (priority 0..50): round robin on timer interrupts
//!
//! Waiting threads in L2 and L3 are aged so they climb towards L1. A thread
//! that finishes is destroyed only after the processor has switched away from
//! its stack.
//!
//! The machine is abstracted behind [`Arch`]; [`SimArch`] is an in-memory
//! implementation used for host-side runs and tests. Logging goes through the
//! [`log`] facade, the embedding kernel installs a logger.
//!
//! # Quick Start
//!
//! ```
//! use mlfq_threads::{Kernel, SimArch, ThreadBuilder};
//!
//! let mut kernel = Kernel::new(SimArch::new(), ThreadBuilder::new().name("main").priority(60));
//! let worker = kernel.spawn(ThreadBuilder::new().name("worker").priority(120).approximate_burst(5));
//!
//! // The L1 thread preempts the L2 boot thread.
//! kernel.yield_now();
//! assert_eq!(kernel.current().id(), worker.id());
//! ```

pub mod arch;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod mem;
pub mod sched;
pub mod thread;

#[cfg(test)]
mod tests;

extern crate alloc;

// Panic handler for bare-metal
#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    // Faults have already been logged by `errors::fatal`; park the core.
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Machine abstraction
pub use arch::{Arch, IntOff, SimArch};

// Kernel
pub use kernel::{Kernel, Waker};

// Scheduler
pub use sched::{Band, Scheduler, Selection};

// Threads
pub use thread::{Thread, ThreadBuilder, ThreadId, ThreadRef, ThreadState};

// Configuration
pub use config::SchedConfig;

// Errors
pub use errors::{fatal, ConfigError, ConfigResult, Fault};
