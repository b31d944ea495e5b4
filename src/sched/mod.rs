//! Thread scheduler.
//!
//! A three-level feedback queue: admission ([`Scheduler::ready_to_run`]),
//! selection ([`Scheduler::find_next_to_run`]), dispatch with deferred
//! destruction ([`Scheduler::run`], [`Scheduler::check_to_be_destroyed`]) and
//! the aging sweep ([`Scheduler::aging`]).

mod aging;
pub mod band;
pub mod destroy;
mod dispatch;
pub mod mlfq;
pub mod queue;

pub use band::Band;
pub use destroy::DestroySlot;
pub use mlfq::{Scheduler, Selection};
pub use queue::{Fifo, HighestPriority, ReadyQueue, ShortestBurst, SortKey};
