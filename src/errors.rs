//! Fault and error types for the scheduling core.
//!
//! The scheduler has no recoverable error path: every broken invariant is a
//! [`Fault`] handed to [`fatal`], which logs it and brings the system down.
//! Recoverable errors exist only at construction time, for configuration
//! validation ([`ConfigError`]).

#![allow(clippy::uninlined_format_args)]

use crate::thread::ThreadId;
use core::fmt;

/// Result type for fallible construction-time operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Unrecoverable scheduler invariant violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A thread was admitted with a priority outside every band
    InvalidPriority {
        /// Offending thread
        thread: ThreadId,
        /// Its priority at admission time
        priority: i32,
    },
    /// A finishing dispatch found the destruction slot already occupied
    DuplicateFinish {
        /// Thread already waiting to be destroyed
        pending: Option<ThreadId>,
        /// Thread that tried to finish
        finishing: ThreadId,
    },
    /// The stack canary of the outgoing thread was overwritten
    StackOverflow(ThreadId),
    /// A scheduler operation was entered with interrupts enabled
    InterruptsEnabled,
}

/// Errors reported when validating a [`SchedConfig`](crate::config::SchedConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Aging step must be non-zero
    ZeroAgingStep,
    /// Aging threshold must be non-zero
    ZeroAgingThreshold,
    /// Priority bonus per threshold must be non-zero
    ZeroAgingBonus,
    /// Aging sweep interval must be non-zero
    ZeroAgingInterval,
    /// Burst estimate weight is a percentage
    InvalidBurstWeight(u8),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::InvalidPriority { thread, priority } => {
                write!(f, "thread {} admitted with invalid priority {}", thread, priority)
            }
            Fault::DuplicateFinish { pending: Some(pending), finishing } => write!(
                f,
                "thread {} finished while thread {} is still pending destruction",
                finishing, pending
            ),
            Fault::DuplicateFinish { pending: None, finishing } => write!(
                f,
                "thread {} finished while the destruction slot is being drained",
                finishing
            ),
            Fault::StackOverflow(id) => write!(f, "stack overflow detected on thread {}", id),
            Fault::InterruptsEnabled => write!(f, "scheduler entered with interrupts enabled"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroAgingStep => write!(f, "aging step must be greater than zero"),
            ConfigError::ZeroAgingThreshold => {
                write!(f, "aging threshold must be greater than zero")
            }
            ConfigError::ZeroAgingBonus => write!(f, "aging bonus must be greater than zero"),
            ConfigError::ZeroAgingInterval => {
                write!(f, "aging interval must be greater than zero")
            }
            ConfigError::InvalidBurstWeight(w) => {
                write!(f, "burst weight {}% is not a percentage", w)
            }
        }
    }
}

/// Report a scheduler fault and stop.
///
/// On bare metal the panic handler masks interrupts and parks the core.
#[cold]
#[track_caller]
pub fn fatal(fault: Fault) -> ! {
    log::error!("scheduler fault: {}", fault);
    panic!("scheduler fault: {}", fault)
}
