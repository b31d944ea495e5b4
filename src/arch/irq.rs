//! Interrupt-level capability token.
//!
//! On a uniprocessor, disabling interrupts is the only mutual exclusion the
//! scheduler may use: a blocking lock would call back into thread selection
//! while selection is in progress. Every scheduler operation therefore takes
//! an [`IntOff`], which can only be obtained while the machine reports
//! interrupts disabled.

use super::Arch;
use crate::errors::{fatal, Fault};
use core::marker::PhantomData;

/// Proof that interrupts were disabled when the token was made.
///
/// The token is neither `Send` nor `Sync`: it belongs to the processor
/// context that created it.
#[derive(Debug)]
pub struct IntOff {
    _not_send: PhantomData<*const ()>,
}

impl IntOff {
    /// Create a token, aborting if interrupts are enabled.
    #[track_caller]
    pub fn assert<A: Arch + ?Sized>(arch: &A) -> Self {
        if arch.interrupts_enabled() {
            fatal(Fault::InterruptsEnabled);
        }
        Self { _not_send: PhantomData }
    }

    /// Re-check the interrupt level on entry to an operation.
    ///
    /// A token outliving the critical section it was made in is caught here.
    #[track_caller]
    pub fn check<A: Arch + ?Sized>(&self, arch: &A) {
        if arch.interrupts_enabled() {
            fatal(Fault::InterruptsEnabled);
        }
    }
}
