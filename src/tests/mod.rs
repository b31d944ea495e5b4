//! Cross-module test suites: worked scheduling scenarios and randomized
//! invariant checks. Per-module unit tests live next to the code.

pub(crate) mod helpers;
