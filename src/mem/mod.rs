//! Memory backing for threads.
//!
//! Provides the owned kernel stack type with its overflow canary.

pub mod stack;

pub use stack::{Stack, MIN_STACK_WORDS, STACK_CANARY};
