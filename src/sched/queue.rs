//! Ready queues.
//!
//! A [`ReadyQueue`] is a short sequence of thread handles whose ordering is
//! fixed by a strategy type: [`ShortestBurst`] and [`HighestPriority`] keep the
//! queue sorted and expose `insert`, [`Fifo`] keeps arrival order and exposes
//! `append`. Sorted inserts are stable: a thread goes behind every queued
//! thread with an equal key.

use crate::thread::{Thread, ThreadId, ThreadRef};
use core::cmp::Reverse;
use core::fmt;
use core::marker::PhantomData;

extern crate alloc;
use alloc::collections::VecDeque;

/// Ordering strategy for a sorted ready queue.
pub trait SortKey {
    /// Key compared in ascending order; the smallest key is served first.
    type Key: Ord;

    /// Extract the key from a thread.
    fn key(thread: &Thread) -> Self::Key;
}

/// Ascending by approximate burst (L1).
#[derive(Debug)]
pub struct ShortestBurst;

/// Descending by priority (L2).
#[derive(Debug)]
pub struct HighestPriority;

/// Arrival order (L3).
#[derive(Debug)]
pub struct Fifo;

impl SortKey for ShortestBurst {
    type Key = u64;

    fn key(thread: &Thread) -> u64 {
        thread.approximate_burst()
    }
}

impl SortKey for HighestPriority {
    type Key = Reverse<i32>;

    fn key(thread: &Thread) -> Reverse<i32> {
        Reverse(thread.priority())
    }
}

/// Ordered collection of ready threads.
pub struct ReadyQueue<O> {
    threads: VecDeque<ThreadRef>,
    _order: PhantomData<O>,
}

impl<O> ReadyQueue<O> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            threads: VecDeque::new(),
            _order: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Thread that would be served next, without removing it.
    pub fn peek_front(&self) -> Option<&ThreadRef> {
        self.threads.front()
    }

    /// Remove and return the thread that is served next.
    pub fn remove_front(&mut self) -> Option<ThreadRef> {
        self.threads.pop_front()
    }

    /// Iterate in service order.
    pub fn iter(&self) -> impl Iterator<Item = &ThreadRef> + '_ {
        self.threads.iter()
    }

    /// Whether the thread with `id` is queued here.
    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.iter().any(|t| t.id() == id)
    }

    /// Ids in service order.
    pub fn ids(&self) -> alloc::vec::Vec<ThreadId> {
        self.threads.iter().map(|t| t.id()).collect()
    }

    /// Empty the queue, yielding threads in service order.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = ThreadRef> + '_ {
        self.threads.drain(..)
    }
}

impl<O: SortKey> ReadyQueue<O> {
    /// Insert keeping the queue sorted; ties go behind existing equal keys.
    pub fn insert(&mut self, thread: ThreadRef) {
        let key = O::key(&thread);
        let at = self.threads.partition_point(|queued| O::key(queued) <= key);
        self.threads.insert(at, thread);
    }

    /// Whether the queue is sorted by its key.
    pub fn is_ordered(&self) -> bool {
        self.threads
            .iter()
            .zip(self.threads.iter().skip(1))
            .all(|(a, b)| O::key(a) <= O::key(b))
    }
}

impl ReadyQueue<Fifo> {
    /// Add at the back.
    pub fn append(&mut self, thread: ThreadRef) {
        self.threads.push_back(thread);
    }
}

impl<O> Default for ReadyQueue<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> fmt::Display for ReadyQueue<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, thread) in self.threads.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "[{}]{}", thread.id(), thread.name())?;
        }
        Ok(())
    }
}

impl<O> fmt::Debug for ReadyQueue<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.threads.iter().map(|t| t.id()))
            .finish()
    }
}
