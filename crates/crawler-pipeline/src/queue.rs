// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Blocking FIFO shared between the poller and the dispatch worker.
//!
//! ```text
//!   producers ──push──> ┌───────────────┐ ──pop──> consumer
//!   (block when full)   │ VecDeque<T>   │          (block when empty)
//!                       │ capacity C    │
//!                       └───────────────┘
//! ```
//!
//! A capacity of `0` means unbounded. The capacity is the only backpressure
//! mechanism in the pipeline: when delivery stalls, producers park in
//! [`BoundedEventQueue::push`] instead of growing memory.
//!
//! Closing is the shutdown mechanism. After [`BoundedEventQueue::close`] every
//! push is a no-op, blocked producers return, and consumers keep receiving the
//! items that were already enqueued until [`BoundedEventQueue::pop`] returns
//! `None`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO with an optional capacity bound and explicit close.
#[derive(Debug)]
pub struct BoundedEventQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedEventQueue<T> {
    /// Creates a queue holding at most `capacity` items; `0` is unbounded.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Creates a queue that never blocks producers.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    // A panicking holder cannot leave `State` half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_full(&self, state: &State<T>) -> bool {
        self.capacity > 0 && state.items.len() >= self.capacity
    }

    /// Enqueues `item`, blocking while a bounded queue is at capacity.
    ///
    /// Returns `false` when the queue was closed before the item could be
    /// stored; the item is dropped in that case.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.lock();
        while !state.closed && self.is_full(&state) {
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Dequeues the oldest item, blocking until one is available.
    ///
    /// Returns `None` only once the queue is closed and fully drained, which is
    /// the consumer's signal to stop.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue and wakes every blocked producer and consumer.
    ///
    /// Idempotent. Items already enqueued stay available to [`Self::pop`].
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Configured bound; `0` means unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
