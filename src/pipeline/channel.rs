//! Thread-safe FIFO shared by pipeline stages.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unbounded, non-blocking FIFO
///
/// Cloning a channel yields another handle to the same queue. Every operation
/// returns immediately; consumers poll.
pub struct Channel<T> {
    queue: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Channel<T> {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Remove the oldest item; `None` when empty
    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn available(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take everything queued right now, oldest first
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }
}

impl<T: Clone> Channel<T> {
    /// Oldest item without removing it
    pub fn front(&self) -> Option<T> {
        self.lock().front().cloned()
    }

    /// Newest item without removing it
    pub fn back(&self) -> Option<T> {
        self.lock().back().cloned()
    }
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").field("len", &self.len()).finish()
    }
}
