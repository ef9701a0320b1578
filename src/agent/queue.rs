//! Thread-safe mailbox between socket workers and the polling thread.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unbounded, insertion-ordered queue of text messages.
///
/// Cloning yields another handle to the same queue. Workers only
/// [`push`](Self::push); the polling thread only [`drain`](Self::drain).
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&self, message: impl Into<String>) {
        self.lock().push_back(message.into());
    }

    /// Take every queued message, leaving the queue empty.
    ///
    /// Happens under one lock acquisition, so a message pushed
    /// concurrently lands either in this batch or in the next one,
    /// never both.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock()).into()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The queue only holds owned strings; a panic mid-push cannot leave
    // it half-written, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
