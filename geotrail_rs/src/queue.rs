// queue.rs - Blocking FIFO hand-off between pipeline stages
//
// One producer side that never blocks, one consumer that sleeps on a condvar
// until an item arrives or the queue is halted. A bounded queue evicts its
// oldest entry on overflow instead of making the producer wait.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::capture::CaptureJob;

/// Raw frames waiting for the processing worker
pub const CAPTURE_QUEUE_CAPACITY: usize = 3;

/// Outcome of a push
#[derive(Debug, PartialEq)]
pub enum Pushed<T> {
    Queued,
    /// Accepted, and the oldest entry was discarded to make room
    Evicted(T),
    /// Queue already halted; the item is handed back
    Rejected(T),
}

struct Inner<T> {
    items: VecDeque<T>,
    halted: bool,
}

pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
    capacity: Option<usize>,
}

pub type CaptureQueue = WorkQueue<CaptureJob>;
pub type UploadQueue = WorkQueue<PathBuf>;

impl<T> WorkQueue<T> {
    /// Drop-oldest queue holding at most `capacity` entries (minimum 1)
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                halted: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) -> Pushed<T> {
        let mut inner = self.lock();
        if inner.halted {
            return Pushed::Rejected(item);
        }

        let evicted = match self.capacity {
            Some(cap) if inner.items.len() >= cap => inner.items.pop_front(),
            _ => None,
        };
        inner.items.push_back(item);
        drop(inner);

        self.available.notify_one();
        match evicted {
            Some(old) => Pushed::Evicted(old),
            None => Pushed::Queued,
        }
    }

    /// Block until an item is available. Returns `None` once the queue is
    /// halted; anything still queued at that point is abandoned.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.lock();
        loop {
            if inner.halted {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            inner = self
                .available
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking pop, `None` when empty or halted
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.lock();
        if inner.halted {
            return None;
        }
        inner.items.pop_front()
    }

    /// Raise the stop signal and wake every waiting consumer
    pub fn halt(&self) {
        self.lock().halted = true;
        self.available.notify_all();
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_bounded_keeps_most_recent_in_order() {
        let queue = WorkQueue::bounded(CAPTURE_QUEUE_CAPACITY);
        let mut evicted = Vec::new();
        for i in 0..7 {
            if let Pushed::Evicted(old) = queue.push(i) {
                evicted.push(old);
            }
            assert!(queue.len() <= CAPTURE_QUEUE_CAPACITY);
        }

        assert_eq!(evicted, vec![0, 1, 2, 3]);
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![4, 5, 6]);
    }

    #[test]
    fn test_unbounded_never_drops() {
        let queue = WorkQueue::unbounded();
        for i in 0..100 {
            assert_eq!(queue.push(i), Pushed::Queued);
        }
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.capacity(), None);
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(WorkQueue::unbounded());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push("frame");
        assert_eq!(consumer.join().unwrap(), Some("frame"));
    }

    #[test]
    fn test_halt_wakes_consumer_and_abandons_items() {
        let queue: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::unbounded());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.halt();
        assert_eq!(consumer.join().unwrap(), None);

        // Items queued before a halt are never handed out
        let queue = WorkQueue::unbounded();
        for i in 0..5 {
            queue.push(i);
        }
        queue.halt();
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.push(9), Pushed::Rejected(9));
        assert!(queue.is_halted());
    }
}
