//! Two-phase handoff queue.
//!
//! Producers append into a locked writer side; a consumer steals the
//! whole writer batch at once when its local buffer runs dry. The queue
//! can be deactivated, after which writes are rejected; this lets a
//! terminating phase cut off stragglers without draining them.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Multi-producer handoff queue with batch consumption.
pub struct HandoffQueue<T> {
    writer_queue: Mutex<Vec<T>>,
    deactivated: AtomicBool,
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        Self {
            writer_queue: Mutex::new(Vec::new()),
            deactivated: AtomicBool::new(false),
        }
    }

    /// Append one element. Returns `false` if the queue was deactivated.
    pub fn write(&self, item: T) -> bool {
        if self.deactivated.load(Ordering::Acquire) {
            return false;
        }
        let mut q = self.writer_queue.lock();
        // Re-check under the lock so deactivate() is a clean cut-off.
        if self.deactivated.load(Ordering::Acquire) {
            return false;
        }
        q.push(item);
        true
    }

    /// Steal the entire writer batch into `sink`. Returns `false` when
    /// nothing was available.
    pub fn drain_into(&self, sink: &mut Vec<T>) -> bool {
        let mut q = self.writer_queue.lock();
        if q.is_empty() {
            return false;
        }
        sink.append(&mut q);
        true
    }

    /// Reject all future writes and discard pending elements.
    pub fn deactivate(&self) {
        self.deactivated.store(true, Ordering::Release);
        self.writer_queue.lock().clear();
    }

    pub fn clear(&self) {
        self.writer_queue.lock().clear();
        self.deactivated.store(false, Ordering::Release);
    }

    pub fn is_empty(&self) -> bool {
        self.writer_queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_drain() {
        let q = HandoffQueue::new();
        assert!(q.write(1));
        assert!(q.write(2));
        let mut sink = Vec::new();
        assert!(q.drain_into(&mut sink));
        assert_eq!(sink, vec![1, 2]);
        assert!(!q.drain_into(&mut sink));
    }

    #[test]
    fn deactivated_queue_rejects_writes() {
        let q = HandoffQueue::new();
        q.write(7);
        q.deactivate();
        assert!(!q.write(8));
        let mut sink = Vec::new();
        assert!(!q.drain_into(&mut sink));
    }

    #[test]
    fn concurrent_writers_all_land() {
        let q = HandoffQueue::new();
        rayon::scope(|s| {
            for t in 0..8 {
                let q = &q;
                s.spawn(move |_| {
                    for i in 0..100 {
                        assert!(q.write(t * 100 + i));
                    }
                });
            }
        });
        let mut sink = Vec::new();
        q.drain_into(&mut sink);
        assert_eq!(sink.len(), 800);
    }
}
