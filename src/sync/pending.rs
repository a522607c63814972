//! Pending-update queue
//!
//! Holds encoded updates a peer could not deliver. Bounded; the oldest entry
//! is evicted when full.

use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

/// Default number of undelivered updates kept
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug)]
pub struct PendingQueue {
    items: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// Append, evicting the oldest entries beyond capacity
    pub fn enqueue(&self, payload: String) {
        let Ok(mut items) = self.items.lock() else {
            return;
        };
        items.push_back(payload);
        while items.len() > self.capacity {
            items.pop_front();
        }
        info!(pending = items.len(), "Queued clipboard update for retry");
    }

    /// Remove and return everything, oldest first
    pub fn drain(&self) -> Vec<String> {
        self.items
            .lock()
            .map(|mut items| items.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.items
            .lock()
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keeps_latest_ten_in_order() {
        let queue = PendingQueue::default();
        for i in 0..15 {
            queue.enqueue(format!("item-{}", i));
        }

        let expected: Vec<String> = (5..15).map(|i| format!("item-{}", i)).collect();
        assert_eq!(queue.snapshot(), expected);
        assert_eq!(queue.len(), 10);
    }

    #[test]
    fn test_drain_empties_queue() {
        let queue = PendingQueue::default();
        queue.enqueue("a".into());
        queue.enqueue("b".into());

        assert_eq!(queue.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let queue = PendingQueue::new(0);
        queue.enqueue("a".into());
        queue.enqueue("b".into());
        assert_eq!(queue.snapshot(), vec!["b".to_string()]);
    }

    #[test]
    fn test_concurrent_enqueue_stays_bounded() {
        let queue = std::sync::Arc::new(PendingQueue::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        queue.enqueue(format!("{}-{}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), queue.capacity());
    }
}
