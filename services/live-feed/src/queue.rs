//! Bounded per-connection outbound queue
//!
//! On overflow the oldest message is dropped to make room for the newest,
//! so a stalled consumer sees the most recent state when it catches up.

use std::collections::VecDeque;

/// Outbound queue with fixed capacity and a drop-oldest overflow policy.
#[derive(Debug)]
pub struct BoundedQueue {
    messages: VecDeque<String>,
    capacity: usize,
    dropped: u64,
}

impl BoundedQueue {
    /// Capacity is clamped to at least one slot; a zero-capacity queue
    /// could never deliver anything.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueue a payload, evicting the oldest entry when full.
    /// Returns the number of messages dropped by this call.
    pub fn push(&mut self, payload: String) -> u64 {
        let mut dropped_now = 0;
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
            self.dropped += 1;
            dropped_now = 1;
        }
        self.messages.push_back(payload);
        dropped_now
    }

    /// Take every queued payload, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total messages dropped over the queue's lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain_preserve_order() {
        let mut queue = BoundedQueue::new(8);
        queue.push("a".to_string());
        queue.push("b".to_string());
        queue.push("c".to_string());

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain(), vec!["a", "b", "c"]);
        assert!(queue.is_empty());
        assert_eq!(queue.dropped(), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = BoundedQueue::new(2);
        assert_eq!(queue.push("a".to_string()), 0);
        assert_eq!(queue.push("b".to_string()), 0);
        assert_eq!(queue.push("c".to_string()), 1);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec!["b", "c"]);
    }

    #[test]
    fn test_drain_resets_but_keeps_drop_count() {
        let mut queue = BoundedQueue::new(1);
        queue.push("a".to_string());
        queue.push("b".to_string());
        queue.drain();
        queue.push("c".to_string());

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec!["c"]);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut queue = BoundedQueue::new(0);
        assert_eq!(queue.push("a".to_string()), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped(), 0);

        assert_eq!(queue.push("b".to_string()), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.drain(), vec!["b"]);
    }
}
