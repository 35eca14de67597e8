//! Bounded FIFO of previously failed records.
//!
//! A record whose send fails is enqueued at the tail and retried in strict
//! arrival order: time-series ingestion is order-sensitive for sequential
//! writes to the same series. When the queue is full the incoming record
//! is rejected and dropped, never an older one evicted.

use bytes::Bytes;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("retry queue full ({capacity} entries); record dropped")]
    Full { capacity: usize },
}

/// One finalized, previously failed payload awaiting redelivery.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    line: Bytes,
}

impl QueueEntry {
    pub fn line(&self) -> &Bytes {
        &self.line
    }

    pub fn into_line(self) -> Bytes {
        self.line
    }
}

#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    dropped: u64,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Appends a failed record at the tail. At capacity the record is
    /// rejected without touching the queue; the first drop is logged
    /// prominently, later ones at lower verbosity.
    pub fn enqueue(&mut self, line: Bytes) -> Result<(), QueueError> {
        if self.entries.len() >= self.capacity {
            self.dropped += 1;
            if self.dropped == 1 {
                warn!(
                    capacity = self.capacity,
                    "retry queue full, dropping failed record"
                );
            } else {
                debug!(
                    capacity = self.capacity,
                    dropped = self.dropped,
                    "retry queue full, dropping failed record"
                );
            }
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        if self.entries.is_empty() {
            info!(
                max = self.capacity,
                "beginning queueing of records after send failure"
            );
        } else {
            debug!(position = self.entries.len(), "failed record queued");
        }
        self.entries.push_back(QueueEntry { line });
        Ok(())
    }

    /// Next entry to retry, in arrival order.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Returns an entry whose resend failed to the head, preserving order.
    pub fn push_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> Bytes {
        Bytes::copy_from_slice(text.as_bytes())
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = RetryQueue::new(4);
        q.enqueue(entry("a")).unwrap();
        q.enqueue(entry("b")).unwrap();
        q.enqueue(entry("c")).unwrap();
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"a");
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"b");
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"c");
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn newest_is_rejected_at_capacity() {
        let mut q = RetryQueue::new(2);
        q.enqueue(entry("first")).unwrap();
        q.enqueue(entry("second")).unwrap();
        let err = q.enqueue(entry("third")).unwrap_err();
        assert_eq!(err, QueueError::Full { capacity: 2 });
        assert_eq!(q.len(), 2);
        assert_eq!(q.dropped(), 1);
        // Queued history is retained in arrival order.
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"first");
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"second");
    }

    #[test]
    fn push_front_restores_head() {
        let mut q = RetryQueue::new(4);
        q.enqueue(entry("a")).unwrap();
        q.enqueue(entry("b")).unwrap();
        let head = q.pop_front().unwrap();
        q.push_front(head);
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"a");
        assert_eq!(&q.pop_front().unwrap().into_line()[..], b"b");
    }

    #[test]
    fn zero_capacity_queue_drops_everything() {
        let mut q = RetryQueue::new(0);
        assert!(q.enqueue(entry("a")).is_err());
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 1);
    }
}
