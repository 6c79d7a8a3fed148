//! Bounded signature work queue
//!
//! Polling can return far more signatures than the fetch budget allows.
//! The queue is capped; on overflow the incoming signature is dropped and
//! counted rather than growing without bound.
//!
//! A signature is never queued twice, and never queued while a fetch for it
//! is in flight.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::config::{ListenerConfig, RetryBackoff};

/// A signature waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureQueueItem {
    pub signature: String,
    /// Failed fetches so far
    pub attempts: u32,
}

impl SignatureQueueItem {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            attempts: 0,
        }
    }
}

/// Result of offering a signature to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Already queued or in flight
    Duplicate,
    /// Queue full; the signature was discarded
    Dropped,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<SignatureQueueItem>,
    queued: HashSet<String>,
    inflight: HashSet<String>,
}

/// FIFO of signatures with queued/in-flight tracking
#[derive(Debug)]
pub struct SignatureQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    dropped_count: AtomicU64,
}

impl SignatureQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Enqueue a fresh signature
    pub fn push(&self, signature: &str) -> PushOutcome {
        self.push_item(SignatureQueueItem::new(signature))
    }

    /// Enqueue an item, keeping its attempt count (retries)
    pub fn push_item(&self, item: SignatureQueueItem) -> PushOutcome {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.queued.contains(&item.signature) || state.inflight.contains(&item.signature) {
            return PushOutcome::Duplicate;
        }

        if state.items.len() >= self.capacity {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
            debug!(signature = %item.signature, "signature queue full, dropping newest");
            return PushOutcome::Dropped;
        }

        state.queued.insert(item.signature.clone());
        state.items.push_back(item);
        PushOutcome::Queued
    }

    /// Take the oldest signature and mark it in flight
    pub fn pop(&self) -> Option<SignatureQueueItem> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let item = state.items.pop_front()?;
        state.queued.remove(&item.signature);
        state.inflight.insert(item.signature.clone());
        Some(item)
    }

    /// Fetch finished (whatever the outcome)
    pub fn complete(&self, signature: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.inflight.remove(signature);
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.items.len())
            .unwrap_or_else(|e| e.into_inner().items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inflight(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.inflight.len())
            .unwrap_or_else(|e| e.into_inner().inflight.len())
    }

    /// Signatures discarded because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Delay before a not-yet-available transaction is fetched again
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: RetryBackoff,
}

impl RetryPolicy {
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            max_attempts: config.max_tx_retries,
            base_delay: Duration::from_millis(config.retry_null_tx_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            backoff: config.retry_backoff,
        }
    }

    /// `None` once `attempts` has reached the ceiling (drop permanently)
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.max_attempts {
            return None;
        }
        let delay = match self.backoff {
            RetryBackoff::Fixed => self.base_delay,
            RetryBackoff::Exponential => {
                let exp = attempts.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        };
        Some(delay.min(self.max_delay.max(self.base_delay)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_and_duplicates() {
        let queue = SignatureQueue::new(10);
        assert_eq!(queue.push("a"), PushOutcome::Queued);
        assert_eq!(queue.push("b"), PushOutcome::Queued);
        assert_eq!(queue.push("a"), PushOutcome::Duplicate);

        let first = queue.pop().unwrap();
        assert_eq!(first.signature, "a");
        // in flight: still refused
        assert_eq!(queue.push("a"), PushOutcome::Duplicate);
        queue.complete("a");
        assert_eq!(queue.push("a"), PushOutcome::Queued);

        assert_eq!(queue.pop().unwrap().signature, "b");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_overflow_drops_newest() {
        let queue = SignatureQueue::new(2);
        queue.push("a");
        queue.push("b");
        assert_eq!(queue.push("c"), PushOutcome::Dropped);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.pop().unwrap().signature, "a");
    }

    #[test]
    fn test_requeue_keeps_attempts() {
        let queue = SignatureQueue::new(4);
        queue.push_item(SignatureQueueItem {
            signature: "x".into(),
            attempts: 3,
        });
        assert_eq!(queue.pop().unwrap().attempts, 3);
        assert_eq!(queue.inflight(), 1);
    }

    fn policy(backoff: RetryBackoff) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1200),
            max_delay: Duration::from_millis(4000),
            backoff,
        }
    }

    #[test]
    fn test_fixed_retry_policy() {
        let p = policy(RetryBackoff::Fixed);
        assert_eq!(p.next_delay(1), Some(Duration::from_millis(1200)));
        assert_eq!(p.next_delay(4), Some(Duration::from_millis(1200)));
        assert_eq!(p.next_delay(5), None);
    }

    #[test]
    fn test_exponential_retry_policy_is_capped() {
        let p = policy(RetryBackoff::Exponential);
        assert_eq!(p.next_delay(1), Some(Duration::from_millis(1200)));
        assert_eq!(p.next_delay(2), Some(Duration::from_millis(2400)));
        assert_eq!(p.next_delay(3), Some(Duration::from_millis(4000)));
        assert_eq!(p.next_delay(5), None);
    }
}
