//! TTL-keyed set for suppressing repeated work
//!
//! Keys are opaque strings. Callers namespace them (`sig:<signature>`,
//! `mint:<mint>`) so concerns never collide in a shared set.
//!
//! Expiry is lazy on read and batched on `sweep()`; run the sweeper on a
//! period of at least `ttl` to bound memory without per-entry timers.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Deduplicator with per-key last-seen timestamps
#[derive(Debug)]
pub struct Deduplicator {
    seen: DashMap<String, Instant>,
    ttl: Duration,
}

impl Deduplicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// True while `now - last_seen <= ttl`; expired keys are removed
    pub fn has(&self, key: &str) -> bool {
        self.has_at(key, Instant::now())
    }

    pub fn has_at(&self, key: &str, now: Instant) -> bool {
        let expired = match self.seen.get(key) {
            None => return false,
            Some(entry) => now.saturating_duration_since(*entry) > self.ttl,
        };

        if expired {
            self.seen
                .remove_if(key, |_, t| now.saturating_duration_since(*t) > self.ttl);
            return false;
        }
        true
    }

    /// Mark a key as seen now
    pub fn add(&self, key: &str) {
        self.add_at(key, Instant::now());
    }

    pub fn add_at(&self, key: &str, now: Instant) {
        self.seen.insert(key.to_string(), now);
    }

    /// Mark the key and report whether it was already live.
    ///
    /// Returns true if the key was seen within the TTL. Single entry-lock,
    /// so two concurrent callers can't both observe "new".
    pub fn check_and_add(&self, key: &str) -> bool {
        self.check_and_add_at(key, Instant::now())
    }

    pub fn check_and_add_at(&self, key: &str, now: Instant) -> bool {
        let mut fresh = true;
        self.seen
            .entry(key.to_string())
            .and_modify(|t| {
                if now.saturating_duration_since(*t) <= self.ttl {
                    fresh = false;
                } else {
                    *t = now;
                }
            })
            .or_insert(now);
        !fresh
    }

    /// Drop every expired entry, returns how many were removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, t| now.saturating_duration_since(*t) <= self.ttl);
        before.saturating_sub(self.seen.len())
    }

    /// Period the background sweeper should use
    pub fn sweep_interval(&self) -> Duration {
        self.ttl.max(Duration::from_secs(5))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_until_ttl_elapses() {
        let dedup = Deduplicator::new(Duration::from_millis(1000));
        let t0 = Instant::now();

        dedup.add_at("sig:abc", t0);
        assert!(dedup.has_at("sig:abc", t0));
        // boundary is inclusive
        assert!(dedup.has_at("sig:abc", t0 + Duration::from_millis(1000)));
        assert!(!dedup.has_at("sig:abc", t0 + Duration::from_millis(1001)));
        // lazy expiry removed it
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_unknown_key() {
        let dedup = Deduplicator::new(Duration::from_secs(60));
        assert!(!dedup.has("mint:nope"));
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let dedup = Deduplicator::new(Duration::from_secs(60));
        dedup.add("sig:XYZ");
        assert!(dedup.has("sig:XYZ"));
        assert!(!dedup.has("mint:XYZ"));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let dedup = Deduplicator::new(Duration::from_millis(500));
        let t0 = Instant::now();

        dedup.add_at("old", t0);
        dedup.add_at("new", t0 + Duration::from_millis(400));

        let removed = dedup.sweep_at(t0 + Duration::from_millis(600));
        assert_eq!(removed, 1);
        assert_eq!(dedup.len(), 1);
        assert!(dedup.has_at("new", t0 + Duration::from_millis(600)));
    }

    #[test]
    fn test_check_and_add() {
        let dedup = Deduplicator::new(Duration::from_millis(100));
        let t0 = Instant::now();

        assert!(!dedup.check_and_add_at("k", t0));
        assert!(dedup.check_and_add_at("k", t0 + Duration::from_millis(50)));
        // expired -> treated as new and re-armed
        assert!(!dedup.check_and_add_at("k", t0 + Duration::from_millis(200)));
        assert!(dedup.has_at("k", t0 + Duration::from_millis(250)));
    }

    #[test]
    fn test_sweep_interval_floor() {
        let dedup = Deduplicator::new(Duration::from_millis(10));
        assert_eq!(dedup.sweep_interval(), Duration::from_secs(5));

        let dedup = Deduplicator::new(Duration::from_secs(60));
        assert_eq!(dedup.sweep_interval(), Duration::from_secs(60));
    }
}
