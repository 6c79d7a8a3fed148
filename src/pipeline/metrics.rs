//! Pipeline counters and the filter reason histogram
//!
//! One `PipelineMetrics` is created at startup and shared by `Arc`.
//! Counters are cumulative; windowed views are computed from snapshots
//! so readers never race a reset.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::trading::CloseReason;
use crate::types::FilterReason;

/// Verdict counts by reason
#[derive(Debug, Default)]
pub struct ReasonHistogram {
    counts: DashMap<FilterReason, u64>,
}

impl ReasonHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self, reason: FilterReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: FilterReason) -> u64 {
        self.counts.get(&reason).map(|c| *c).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|e| *e.value()).sum()
    }

    /// Most frequent reasons, ties broken by name for stable output
    pub fn top_n(&self, n: usize) -> Vec<(FilterReason, u64)> {
        let mut all: Vec<(FilterReason, u64)> =
            self.counts.iter().map(|e| (*e.key(), *e.value())).collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        all.truncate(n);
        all
    }

    pub fn reset(&self) {
        self.counts.clear();
    }

    /// `reason=count` pairs for a single log line
    pub fn format_top(&self, n: usize) -> String {
        self.top_n(n)
            .iter()
            .map(|(reason, count)| format!("{}={}", reason, count))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub seen: u64,
    pub hits: u64,
    pub misses: u64,
    pub dropped_dup: u64,
    pub dropped_rate: u64,
    pub fallbacks: u64,
    pub trades_tp: u64,
    pub trades_sl: u64,
    pub trades_timeout: u64,
    pub realized_pnl: f64,
}

impl MetricsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_dup + self.dropped_rate
    }

    pub fn trades(&self) -> u64 {
        self.trades_tp + self.trades_sl + self.trades_timeout
    }

    /// Hits as a percentage of candidates that reached the filter
    pub fn hit_rate(&self) -> f64 {
        let evaluated = self.hits + self.misses;
        if evaluated == 0 {
            0.0
        } else {
            self.hits as f64 / evaluated as f64 * 100.0
        }
    }

    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            seen: self.seen.saturating_sub(earlier.seen),
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            dropped_dup: self.dropped_dup.saturating_sub(earlier.dropped_dup),
            dropped_rate: self.dropped_rate.saturating_sub(earlier.dropped_rate),
            fallbacks: self.fallbacks.saturating_sub(earlier.fallbacks),
            trades_tp: self.trades_tp.saturating_sub(earlier.trades_tp),
            trades_sl: self.trades_sl.saturating_sub(earlier.trades_sl),
            trades_timeout: self.trades_timeout.saturating_sub(earlier.trades_timeout),
            realized_pnl: self.realized_pnl - earlier.realized_pnl,
        }
    }
}

/// Process-wide pipeline counters
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    seen: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    dropped_dup: AtomicU64,
    dropped_rate: AtomicU64,
    fallbacks: AtomicU64,
    trades_tp: AtomicU64,
    trades_sl: AtomicU64,
    trades_timeout: AtomicU64,
    realized_pnl: Mutex<f64>,
    reasons: ReasonHistogram,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reasons(&self) -> &ReasonHistogram {
        &self.reasons
    }

    pub fn record_seen(&self) {
        self.seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.dropped_dup.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.dropped_rate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trade(&self, reason: CloseReason, pnl: f64) {
        let counter = match reason {
            CloseReason::TakeProfit => &self.trades_tp,
            CloseReason::StopLoss => &self.trades_sl,
            CloseReason::Timeout => &self.trades_timeout,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.realized_pnl.lock().unwrap_or_else(|e| e.into_inner()) += pnl;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            seen: self.seen.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            dropped_dup: self.dropped_dup.load(Ordering::Relaxed),
            dropped_rate: self.dropped_rate.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            trades_tp: self.trades_tp.load(Ordering::Relaxed),
            trades_sl: self.trades_sl.load(Ordering::Relaxed),
            trades_timeout: self.trades_timeout.load(Ordering::Relaxed),
            realized_pnl: *self.realized_pnl.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_top_n_ordering() {
        let hist = ReasonHistogram::new();
        for _ in 0..3 {
            hist.bump(FilterReason::LiqTooLow);
        }
        hist.bump(FilterReason::Pass);
        hist.bump(FilterReason::AuthBanned);

        let top = hist.top_n(2);
        assert_eq!(top[0], (FilterReason::LiqTooLow, 3));
        // tie broken alphabetically: auth-banned < pass
        assert_eq!(top[1], (FilterReason::AuthBanned, 1));
        assert_eq!(hist.total(), 5);
        assert_eq!(hist.format_top(1), "liq-too-low=3");

        hist.reset();
        assert_eq!(hist.total(), 0);
    }

    #[test]
    fn test_snapshot_window() {
        let metrics = PipelineMetrics::new();
        metrics.record_seen();
        metrics.record_hit();
        let first = metrics.snapshot();

        metrics.record_seen();
        metrics.record_miss();
        metrics.record_duplicate();
        metrics.record_trade(CloseReason::TakeProfit, 25.0);
        let window = metrics.snapshot().since(&first);

        assert_eq!(window.seen, 1);
        assert_eq!(window.hits, 0);
        assert_eq!(window.misses, 1);
        assert_eq!(window.dropped(), 1);
        assert_eq!(window.trades(), 1);
        assert_eq!(window.realized_pnl, 25.0);
    }

    #[test]
    fn test_hit_rate() {
        let snap = MetricsSnapshot {
            hits: 1,
            misses: 3,
            ..Default::default()
        };
        assert_eq!(snap.hit_rate(), 25.0);
        assert_eq!(MetricsSnapshot::default().hit_rate(), 0.0);
    }
}
