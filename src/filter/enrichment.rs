//! Rate-limited, TTL-cached market-data enrichment
//!
//! Queries every configured provider concurrently and merges the answers
//! field by field, first known value wins. Failures degrade to `None`.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::config::EnrichmentConfig;
use crate::market::MarketDataProvider;
use crate::throttle::RateLimiter;
use crate::types::MarketSnapshot;

#[derive(Clone)]
struct CachedSnapshot {
    snapshot: MarketSnapshot,
    cached_at: Instant,
}

/// Counters for the stats log
#[derive(Debug, Default)]
pub struct EnrichmentStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub limited: AtomicU64,
    pub failures: AtomicU64,
}

impl EnrichmentStats {
    /// (hits, misses, limited, failures)
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.limited.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

pub struct EnrichmentCache {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: DashMap<String, CachedSnapshot>,
    limiter: RateLimiter,
    ttl: Duration,
    call_timeout: Duration,
    stats: EnrichmentStats,
}

impl EnrichmentCache {
    pub fn new(config: &EnrichmentConfig, providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self {
            providers,
            cache: DashMap::new(),
            limiter: RateLimiter::per_second("enrich", config.rps),
            ttl: Duration::from_millis(config.ttl_ms),
            call_timeout: Duration::from_millis(config.timeout_ms),
            stats: EnrichmentStats::default(),
        }
    }

    pub fn stats(&self) -> &EnrichmentStats {
        &self.stats
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Known market data for `mint`, or `None` when nothing could be learned
    /// (rate limited, no providers, all upstreams failed or empty)
    pub async fn enrich(&self, mint: &str) -> Option<MarketSnapshot> {
        if let Some(entry) = self.cache.get(mint) {
            if entry.cached_at.elapsed() < self.ttl {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.snapshot.clone());
            }
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        if self.providers.is_empty() {
            return None;
        }
        if !self.limiter.allow() {
            self.stats.limited.fetch_add(1, Ordering::Relaxed);
            debug!(mint = %mint, "enrichment rate limited");
            return None;
        }

        let calls = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let result = timeout(self.call_timeout, provider.get_market_snapshot(mint)).await;
                (provider.name(), result)
            }
        });

        let mut merged = MarketSnapshot::default();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(Ok(Some(snapshot))) => merged.merge_missing(&snapshot),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    debug!(provider = name, mint = %mint, error = %e, "market data request failed");
                }
                Err(_) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);
                    debug!(provider = name, mint = %mint, "market data request timed out");
                }
            }
        }

        if merged.is_empty() {
            return None;
        }

        self.cache.insert(
            mint.to_string(),
            CachedSnapshot {
                snapshot: merged.clone(),
                cached_at: Instant::now(),
            },
        );
        Some(merged)
    }

    /// Drop expired entries
    pub fn cleanup(&self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        before - self.cache.len()
    }
}
