//! Candidate gate: dedup, hit budget, local lists, filter, simulation
//!
//! Every candidate that reaches `process` is either dropped with a counted
//! reason or evaluated exactly once. Failures inside the primary filter
//! (an `Err` or a panic) fall back to `BasicFilter` and never escape.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::metrics::{MetricsSnapshot, PipelineMetrics};
use super::sink::CandidateSink;
use crate::config::PipelineConfig;
use crate::filter::{AccessLists, BasicFilter, Filter};
use crate::throttle::{Deduplicator, RateLimiter};
use crate::trading::{TradeResult, TradeSimulator};
use crate::types::{Candidate, FilterVerdict};

/// What the gate did with one candidate
#[derive(Debug, Clone)]
pub enum GateOutcome {
    Duplicate,
    RateLimited,
    Rejected(FilterVerdict),
    Accepted(FilterVerdict, TradeResult),
}

pub struct GatingPipeline {
    config: PipelineConfig,
    filter: Arc<dyn Filter>,
    fallback: BasicFilter,
    lists: AccessLists,
    dedup: Deduplicator,
    hit_limiter: RateLimiter,
    simulator: Arc<TradeSimulator>,
    sink: Arc<dyn CandidateSink>,
    metrics: Arc<PipelineMetrics>,
}

impl GatingPipeline {
    pub fn new(
        config: PipelineConfig,
        filter: Arc<dyn Filter>,
        fallback: BasicFilter,
        lists: AccessLists,
        simulator: Arc<TradeSimulator>,
        sink: Arc<dyn CandidateSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            dedup: Deduplicator::new(Duration::from_millis(config.dedup_ttl_ms)),
            hit_limiter: RateLimiter::per_second("hits", config.max_hits_per_sec),
            config,
            filter,
            fallback,
            lists,
            simulator,
            sink,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Signature, then mint, then symbol within a time bucket
    pub fn dedup_key(&self, c: &Candidate) -> String {
        if let Some(sig) = c.signature.as_deref().filter(|s| !s.is_empty()) {
            return format!("sig:{}", sig);
        }
        if !c.mint.is_empty() {
            return format!("mint:{}", c.mint);
        }
        let bucket = c.created_at_ms.div_euclid(self.config.symbol_bucket_ms.max(1));
        format!("sym:{}|{}", c.symbol, bucket)
    }

    pub async fn process(&self, candidate: Candidate) -> GateOutcome {
        self.metrics.record_seen();

        if self.dedup.check_and_add(&self.dedup_key(&candidate)) {
            self.metrics.record_duplicate();
            debug!(mint = %candidate.id(), "duplicate candidate dropped");
            return GateOutcome::Duplicate;
        }
        if !self.hit_limiter.allow() {
            self.metrics.record_rate_limited();
            debug!(mint = %candidate.id(), "hit budget exhausted, dropped");
            return GateOutcome::RateLimited;
        }

        let verdict = match self.lists.check(&candidate) {
            Some(reason) => {
                self.metrics.reasons().bump(reason);
                FilterVerdict::reject(reason)
            }
            None => self.evaluate(&candidate).await,
        };

        if !verdict.pass {
            self.metrics.record_miss();
            if self.config.only_hits {
                debug!(symbol = %candidate.label(), reason = %verdict.reason, "miss");
            } else {
                info!(symbol = %candidate.label(), mint = %candidate.id(), reason = %verdict.reason, "miss");
            }
            return GateOutcome::Rejected(verdict);
        }

        self.metrics.record_hit();
        self.sink.on_candidate_accepted(&candidate, &verdict).await;

        let result = self.simulator.simulate(&candidate).await;
        self.metrics.record_trade(result.reason, result.pnl);
        self.sink.on_trade_closed(&result).await;

        GateOutcome::Accepted(verdict, result)
    }

    /// Primary filter, isolated from its own errors and panics
    async fn evaluate(&self, candidate: &Candidate) -> FilterVerdict {
        match AssertUnwindSafe(self.filter.evaluate(candidate))
            .catch_unwind()
            .await
        {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                warn!(filter = self.filter.name(), mint = %candidate.id(), error = %e, "filter failed, using fallback");
                self.metrics.record_fallback();
                self.fallback.check(candidate)
            }
            Err(_) => {
                error!(filter = self.filter.name(), mint = %candidate.id(), "filter panicked, using fallback");
                self.metrics.record_fallback();
                self.fallback.check(candidate)
            }
        }
    }

    fn log_totals(&self, snap: &MetricsSnapshot) {
        info!(
            seen = snap.seen,
            hits = snap.hits,
            misses = snap.misses,
            dropped = snap.dropped(),
            hit_rate = %format!("{:.1}%", snap.hit_rate()),
            "pipeline stats"
        );
    }

    fn log_summary(&self, label: &str, window: &MetricsSnapshot) {
        info!(
            window = label,
            seen = window.seen,
            hits = window.hits,
            misses = window.misses,
            dropped_dup = window.dropped_dup,
            dropped_rate = window.dropped_rate,
            fallbacks = window.fallbacks,
            trades = window.trades(),
            tp = window.trades_tp,
            sl = window.trades_sl,
            timeout = window.trades_timeout,
            pnl = %format!("{:.2}", window.realized_pnl),
            hit_rate = %format!("{:.1}%", window.hit_rate()),
            "pipeline summary"
        );
    }

    /// Consume candidates until the channel closes or shutdown fires.
    ///
    /// Candidates already admitted finish their simulation before the
    /// final summary is logged.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<Candidate>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(
            filter = self.filter.name(),
            max_hits_per_sec = self.config.max_hits_per_sec,
            dedup_ttl_ms = self.config.dedup_ttl_ms,
            "gating pipeline started"
        );

        let mut stats = interval(Duration::from_secs(self.config.stats_interval_secs.max(1)));
        let mut summary = interval(Duration::from_secs(self.config.summary_interval_secs.max(1)));
        let mut reasons = interval(Duration::from_secs(self.config.reasons_interval_secs.max(1)));
        let mut sweeper = interval(self.dedup.sweep_interval());
        for timer in [&mut stats, &mut summary, &mut reasons, &mut sweeper] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer.tick().await;
        }

        let mut window_start = self.metrics.snapshot();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(candidate) = maybe else {
                        info!("candidate channel closed");
                        break;
                    };
                    let this = self.clone();
                    tasks.spawn(async move {
                        this.process(candidate).await;
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "candidate task ended abnormally");
                    }
                }
                _ = stats.tick() => self.log_totals(&self.metrics.snapshot()),
                _ = summary.tick() => {
                    let now = self.metrics.snapshot();
                    self.log_summary("60s", &now.since(&window_start));
                    self.metrics.reasons().reset();
                    window_start = now;
                }
                _ = reasons.tick() => {
                    let hist = self.metrics.reasons();
                    if hist.total() > 0 {
                        info!(top = %hist.format_top(self.config.reasons_top_n), "filter reasons");
                    }
                }
                _ = sweeper.tick() => {
                    let removed = self.dedup.sweep();
                    debug!(removed, remaining = self.dedup.len(), "gate dedup sweep");
                }
                _ = shutdown.recv() => {
                    info!("gating pipeline shutting down");
                    break;
                }
            }
        }

        if !tasks.is_empty() {
            info!(pending = tasks.len(), "waiting for open simulations");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "candidate task ended abnormally");
            }
        }

        self.log_summary("total", &self.metrics.snapshot());
    }
}
