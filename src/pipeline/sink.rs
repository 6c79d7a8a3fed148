//! Downstream hooks for accepted candidates and closed trades

use async_trait::async_trait;
use tracing::info;

use crate::trading::TradeResult;
use crate::types::{Candidate, FilterVerdict};

/// Receives pipeline outcomes. The pipeline never persists anything itself.
#[async_trait]
pub trait CandidateSink: Send + Sync {
    async fn on_candidate_accepted(&self, candidate: &Candidate, verdict: &FilterVerdict);

    async fn on_trade_closed(&self, result: &TradeResult);
}

/// Writes outcomes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl CandidateSink for LogSink {
    async fn on_candidate_accepted(&self, candidate: &Candidate, verdict: &FilterVerdict) {
        let metrics = verdict.metrics.clone().unwrap_or_default();
        info!(
            symbol = %candidate.label(),
            mint = %candidate.id(),
            origin = %candidate.origin,
            reason = %verdict.reason,
            liq = ?metrics.liquidity_usd,
            vol5m = ?metrics.volume_5m_usd,
            vol24h = ?metrics.volume_24h_usd,
            "HIT"
        );
    }

    async fn on_trade_closed(&self, result: &TradeResult) {
        info!(
            id = %result.position.id,
            symbol = %result.position.symbol,
            reason = %result.reason,
            entry = result.position.entry_price,
            exit = result.exit_price,
            pnl = %format!("{:.2}", result.pnl),
            pnl_pct = %format!("{:.2}", result.pnl_pct),
            ticks = result.ticks,
            held_ms = result.held_ms(),
            "sim close"
        );
    }
}
