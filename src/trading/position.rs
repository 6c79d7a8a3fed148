//! Simulated positions and their outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::SimulationConfig;

/// Why a simulated position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Timeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "TP"),
            CloseReason::StopLoss => write!(f, "SL"),
            CloseReason::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// A paper position opened on an accepted candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub mint: String,
    pub symbol: String,
    /// Entry price in USD per token
    pub entry_price: f64,
    /// Tokens bought for the configured notional
    pub qty: f64,
    pub tp_target: f64,
    pub sl_target: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn open(mint: &str, symbol: &str, entry_price: f64, config: &SimulationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            mint: mint.to_string(),
            symbol: symbol.to_string(),
            entry_price,
            qty: config.buy_usd / entry_price,
            tp_target: entry_price * (1.0 + config.tp_pct / 100.0),
            sl_target: entry_price * (1.0 - config.sl_pct / 100.0),
            opened_at: Utc::now(),
        }
    }

    pub fn cost(&self) -> f64 {
        self.entry_price * self.qty
    }

    /// Realized PnL in USD at `exit_price`
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.qty
    }

    pub fn pnl_pct_at(&self, exit_price: f64) -> f64 {
        (exit_price / self.entry_price - 1.0) * 100.0
    }
}

/// Close event for a simulated position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub position: Position,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
    /// Price observations before the close
    pub ticks: u32,
}

impl TradeResult {
    pub fn close(position: Position, exit_price: f64, reason: CloseReason, ticks: u32) -> Self {
        Self {
            pnl: position.pnl_at(exit_price),
            pnl_pct: position.pnl_pct_at(exit_price),
            position,
            exit_price,
            reason,
            closed_at: Utc::now(),
            ticks,
        }
    }

    pub fn is_profitable(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn held_ms(&self) -> i64 {
        (self.closed_at - self.position.opened_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_and_qty() {
        let p = Position::open("mint", "SYM", 1.0, &SimulationConfig::default());
        assert_eq!(p.qty, 100.0);
        assert!((p.tp_target - 1.25).abs() < 1e-12);
        assert!((p.sl_target - 0.80).abs() < 1e-12);
        assert!((p.cost() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_close_computes_pnl() {
        let p = Position::open("mint", "SYM", 0.01, &SimulationConfig::default());
        let r = TradeResult::close(p, 0.008, CloseReason::StopLoss, 3);
        assert!((r.pnl + 20.0).abs() < 1e-9);
        assert!((r.pnl_pct + 20.0).abs() < 1e-9);
        assert!(!r.is_profitable());
        assert_eq!(r.reason.to_string(), "SL");
    }
}
