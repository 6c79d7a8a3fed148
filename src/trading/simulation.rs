//! Paper-trade simulator
//!
//! Opens a position at the candidate's price and watches a price feed
//! until take-profit, stop-loss or the watch window runs out. The feed is
//! a `PriceSource`; the default random walk stands in for a live market.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::position::{CloseReason, Position, TradeResult};
use crate::config::SimulationConfig;
use crate::types::Candidate;

/// Supplies successive prices for an open position
#[async_trait]
pub trait PriceSource: Send {
    /// Wait for the next observation and return it
    async fn next_price(&mut self, current: f64) -> f64;

    /// Exit price when the watch window elapses without a crossing
    fn timeout_price(&mut self, last: f64) -> f64 {
        last
    }
}

/// Bounded multiplicative random walk with jittered ticks
pub struct RandomWalk {
    rng: StdRng,
    tick: Duration,
    max_jitter_ms: u64,
    drift: f64,
}

impl RandomWalk {
    pub fn new(config: &SimulationConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            tick: Duration::from_millis(config.price_tick_ms),
            max_jitter_ms: config.max_jitter_ms.min(config.price_tick_ms),
            drift: config.drift_pct / 100.0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            self.rng.gen_range(0..self.max_jitter_ms)
        };
        self.tick + Duration::from_millis(jitter)
    }
}

#[async_trait]
impl PriceSource for RandomWalk {
    async fn next_price(&mut self, current: f64) -> f64 {
        tokio::time::sleep(self.next_delay()).await;
        let step = if self.drift > 0.0 {
            self.rng.gen_range(-self.drift..=self.drift)
        } else {
            0.0
        };
        current * (1.0 + step)
    }

    fn timeout_price(&mut self, last: f64) -> f64 {
        last * self.rng.gen_range(0.98..=1.04)
    }
}

pub struct TradeSimulator {
    config: SimulationConfig,
}

impl TradeSimulator {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Entry price: the candidate's own price when known and positive
    pub fn entry_price(&self, candidate: &Candidate) -> f64 {
        candidate
            .price
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(self.config.default_entry_price)
    }

    /// Simulate against the default random walk
    pub async fn simulate(&self, candidate: &Candidate) -> TradeResult {
        let mut feed = RandomWalk::new(&self.config, None);
        self.simulate_with(candidate, &mut feed).await
    }

    pub async fn simulate_with(
        &self,
        candidate: &Candidate,
        feed: &mut dyn PriceSource,
    ) -> TradeResult {
        let entry = self.entry_price(candidate);
        let position = Position::open(&candidate.mint, candidate.label(), entry, &self.config);

        info!(
            id = %position.id,
            mint = %position.mint,
            entry = entry,
            qty = position.qty,
            tp = position.tp_target,
            sl = position.sl_target,
            "sim open"
        );

        let watch = Duration::from_secs(self.config.watch_sec);
        let started = Instant::now();
        let mut price = entry;
        let mut ticks = 0u32;

        while started.elapsed() < watch {
            price = feed.next_price(price).await;
            ticks += 1;
            debug!(id = %position.id, tick = ticks, price = price, "sim tick");

            if price >= position.tp_target {
                return TradeResult::close(position, price, CloseReason::TakeProfit, ticks);
            }
            if price <= position.sl_target {
                return TradeResult::close(position, price, CloseReason::StopLoss, ticks);
            }
        }

        let exit = feed.timeout_price(price);
        TradeResult::close(position, exit, CloseReason::Timeout, ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays fixed prices, one per tick, then holds the last one
    struct Scripted {
        prices: VecDeque<f64>,
        tick: Duration,
    }

    impl Scripted {
        fn new(prices: &[f64]) -> Self {
            Self {
                prices: prices.iter().copied().collect(),
                tick: Duration::from_millis(2000),
            }
        }
    }

    #[async_trait]
    impl PriceSource for Scripted {
        async fn next_price(&mut self, current: f64) -> f64 {
            tokio::time::sleep(self.tick).await;
            self.prices.pop_front().unwrap_or(current)
        }
    }

    fn candidate(price: Option<f64>) -> Candidate {
        let mut c = Candidate::from_ledger("MINTAAAA".into(), 0);
        c.price = price;
        c
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_profit() {
        let sim = TradeSimulator::new(SimulationConfig::default());
        let mut feed = Scripted::new(&[1.1, 1.25]);
        let r = sim.simulate_with(&candidate(Some(1.0)), &mut feed).await;

        assert_eq!(r.reason, CloseReason::TakeProfit);
        assert_eq!(r.exit_price, 1.25);
        assert_eq!(r.ticks, 2);
        assert!((r.pnl - 0.25 * r.position.qty).abs() < 1e-9);
        assert!((r.pnl_pct - 25.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_loss() {
        let sim = TradeSimulator::new(SimulationConfig::default());
        let mut feed = Scripted::new(&[0.9, 0.8]);
        let r = sim.simulate_with(&candidate(Some(1.0)), &mut feed).await;
        assert_eq!(r.reason, CloseReason::StopLoss);
        assert!(r.pnl < 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_within_watch_window() {
        let sim = TradeSimulator::new(SimulationConfig::default());
        let mut feed = Scripted::new(&[]);
        let start = Instant::now();
        let r = sim.simulate_with(&candidate(None), &mut feed).await;

        assert_eq!(r.reason, CloseReason::Timeout);
        assert_eq!(r.position.entry_price, 0.01);
        assert_eq!(r.exit_price, 0.01);
        // 15 s window, 2 s ticks: the last tick starts before 15 s
        assert_eq!(r.ticks, 8);
        assert!(start.elapsed() <= Duration::from_secs(15) + Duration::from_millis(2000));
    }

    fn tight_config() -> SimulationConfig {
        SimulationConfig {
            tp_pct: 20.0,
            sl_pct: 10.0,
            ..SimulationConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_profit_at_exact_target() {
        let sim = TradeSimulator::new(tight_config());
        let mut feed = Scripted::new(&[1.05, 1.19, 1.20]);
        let r = sim.simulate_with(&candidate(Some(1.0)), &mut feed).await;

        assert_eq!(r.reason, CloseReason::TakeProfit);
        assert_eq!(r.exit_price, 1.20);
        assert_eq!(r.ticks, 3);
        assert!((r.pnl_pct - 20.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_loss_at_exact_target() {
        let sim = TradeSimulator::new(tight_config());
        let mut feed = Scripted::new(&[0.95, 0.91, 0.90]);
        let r = sim.simulate_with(&candidate(Some(1.0)), &mut feed).await;

        assert_eq!(r.reason, CloseReason::StopLoss);
        assert_eq!(r.exit_price, 0.90);
        assert_eq!(r.ticks, 3);
        assert!((r.pnl_pct + 10.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_near_misses_run_to_timeout() {
        let sim = TradeSimulator::new(tight_config());
        let script: Vec<f64> = (0..10).map(|i| if i % 2 == 0 { 1.19 } else { 0.91 }).collect();
        let mut feed = Scripted::new(&script);
        let r = sim.simulate_with(&candidate(Some(1.0)), &mut feed).await;

        assert_eq!(r.reason, CloseReason::Timeout);
        assert_eq!(r.ticks, 8);
        assert_eq!(r.exit_price, 0.91);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_walk_terminates() {
        let config = SimulationConfig::default();
        let sim = TradeSimulator::new(config.clone());
        let mut feed = RandomWalk::new(&config, Some(7));
        let start = Instant::now();
        let r = sim.simulate_with(&candidate(Some(0.5)), &mut feed).await;

        let bound = Duration::from_secs(config.watch_sec)
            + Duration::from_millis(config.price_tick_ms + config.max_jitter_ms);
        assert!(start.elapsed() <= bound);
        match r.reason {
            CloseReason::TakeProfit => assert!(r.exit_price >= r.position.tp_target),
            CloseReason::StopLoss => assert!(r.exit_price <= r.position.sl_target),
            CloseReason::Timeout => assert!(r.exit_price > 0.0),
        }
    }

    #[test]
    fn test_walk_step_is_bounded() {
        let config = SimulationConfig::default();
        let mut walk = RandomWalk::new(&config, Some(1));
        for _ in 0..1000 {
            let delay = walk.next_delay();
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay < Duration::from_millis(3500));
            let p = walk.timeout_price(1.0);
            assert!((0.98..=1.04).contains(&p));
        }
    }
}
