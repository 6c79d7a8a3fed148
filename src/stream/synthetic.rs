//! Synthetic candidate generator for offline runs and demos

use async_trait::async_trait;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::source::CandidateSource;
use crate::config::SyntheticConfig;
use crate::error::Result;
use crate::types::{Candidate, CandidateMetrics, CandidateOrigin, TokenInfo, NO_AUTHORITY};

/// Emits plausible-looking candidates on a fixed period
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests
    pub fn with_seed(config: SyntheticConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn period(&self) -> Duration {
        let ms = if self.config.fast {
            self.config.fast_interval_ms
        } else {
            self.config.interval_ms
        };
        Duration::from_millis(ms.max(1))
    }

    /// One random candidate observed at `now_ms`
    pub fn generate(&self, now_ms: i64) -> Candidate {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        let mint = bs58::encode(bytes).into_string();

        let liquidity = rng.gen_range(500.0..5500.0);
        let volume_5m = rng.gen_range(50.0..2050.0);
        let volume_24h = volume_5m * rng.gen_range(50.0..150.0);
        let price = rng.gen_range(0.0001..0.0501);

        let symbol = format!("SIM{}", &mint[..4]);

        Candidate {
            symbol,
            mint,
            signature: None,
            created_at_ms: now_ms,
            metrics: CandidateMetrics {
                liquidity_usd: Some(liquidity),
                volume_5m_usd: Some(volume_5m),
                volume_24h_usd: Some(volume_24h),
                buy_tax_pct: Some(0.0),
                sell_tax_pct: Some(0.0),
            },
            // Renounced, so the layered filter never needs to enrich
            token_info: TokenInfo {
                freeze_authority: Some(NO_AUTHORITY.to_string()),
                mint_authority: Some(NO_AUTHORITY.to_string()),
            },
            price: Some(price),
            origin: CandidateOrigin::Synthetic,
        }
    }
}

#[async_trait]
impl CandidateSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn run(
        self: Arc<Self>,
        out: mpsc::Sender<Candidate>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(period_ms = self.period().as_millis() as u64, fast = self.config.fast, "starting synthetic source");

        let mut ticker = interval(self.period());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let candidate = self.generate(chrono::Utc::now().timestamp_millis());
                    debug!(mint = %candidate.mint, symbol = %candidate.symbol, "synthetic candidate");
                    match out.try_send(candidate) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(c)) => {
                            warn!(mint = %c.mint, "candidate channel full, dropping");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("synthetic source stopped");
        Ok(())
    }
}
