//! Market-data providers used to enrich candidates
//!
//! Every provider answers the same question (what is known about this
//! mint right now) and may leave any field unknown.

pub mod birdeye;
pub mod dexscreener;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::EnrichmentConfig;
use crate::error::Result;
use crate::types::MarketSnapshot;

pub use birdeye::BirdeyeClient;
pub use dexscreener::DexScreenerClient;

/// External source of price/liquidity/volume/tax/authority data
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the provider has nothing for this mint
    async fn get_market_snapshot(&self, mint: &str) -> Result<Option<MarketSnapshot>>;
}

/// Providers enabled by configuration, in merge-priority order
pub fn build_providers(config: &EnrichmentConfig) -> Vec<Arc<dyn MarketDataProvider>> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut providers: Vec<Arc<dyn MarketDataProvider>> = Vec::new();

    if !config.birdeye_key.is_empty() {
        providers.push(Arc::new(BirdeyeClient::new(
            &config.birdeye_base_url,
            &config.birdeye_key,
            timeout,
        )));
    }
    if config.dexscreener_enabled {
        providers.push(Arc::new(DexScreenerClient::new(timeout)));
    }

    info!(
        providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
        "market data providers"
    );
    providers
}
