// DexScreener API client for pair-level price, liquidity and volume
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MarketDataProvider;
use crate::error::{Error, Result};
use crate::types::MarketSnapshot;

const DEXSCREENER_BASE: &str = "https://api.dexscreener.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    pub usd: Option<f64>,
    pub base: Option<f64>,
    pub quote: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseToken {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DexPair {
    #[serde(rename = "chainId")]
    pub chain_id: String,
    #[serde(rename = "dexId")]
    pub dex_id: String,
    #[serde(rename = "pairAddress")]
    pub pair_address: String,
    #[serde(rename = "baseToken")]
    pub base_token: BaseToken,
    #[serde(rename = "priceUsd")]
    pub price_usd: Option<String>,
    pub volume: Option<Volume>,
    pub liquidity: Option<Liquidity>,
    #[serde(rename = "pairCreatedAt")]
    pub pair_created_at: Option<i64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> Option<f64> {
        self.liquidity.as_ref().and_then(|l| l.usd)
    }

    pub fn to_snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            price_usd: self
                .price_usd
                .as_ref()
                .and_then(|p| p.parse::<f64>().ok()),
            liquidity_usd: self.liquidity_usd(),
            volume_5m_usd: self.volume.as_ref().and_then(|v| v.m5),
            volume_24h_usd: self.volume.as_ref().and_then(|v| v.h24),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

/// Solana pair for `mint`: Raydium first, otherwise the deepest pool
pub fn best_pair(mint: &str, pairs: &[DexPair]) -> Option<DexPair> {
    let solana: Vec<&DexPair> = pairs
        .iter()
        .filter(|p| p.chain_id == "solana" && p.base_token.address == mint)
        .collect();

    let deepest = |dex: Option<&str>| {
        solana
            .iter()
            .filter(|p| dex.map_or(true, |d| p.dex_id == d))
            .max_by(|a, b| {
                let la = a.liquidity_usd().unwrap_or(0.0);
                let lb = b.liquidity_usd().unwrap_or(0.0);
                la.total_cmp(&lb)
            })
            .map(|p| (*p).clone())
    };

    deepest(Some("raydium")).or_else(|| deepest(None))
}

pub struct DexScreenerClient {
    client: reqwest::Client,
}

impl DexScreenerClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn get_token_pairs(&self, mint: &str) -> Result<Option<DexPair>> {
        let url = format!("{}/latest/dex/tokens/{}", DEXSCREENER_BASE, mint);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::MarketData(format!(
                "dexscreener returned {}",
                resp.status()
            )));
        }
        let data: TokenPairsResponse = resp.json().await?;

        Ok(data.pairs.and_then(|pairs| best_pair(mint, &pairs)))
    }
}

#[async_trait]
impl MarketDataProvider for DexScreenerClient {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    async fn get_market_snapshot(&self, mint: &str) -> Result<Option<MarketSnapshot>> {
        Ok(self
            .get_token_pairs(mint)
            .await?
            .map(|pair| pair.to_snapshot())
            .filter(|snapshot| !snapshot.is_empty()))
    }
}
