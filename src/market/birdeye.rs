//! Birdeye client: token overview (liquidity, volume, taxes) and token
//! info (authorities), fetched concurrently

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::MarketDataProvider;
use crate::error::{Error, Result};
use crate::types::MarketSnapshot;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenOverview {
    #[serde(default, alias = "price")]
    pub price_usd: Option<f64>,
    #[serde(default, alias = "liquidity")]
    pub liquidity_usd: Option<f64>,
    #[serde(default)]
    pub volume_5m_usd: Option<f64>,
    #[serde(default, alias = "v24hUSD")]
    pub volume_24h_usd: Option<f64>,
    #[serde(default)]
    pub buy_tax: Option<f64>,
    #[serde(default)]
    pub sell_tax: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenInfoData {
    #[serde(default)]
    pub freeze_authority: Option<String>,
    #[serde(default)]
    pub mint_authority: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BirdeyeResponse<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
}

/// Fold both endpoint payloads into one snapshot
pub fn to_snapshot(overview: Option<&TokenOverview>, info: Option<&TokenInfoData>) -> MarketSnapshot {
    let mut snapshot = MarketSnapshot::default();
    if let Some(o) = overview {
        snapshot.price_usd = o.price_usd;
        snapshot.liquidity_usd = o.liquidity_usd;
        snapshot.volume_5m_usd = o.volume_5m_usd;
        snapshot.volume_24h_usd = o.volume_24h_usd;
        snapshot.buy_tax_pct = o.buy_tax;
        snapshot.sell_tax_pct = o.sell_tax;
    }
    if let Some(i) = info {
        snapshot.freeze_authority = i.freeze_authority.clone();
        snapshot.mint_authority = i.mint_authority.clone();
    }
    snapshot
}

pub struct BirdeyeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl BirdeyeClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, mint: &str) -> Result<Option<T>> {
        let url = format!("{}/defi/{}?address={}", self.base_url, path, mint);
        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("x-chain", "solana")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::MarketData(format!(
                "birdeye {} returned {}",
                path,
                resp.status()
            )));
        }

        let body: BirdeyeResponse<T> = resp.json().await?;
        Ok(body.data)
    }
}

#[async_trait]
impl MarketDataProvider for BirdeyeClient {
    fn name(&self) -> &'static str {
        "birdeye"
    }

    async fn get_market_snapshot(&self, mint: &str) -> Result<Option<MarketSnapshot>> {
        let (overview, info) = futures::join!(
            self.get::<TokenOverview>("token_overview", mint),
            self.get::<TokenInfoData>("token_info", mint),
        );

        // One endpoint failing still leaves the other's fields usable
        let (overview, info) = match (overview, info) {
            (Err(e), Err(_)) => return Err(e),
            (o, i) => {
                if let Err(e) = &o {
                    debug!(mint = %mint, error = %e, "birdeye overview failed");
                }
                if let Err(e) = &i {
                    debug!(mint = %mint, error = %e, "birdeye token_info failed");
                }
                (o.ok().flatten(), i.ok().flatten())
            }
        };

        let snapshot = to_snapshot(overview.as_ref(), info.as_ref());
        Ok((!snapshot.is_empty()).then_some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overview_parse() {
        let json = r#"{
            "success": true,
            "data": {
                "liquidity_usd": 12000.5,
                "volume_5m_usd": 300,
                "volume_24h_usd": null,
                "buy_tax": 1.5
            }
        }"#;
        let resp: BirdeyeResponse<TokenOverview> = serde_json::from_str(json).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.liquidity_usd, Some(12000.5));
        assert_eq!(data.volume_5m_usd, Some(300.0));
        assert_eq!(data.volume_24h_usd, None);
        assert_eq!(data.sell_tax, None);
    }

    #[test]
    fn test_overview_aliases() {
        let json = r#"{"data": {"liquidity": 500.0, "v24hUSD": 42.0, "price": 0.01}}"#;
        let resp: BirdeyeResponse<TokenOverview> = serde_json::from_str(json).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.liquidity_usd, Some(500.0));
        assert_eq!(data.volume_24h_usd, Some(42.0));
        assert_eq!(data.price_usd, Some(0.01));
    }

    #[test]
    fn test_to_snapshot_combines_both() {
        let overview = TokenOverview {
            liquidity_usd: Some(1.0),
            sell_tax: Some(3.0),
            ..Default::default()
        };
        let info = TokenInfoData {
            freeze_authority: Some("11111111111111111111111111111111".into()),
            mint_authority: None,
        };
        let snap = to_snapshot(Some(&overview), Some(&info));
        assert_eq!(snap.liquidity_usd, Some(1.0));
        assert_eq!(snap.sell_tax_pct, Some(3.0));
        assert!(snap.freeze_authority.is_some());
        assert!(snap.mint_authority.is_none());

        assert!(to_snapshot(None, None).is_empty());
    }
}
