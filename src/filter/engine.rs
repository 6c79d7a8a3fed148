//! Layered candidate filter
//!
//! Rules run top to bottom and stop at the first decisive one:
//! mint lists, enrichment of missing fields, authority ban, tax ban,
//! then age-dependent liquidity/volume floors.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::enrichment::EnrichmentCache;
use super::lists::AccessLists;
use super::Filter;
use crate::config::FilterConfig;
use crate::error::Result;
use crate::pipeline::PipelineMetrics;
use crate::types::{fill, Candidate, FilterReason, FilterVerdict, MarketSnapshot, NO_AUTHORITY};

/// Early-candidate volume floors never exceed these
const EARLY_VOL_5M_CAP: f64 = 50.0;
const EARLY_VOL_24H_CAP: f64 = 200.0;

pub struct FilterEngine {
    config: FilterConfig,
    lists: AccessLists,
    enrichment: Option<Arc<EnrichmentCache>>,
    metrics: Arc<PipelineMetrics>,
}

impl FilterEngine {
    pub fn new(
        config: FilterConfig,
        enrichment: Option<Arc<EnrichmentCache>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let lists = AccessLists::new(
            config.allowlist_mints.iter().cloned(),
            config.blocklist_mints.iter().cloned(),
        );
        Self {
            config,
            lists,
            enrichment,
            metrics,
        }
    }

    pub async fn filter_candidate(&self, candidate: &Candidate) -> FilterVerdict {
        self.filter_candidate_at(candidate, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Evaluate against an explicit clock (epoch ms)
    pub async fn filter_candidate_at(&self, candidate: &Candidate, now_ms: i64) -> FilterVerdict {
        let verdict = self.decide(candidate, now_ms).await;
        self.metrics.reasons().bump(verdict.reason);
        verdict
    }

    async fn decide(&self, candidate: &Candidate, now_ms: i64) -> FilterVerdict {
        if candidate.mint.is_empty() {
            return FilterVerdict::reject(FilterReason::InvalidCandidate);
        }
        if self.lists.is_blocked(&candidate.mint) {
            return FilterVerdict::reject(FilterReason::Blocklist);
        }
        if self.lists.is_allowed(&candidate.mint) {
            return FilterVerdict::accept(FilterReason::Allowlist);
        }

        let age_sec = age_secs(candidate.created_at_ms, now_ms);
        let is_early = age_sec <= self.config.early_age_sec;

        let mut c = candidate.clone();
        if self.needs_enrichment(&c, is_early) {
            if let Some(cache) = &self.enrichment {
                if let Some(snapshot) = cache.enrich(&c.mint).await {
                    merge_into(&mut c, &snapshot);
                    debug!(mint = %c.mint, "candidate enriched");
                }
            }
        }

        if self.authority_banned(&c) {
            return FilterVerdict::reject(FilterReason::AuthBanned);
        }
        if self.tax_too_high(&c) {
            return FilterVerdict::reject(FilterReason::TaxTooHigh);
        }

        let m = &c.metrics;
        let vol5 = m.volume_5m_usd.unwrap_or(0.0);
        let vol24 = m.volume_24h_usd.unwrap_or(0.0);

        if is_early {
            let Some(liq) = m.liquidity_usd else {
                return if self.config.early_fast_pass {
                    FilterVerdict::accept(FilterReason::EarlyFastpass)
                } else {
                    FilterVerdict::reject(FilterReason::EarlyNoLiqMetrics)
                };
            };
            if liq < self.config.early_min_liq_usd {
                return FilterVerdict::reject(FilterReason::EarlyLiqTooLow);
            }
            if self.config.early_require_vol {
                let floor_5m = EARLY_VOL_5M_CAP.min(self.config.min_vol_usd_5m);
                let floor_24h = EARLY_VOL_24H_CAP.min(self.config.min_vol_usd_24h);
                if vol5 < floor_5m && vol24 < floor_24h {
                    return FilterVerdict::reject(FilterReason::EarlyVolTooLow);
                }
            }
            return FilterVerdict::accept_with(FilterReason::EarlyPass, c.metrics);
        }

        let Some(liq) = m.liquidity_usd else {
            return FilterVerdict::reject(FilterReason::NoLiqMetrics);
        };
        if liq < self.config.min_liq_usd {
            return FilterVerdict::reject(FilterReason::LiqTooLow);
        }
        if vol5 < self.config.min_vol_usd_5m && vol24 < self.config.min_vol_usd_24h {
            return FilterVerdict::reject(FilterReason::VolTooLow);
        }
        FilterVerdict::accept_with(FilterReason::Pass, c.metrics)
    }

    fn needs_enrichment(&self, c: &Candidate, is_early: bool) -> bool {
        if self.config.fast_path_no_onchain_check {
            return false;
        }
        let m = &c.metrics;
        let vol_required = !is_early || self.config.early_require_vol;
        let auth_checked = self.config.ban_freeze || self.config.ban_mint_auth;

        m.liquidity_usd.is_none()
            || (vol_required && !m.has_volume())
            || !m.has_taxes()
            || (auth_checked && !c.token_info.is_complete())
    }

    fn authority_banned(&self, c: &Candidate) -> bool {
        let set = |a: &Option<String>| a.as_deref().is_some_and(|a| a != NO_AUTHORITY);
        (self.config.ban_freeze && set(&c.token_info.freeze_authority))
            || (self.config.ban_mint_auth && set(&c.token_info.mint_authority))
    }

    fn tax_too_high(&self, c: &Candidate) -> bool {
        let m = &c.metrics;
        if m.buy_tax_pct.is_none() && m.sell_tax_pct.is_none() {
            return false;
        }
        let buy = m.buy_tax_pct.unwrap_or(0.0);
        let sell = m.sell_tax_pct.unwrap_or(0.0);
        buy > self.config.max_tax_pct || sell > self.config.max_tax_pct
    }
}

#[async_trait]
impl Filter for FilterEngine {
    fn name(&self) -> &'static str {
        "layered"
    }

    async fn evaluate(&self, candidate: &Candidate) -> Result<FilterVerdict> {
        Ok(self.filter_candidate(candidate).await)
    }
}

/// Whole seconds since creation, never negative
pub fn age_secs(created_at_ms: i64, now_ms: i64) -> u64 {
    (now_ms - created_at_ms).max(0) as u64 / 1000
}

/// Fill unknown candidate fields from a snapshot
fn merge_into(c: &mut Candidate, s: &MarketSnapshot) {
    fill(&mut c.price, &s.price_usd);
    fill(&mut c.metrics.liquidity_usd, &s.liquidity_usd);
    fill(&mut c.metrics.volume_5m_usd, &s.volume_5m_usd);
    fill(&mut c.metrics.volume_24h_usd, &s.volume_24h_usd);
    fill(&mut c.metrics.buy_tax_pct, &s.buy_tax_pct);
    fill(&mut c.metrics.sell_tax_pct, &s.sell_tax_pct);
    fill(&mut c.token_info.freeze_authority, &s.freeze_authority);
    fill(&mut c.token_info.mint_authority, &s.mint_authority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::filter::enrichment::tests::FixedProvider;
    use crate::types::CandidateMetrics;
    use std::sync::atomic::Ordering;

    const MINT: &str = "So11111111111111111111111111111111111111112";
    const NOW: i64 = 1_700_000_000_000;

    fn engine(config: FilterConfig) -> FilterEngine {
        FilterEngine::new(config, None, Arc::new(PipelineMetrics::new()))
    }

    fn candidate(age_sec: i64, liq: Option<f64>, v5: Option<f64>, v24: Option<f64>) -> Candidate {
        let mut c = Candidate::from_ledger(MINT.into(), NOW - age_sec * 1000);
        c.metrics = CandidateMetrics {
            liquidity_usd: liq,
            volume_5m_usd: v5,
            volume_24h_usd: v24,
            buy_tax_pct: Some(0.0),
            sell_tax_pct: Some(0.0),
        };
        c.token_info.freeze_authority = Some(NO_AUTHORITY.into());
        c.token_info.mint_authority = Some(NO_AUTHORITY.into());
        c
    }

    #[tokio::test]
    async fn test_early_liquidity_too_low() {
        let e = engine(FilterConfig::default());
        let v = e.filter_candidate_at(&candidate(0, Some(50.0), None, None), NOW).await;
        assert!(!v.pass);
        assert_eq!(v.reason, FilterReason::EarlyLiqTooLow);
    }

    #[tokio::test]
    async fn test_mature_candidate_passes_with_metrics() {
        let e = engine(FilterConfig::default());
        let c = candidate(600, Some(9000.0), None, Some(6000.0));
        let v = e.filter_candidate_at(&c, NOW).await;
        assert!(v.pass);
        assert_eq!(v.reason, FilterReason::Pass);
        assert_eq!(v.metrics.unwrap().liquidity_usd, Some(9000.0));
    }

    #[tokio::test]
    async fn test_early_boundary_is_inclusive() {
        let e = engine(FilterConfig::default());
        let at = candidate(180, Some(400.0), None, None);
        let after = candidate(181, Some(400.0), None, None);
        assert_eq!(e.filter_candidate_at(&at, NOW).await.reason, FilterReason::EarlyPass);
        assert_eq!(e.filter_candidate_at(&after, NOW).await.reason, FilterReason::LiqTooLow);
    }

    #[tokio::test]
    async fn test_future_creation_counts_as_age_zero() {
        assert_eq!(age_secs(NOW + 5_000, NOW), 0);
        assert_eq!(age_secs(NOW - 1_999, NOW), 1);
    }

    #[tokio::test]
    async fn test_verdict_is_deterministic() {
        let e = engine(FilterConfig::default());
        let c = candidate(600, Some(100.0), Some(1.0), Some(1.0));
        let first = e.filter_candidate_at(&c, NOW).await;
        let second = e.filter_candidate_at(&c, NOW).await;
        assert_eq!(first, second);
        assert_eq!(e.metrics.reasons().get(FilterReason::LiqTooLow), 2);
    }

    #[tokio::test]
    async fn test_authority_ban() {
        let e = engine(FilterConfig::default());
        let mut c = candidate(600, Some(9000.0), Some(500.0), None);
        c.token_info.freeze_authority = Some("SomeRealAuthority1111111111111111111111111".into());
        assert_eq!(e.filter_candidate_at(&c, NOW).await.reason, FilterReason::AuthBanned);

        let e = engine(FilterConfig {
            ban_freeze: false,
            ..FilterConfig::default()
        });
        assert_eq!(e.filter_candidate_at(&c, NOW).await.reason, FilterReason::Pass);
    }

    #[tokio::test]
    async fn test_tax_too_high_either_side() {
        let e = engine(FilterConfig::default());
        let mut c = candidate(600, Some(9000.0), Some(500.0), None);
        c.metrics.buy_tax_pct = None;
        c.metrics.sell_tax_pct = Some(12.5);
        assert_eq!(e.filter_candidate_at(&c, NOW).await.reason, FilterReason::TaxTooHigh);

        c.metrics.sell_tax_pct = Some(12.0);
        assert_eq!(e.filter_candidate_at(&c, NOW).await.reason, FilterReason::Pass);
    }

    #[tokio::test]
    async fn test_mint_lists() {
        let e = engine(FilterConfig {
            allowlist_mints: vec![MINT.into()],
            ..FilterConfig::default()
        });
        let c = candidate(600, None, None, None);
        let v = e.filter_candidate_at(&c, NOW).await;
        assert!(v.pass);
        assert_eq!(v.reason, FilterReason::Allowlist);

        let e = engine(FilterConfig {
            allowlist_mints: vec![MINT.into()],
            blocklist_mints: vec![MINT.into()],
            ..FilterConfig::default()
        });
        assert_eq!(e.filter_candidate_at(&c, NOW).await.reason, FilterReason::Blocklist);
    }

    #[tokio::test]
    async fn test_missing_mint_is_invalid() {
        let e = engine(FilterConfig::default());
        let mut c = candidate(0, None, None, None);
        c.mint.clear();
        assert_eq!(
            e.filter_candidate_at(&c, NOW).await.reason,
            FilterReason::InvalidCandidate
        );
    }

    #[tokio::test]
    async fn test_early_branches_without_liquidity() {
        let c = candidate(10, None, None, None);
        let e = engine(FilterConfig {
            early_fast_pass: true,
            ..FilterConfig::default()
        });
        assert_eq!(e.filter_candidate_at(&c, NOW).await.reason, FilterReason::EarlyFastpass);

        let e = engine(FilterConfig {
            early_fast_pass: false,
            ..FilterConfig::default()
        });
        assert_eq!(
            e.filter_candidate_at(&c, NOW).await.reason,
            FilterReason::EarlyNoLiqMetrics
        );
    }

    #[tokio::test]
    async fn test_early_volume_floor_relaxed() {
        let e = engine(FilterConfig {
            early_require_vol: true,
            ..FilterConfig::default()
        });
        let low = candidate(10, Some(400.0), Some(49.0), Some(199.0));
        assert_eq!(e.filter_candidate_at(&low, NOW).await.reason, FilterReason::EarlyVolTooLow);

        let ok = candidate(10, Some(400.0), Some(50.0), None);
        assert_eq!(e.filter_candidate_at(&ok, NOW).await.reason, FilterReason::EarlyPass);
    }

    #[tokio::test]
    async fn test_enrichment_only_fills_gaps() {
        let provider = Arc::new(FixedProvider::new(
            "fixed",
            Some(MarketSnapshot {
                liquidity_usd: Some(1.0),
                volume_24h_usd: Some(7000.0),
                ..Default::default()
            }),
        ));
        let cache = Arc::new(EnrichmentCache::new(
            &EnrichmentConfig {
                rps: 10.0,
                ..EnrichmentConfig::default()
            },
            vec![provider.clone()],
        ));
        let e = FilterEngine::new(
            FilterConfig::default(),
            Some(cache),
            Arc::new(PipelineMetrics::new()),
        );

        let c = candidate(600, Some(9000.0), None, None);
        let v = e.filter_candidate_at(&c, NOW).await;
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
        assert_eq!(v.reason, FilterReason::Pass);
        let metrics = v.metrics.unwrap();
        assert_eq!(metrics.liquidity_usd, Some(9000.0));
        assert_eq!(metrics.volume_24h_usd, Some(7000.0));
    }

    #[tokio::test]
    async fn test_fast_path_skips_enrichment() {
        let provider = Arc::new(FixedProvider::new("fixed", None));
        let cache = Arc::new(EnrichmentCache::new(
            &EnrichmentConfig::default(),
            vec![provider.clone()],
        ));
        let e = FilterEngine::new(
            FilterConfig {
                fast_path_no_onchain_check: true,
                ..FilterConfig::default()
            },
            Some(cache),
            Arc::new(PipelineMetrics::new()),
        );

        e.filter_candidate_at(&candidate(600, None, None, None), NOW).await;
        assert_eq!(provider.calls.load(Ordering::Relaxed), 0);
    }
}
