//! Threshold-only filter
//!
//! No enrichment and no age classes. Used when configured as the primary
//! strategy and as the gate's fallback when the primary filter fails.

use async_trait::async_trait;
use std::sync::Arc;

use super::lists::AccessLists;
use super::Filter;
use crate::config::FilterConfig;
use crate::error::Result;
use crate::pipeline::PipelineMetrics;
use crate::types::{Candidate, FilterReason, FilterVerdict};

pub struct BasicFilter {
    config: FilterConfig,
    lists: AccessLists,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl BasicFilter {
    pub fn new(config: FilterConfig, lists: AccessLists) -> Self {
        Self {
            config,
            lists,
            metrics: None,
        }
    }

    /// Count every verdict in the shared reason histogram
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn check(&self, c: &Candidate) -> FilterVerdict {
        let verdict = self.decide(c);
        if let Some(metrics) = &self.metrics {
            metrics.reasons().bump(verdict.reason);
        }
        verdict
    }

    fn decide(&self, c: &Candidate) -> FilterVerdict {
        if let Some(reason) = self.lists.check(c) {
            return FilterVerdict::reject(reason);
        }

        // A metric counts only when it is a positive finite number
        let have = |v: Option<f64>| v.filter(|x| x.is_finite() && *x > 0.0);
        let liq = have(c.metrics.liquidity_usd);
        let vol5 = have(c.metrics.volume_5m_usd);
        let vol24 = have(c.metrics.volume_24h_usd);

        if !self.config.fast_path_no_onchain_check
            && (liq.is_none() || (vol5.is_none() && vol24.is_none()))
        {
            return FilterVerdict::reject(FilterReason::MetricsMissing);
        }

        if let Some(liq) = liq {
            if liq < self.config.min_liq_usd {
                return FilterVerdict::reject(FilterReason::LiqTooLow);
            }
        }

        match (vol5, vol24) {
            (Some(v5), _) if self.config.min_vol_usd_5m > 0.0 && v5 < self.config.min_vol_usd_5m => {
                FilterVerdict::reject(FilterReason::Vol5mTooLow)
            }
            (None, Some(v24))
                if self.config.min_vol_usd_24h > 0.0 && v24 < self.config.min_vol_usd_24h =>
            {
                FilterVerdict::reject(FilterReason::Vol24hTooLow)
            }
            _ => FilterVerdict::accept_with(FilterReason::Pass, c.metrics.clone()),
        }
    }
}

#[async_trait]
impl Filter for BasicFilter {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn evaluate(&self, candidate: &Candidate) -> Result<FilterVerdict> {
        Ok(self.check(candidate))
    }
}
