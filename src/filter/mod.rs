//! Candidate filtering
//!
//! `FilterEngine` is the layered filter with enrichment and age classes;
//! `BasicFilter` is the threshold-only fallback. Both sit behind the
//! `Filter` trait so the gate can pick one at startup.

pub mod basic;
pub mod engine;
pub mod enrichment;
pub mod lists;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, FilterStrategy};
use crate::error::Result;
use crate::market;
use crate::pipeline::PipelineMetrics;
use crate::types::{Candidate, FilterVerdict};

pub use basic::BasicFilter;
pub use engine::FilterEngine;
pub use enrichment::EnrichmentCache;
pub use lists::AccessLists;

/// Accept/reject decision for one candidate
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` means the filter could not decide; the gate falls back
    async fn evaluate(&self, candidate: &Candidate) -> Result<FilterVerdict>;
}

/// Enrichment cache over the configured providers, if enabled
pub fn build_enrichment(config: &Config) -> Option<Arc<EnrichmentCache>> {
    if !config.enrichment.enabled {
        return None;
    }
    let providers = market::build_providers(&config.enrichment);
    Some(Arc::new(EnrichmentCache::new(&config.enrichment, providers)))
}

/// Primary filter for the configured strategy
pub fn build_filter(
    config: &Config,
    enrichment: Option<Arc<EnrichmentCache>>,
    metrics: Arc<PipelineMetrics>,
) -> Arc<dyn Filter> {
    match config.filters.strategy {
        FilterStrategy::Layered => Arc::new(FilterEngine::new(
            config.filters.clone(),
            enrichment,
            metrics,
        )),
        FilterStrategy::Basic => Arc::new(BasicFilter::new(
            config.filters.clone(),
            AccessLists::new(
                config.filters.allowlist_mints.iter().cloned(),
                config.filters.blocklist_mints.iter().cloned(),
            ),
        )
        .with_metrics(metrics)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;

    #[test]
    fn test_build_filter_strategy() {
        let mut config = Config::default();
        config.filters = FilterConfig {
            strategy: FilterStrategy::Basic,
            ..FilterConfig::default()
        };
        let metrics = Arc::new(PipelineMetrics::new());
        assert_eq!(build_filter(&config, None, metrics.clone()).name(), "basic");

        config.filters.strategy = FilterStrategy::Layered;
        assert_eq!(build_filter(&config, None, metrics).name(), "layered");
    }

    #[test]
    fn test_enrichment_disabled() {
        let mut config = Config::default();
        config.enrichment.enabled = false;
        assert!(build_enrichment(&config).is_none());
    }
}
