//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SourceKind};
use crate::error::Error;
use crate::filter::{self, AccessLists, BasicFilter, FilterEngine};
use crate::pipeline::{GatingPipeline, LogSink, PipelineMetrics};
use crate::stream::{is_valid_mint, CandidateSource, LedgerSignalSource, RpcLedger, SyntheticSource};
use crate::trading::TradeSimulator;
use crate::types::Candidate;

/// Candidate source for the selected kind
fn build_source(config: &Config, kind: SourceKind) -> Result<Arc<dyn CandidateSource>> {
    Ok(match kind {
        SourceKind::Ledger => {
            let ledger = RpcLedger::new(
                &config.rpc.endpoint,
                &config.rpc.commitment,
                config.rpc.timeout_ms,
            )
            .context("failed to create RPC ledger client")?;
            Arc::new(LedgerSignalSource::new(
                Arc::new(ledger),
                config.listener.clone(),
            ))
        }
        SourceKind::Synthetic => Arc::new(SyntheticSource::new(config.synthetic.clone())),
    })
}

/// Run the pipeline until Ctrl-C
pub async fn run(config: &Config, source_override: Option<SourceKind>) -> Result<()> {
    let kind = source_override.unwrap_or(config.source.kind);
    if kind == SourceKind::Ledger && config.listener.program_ids.is_empty() {
        anyhow::bail!("ledger source needs at least one program id");
    }

    let metrics = Arc::new(PipelineMetrics::new());
    let enrichment = filter::build_enrichment(config);
    let primary = filter::build_filter(config, enrichment.clone(), metrics.clone());
    let fallback = BasicFilter::new(
        config.filters.clone(),
        AccessLists::new(
            config.filters.allowlist_mints.iter().cloned(),
            config.filters.blocklist_mints.iter().cloned(),
        ),
    )
    .with_metrics(metrics.clone());
    let gate_lists = AccessLists::load_from_files(
        config.pipeline.allowlist_path.as_deref(),
        config.pipeline.blocklist_path.as_deref(),
    );

    let gate = Arc::new(GatingPipeline::new(
        config.pipeline.clone(),
        primary,
        fallback,
        gate_lists,
        Arc::new(TradeSimulator::new(config.simulation.clone())),
        Arc::new(LogSink),
        metrics,
    ));

    let source = build_source(config, kind)?;
    info!(
        source = source.name(),
        filter = ?config.filters.strategy,
        providers = enrichment.as_ref().map_or(0, |cache| cache.provider_count()),
        buy_usd = config.simulation.buy_usd,
        tp_pct = config.simulation.tp_pct,
        sl_pct = config.simulation.sl_pct,
        "starting pool-watch"
    );

    let (tx, rx) = mpsc::channel::<Candidate>(config.pipeline.channel_capacity);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let gate_handle = tokio::spawn(gate.clone().run(rx, shutdown_tx.subscribe()));
    let mut source_handle = tokio::spawn(source.run(tx, shutdown_tx.subscribe()));

    let mut housekeeping =
        tokio::time::interval(Duration::from_secs(config.pipeline.summary_interval_secs.max(1)));
    housekeeping.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            res = &mut source_handle => {
                match res {
                    Ok(Ok(())) => warn!("candidate source stopped"),
                    Ok(Err(e)) => error!(error = %e, "candidate source failed"),
                    Err(e) => error!(error = %e, "candidate source task panicked"),
                }
                break;
            }
            _ = housekeeping.tick() => {
                if let Some(cache) = &enrichment {
                    let removed = cache.cleanup();
                    let (hits, misses, limited, failures) = cache.stats().snapshot();
                    info!(hits, misses, limited, failures, cached = cache.cached_len(), removed, "enrichment stats");
                }
            }
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = gate_handle.await {
        error!(error = %e, "gating task ended abnormally");
    }
    if !source_handle.is_finished() {
        source_handle.abort();
    }
    debug!("shutdown complete");
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Evaluate one mint through the layered filter and print the verdict
pub async fn check(config: &Config, mint: &str, age_sec: u64) -> Result<()> {
    if !is_valid_mint(mint) {
        return Err(Error::InvalidMint(mint.to_string()).into());
    }

    let metrics = Arc::new(PipelineMetrics::new());
    let engine = FilterEngine::new(
        config.filters.clone(),
        filter::build_enrichment(config),
        metrics,
    );

    let now_ms = chrono::Utc::now().timestamp_millis();
    let candidate = Candidate::from_ledger(mint.to_string(), now_ms - (age_sec as i64) * 1000);

    let verdict = engine.filter_candidate_at(&candidate, now_ms).await;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
