//! Configuration loading and validation
//!
//! Layering: built-in defaults -> optional TOML file -> `POOLWATCH__*`
//! environment variables. Each default first consults the flat variable
//! names (`MIN_LIQ_USD`, `TP_PCT`, ...) so existing `.env` files keep
//! working. Every option has a default; an empty environment is valid.

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;

/// Raydium programs watched when `RAYDIUM_PROGRAM_IDS` is unset
pub const DEFAULT_PROGRAM_IDS: [&str; 4] = [
    "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C", // CPMM
    "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", // AMM v4
    "5quBtoiQqxF9Jv6KYKctB59NT3gtJD2Y65kdnB1Uev3h", // CLMM helper
    "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK", // CLMM
];

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_timeout_ms(),
            commitment: default_commitment(),
        }
    }
}

/// Which candidate source feeds the pipeline
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ledger,
    Synthetic,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ledger" | "rpc" | "listener" => Ok(SourceKind::Ledger),
            "synthetic" | "sim" => Ok(SourceKind::Synthetic),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
        }
    }
}

/// How long to wait before re-fetching a not-yet-indexed transaction
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_program_ids")]
    pub program_ids: Vec<String>,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Signatures requested per program per poll
    #[serde(default = "default_signature_limit")]
    pub signature_limit: usize,
    #[serde(default = "default_fetch_rps")]
    pub fetch_rps: f64,
    #[serde(default = "default_emit_rps")]
    pub emit_rps: f64,
    #[serde(default = "default_max_tx_retries")]
    pub max_tx_retries: u32,
    #[serde(default = "default_retry_null_tx_ms")]
    pub retry_null_tx_ms: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: RetryBackoff,
    /// Ceiling for exponential retry delays
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_listener_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
    #[serde(default = "default_candidate_max_per_tx")]
    pub candidate_max_per_tx: usize,
    #[serde(default = "default_true")]
    pub mint_lookup_enabled: bool,
    #[serde(default = "default_mint_lookup_rps")]
    pub mint_lookup_rps: f64,
    #[serde(default = "default_mint_lookup_max_per_tx")]
    pub mint_lookup_max_per_tx: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_worker_tick_ms")]
    pub worker_tick_ms: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            program_ids: default_program_ids(),
            poll_ms: default_poll_ms(),
            signature_limit: default_signature_limit(),
            fetch_rps: default_fetch_rps(),
            emit_rps: default_emit_rps(),
            max_tx_retries: default_max_tx_retries(),
            retry_null_tx_ms: default_retry_null_tx_ms(),
            retry_backoff: default_retry_backoff(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            dedup_ttl_ms: default_listener_dedup_ttl_ms(),
            candidate_max_per_tx: default_candidate_max_per_tx(),
            mint_lookup_enabled: true,
            mint_lookup_rps: default_mint_lookup_rps(),
            mint_lookup_max_per_tx: default_mint_lookup_max_per_tx(),
            queue_capacity: default_queue_capacity(),
            worker_tick_ms: default_worker_tick_ms(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_synthetic_interval_ms")]
    pub interval_ms: u64,
    /// Faster generator (the old DEBUG_MARKET mode)
    #[serde(default = "default_debug_market")]
    pub fast: bool,
    #[serde(default = "default_fast_interval_ms")]
    pub fast_interval_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_synthetic_interval_ms(),
            fast: default_debug_market(),
            fast_interval_ms: default_fast_interval_ms(),
        }
    }
}

/// Filter implementation selected at startup
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    /// Full layered engine with enrichment
    Layered,
    /// Threshold-only filter, also used as the fallback
    Basic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_filter_strategy")]
    pub strategy: FilterStrategy,
    #[serde(default = "default_min_liq_usd")]
    pub min_liq_usd: f64,
    #[serde(default = "default_min_vol_usd_5m")]
    pub min_vol_usd_5m: f64,
    #[serde(default = "default_min_vol_usd_24h")]
    pub min_vol_usd_24h: f64,
    #[serde(default = "default_early_age_sec")]
    pub early_age_sec: u64,
    #[serde(default = "default_early_min_liq_usd")]
    pub early_min_liq_usd: f64,
    #[serde(default = "default_early_require_vol")]
    pub early_require_vol: bool,
    #[serde(default = "default_early_fast_pass")]
    pub early_fast_pass: bool,
    #[serde(default = "default_max_tax_pct")]
    pub max_tax_pct: f64,
    #[serde(default = "default_ban_freeze")]
    pub ban_freeze: bool,
    #[serde(default = "default_ban_mint_auth")]
    pub ban_mint_auth: bool,
    /// Skip enrichment and accept unknown metrics (noisier)
    #[serde(default = "default_fast_path_no_onchain_check")]
    pub fast_path_no_onchain_check: bool,
    #[serde(default = "default_allowlist_mints")]
    pub allowlist_mints: Vec<String>,
    #[serde(default = "default_blocklist_mints")]
    pub blocklist_mints: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            strategy: default_filter_strategy(),
            min_liq_usd: default_min_liq_usd(),
            min_vol_usd_5m: default_min_vol_usd_5m(),
            min_vol_usd_24h: default_min_vol_usd_24h(),
            early_age_sec: default_early_age_sec(),
            early_min_liq_usd: default_early_min_liq_usd(),
            early_require_vol: default_early_require_vol(),
            early_fast_pass: default_early_fast_pass(),
            max_tax_pct: default_max_tax_pct(),
            ban_freeze: default_ban_freeze(),
            ban_mint_auth: default_ban_mint_auth(),
            fast_path_no_onchain_check: default_fast_path_no_onchain_check(),
            allowlist_mints: default_allowlist_mints(),
            blocklist_mints: default_blocklist_mints(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_enrich_rps")]
    pub rps: f64,
    #[serde(default = "default_enrich_ttl_ms")]
    pub ttl_ms: u64,
    /// Per-request timeout for market-data calls
    #[serde(default = "default_enrich_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_birdeye_key")]
    pub birdeye_key: String,
    #[serde(default = "default_birdeye_base_url")]
    pub birdeye_base_url: String,
    #[serde(default = "default_true")]
    pub dexscreener_enabled: bool,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: default_enrich_rps(),
            ttl_ms: default_enrich_ttl_ms(),
            timeout_ms: default_enrich_timeout_ms(),
            birdeye_key: default_birdeye_key(),
            birdeye_base_url: default_birdeye_base_url(),
            dexscreener_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_hits_per_sec")]
    pub max_hits_per_sec: f64,
    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
    /// Candidate channel between source and gate
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_summary_interval_secs")]
    pub summary_interval_secs: u64,
    #[serde(default = "default_reasons_interval_secs")]
    pub reasons_interval_secs: u64,
    #[serde(default = "default_reasons_top_n")]
    pub reasons_top_n: usize,
    /// Bucket width for symbol-only dedup keys
    #[serde(default = "default_symbol_bucket_ms")]
    pub symbol_bucket_ms: i64,
    #[serde(default = "default_allowlist_path")]
    pub allowlist_path: Option<String>,
    #[serde(default = "default_blocklist_path")]
    pub blocklist_path: Option<String>,
    /// Only log accepted candidates
    #[serde(default = "default_only_hits")]
    pub only_hits: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_hits_per_sec: default_max_hits_per_sec(),
            dedup_ttl_ms: default_dedup_ttl_ms(),
            channel_capacity: default_channel_capacity(),
            stats_interval_secs: default_stats_interval_secs(),
            summary_interval_secs: default_summary_interval_secs(),
            reasons_interval_secs: default_reasons_interval_secs(),
            reasons_top_n: default_reasons_top_n(),
            symbol_bucket_ms: default_symbol_bucket_ms(),
            allowlist_path: default_allowlist_path(),
            blocklist_path: default_blocklist_path(),
            only_hits: default_only_hits(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_buy_usd")]
    pub buy_usd: f64,
    #[serde(default = "default_tp_pct")]
    pub tp_pct: f64,
    #[serde(default = "default_sl_pct")]
    pub sl_pct: f64,
    #[serde(default = "default_watch_sec")]
    pub watch_sec: u64,
    #[serde(default = "default_price_tick_ms")]
    pub price_tick_ms: u64,
    /// Upper bound on per-tick jitter (also capped at one tick)
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Max per-tick drift, in percent either way
    #[serde(default = "default_drift_pct")]
    pub drift_pct: f64,
    /// Entry price when the candidate carries none
    #[serde(default = "default_entry_price")]
    pub default_entry_price: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            buy_usd: default_buy_usd(),
            tp_pct: default_tp_pct(),
            sl_pct: default_sl_pct(),
            watch_sec: default_watch_sec(),
            price_tick_ms: default_price_tick_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            drift_pct: default_drift_pct(),
            default_entry_price: default_entry_price(),
        }
    }
}

// Flat environment lookups (legacy variable names)
fn env_str(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_str(key)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_str(key)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v as u64)
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_str(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn env_list(key: &str) -> Vec<String> {
    env_str(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_rpc_endpoint() -> String {
    env_str("RPC_URL_HTTP").unwrap_or_else(|| "https://api.mainnet-beta.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_commitment() -> String {
    env_str("TX_FETCH_COMMITMENT").unwrap_or_else(|| "confirmed".into())
}

fn default_source_kind() -> SourceKind {
    env_str("SOURCE")
        .and_then(|v| v.parse().ok())
        .unwrap_or(SourceKind::Ledger)
}

fn default_program_ids() -> Vec<String> {
    let ids = env_list("RAYDIUM_PROGRAM_IDS");
    if ids.is_empty() {
        DEFAULT_PROGRAM_IDS.iter().map(|s| s.to_string()).collect()
    } else {
        ids
    }
}

fn default_poll_ms() -> u64 { env_u64("LISTENER_POLL_MS", 1500) }
fn default_signature_limit() -> usize { 25 }
fn default_fetch_rps() -> f64 { env_f64("LISTENER_FETCH_RPS", 3.0) }
fn default_emit_rps() -> f64 { env_f64("LISTENER_MAX_EMIT_RPS", 5.0) }
fn default_max_tx_retries() -> u32 { env_u64("LISTENER_MAX_TX_RETRIES", 5) as u32 }
fn default_retry_null_tx_ms() -> u64 { env_u64("LISTENER_RETRY_NULL_TX_MS", 1200) }
fn default_retry_backoff() -> RetryBackoff { RetryBackoff::Fixed }
fn default_max_retry_delay_ms() -> u64 { 10_000 }
fn default_listener_dedup_ttl_ms() -> u64 { env_u64("LISTENER_DEDUP_TTL_MS", 60_000) }
fn default_candidate_max_per_tx() -> usize { env_u64("CANDIDATE_MAX_PER_TX", 3) as usize }
fn default_mint_lookup_rps() -> f64 { env_f64("MINT_LOOKUP_RPS", 8.0) }
fn default_mint_lookup_max_per_tx() -> usize { env_u64("MINT_LOOKUP_MAX_PER_TX", 6) as usize }
fn default_queue_capacity() -> usize { 10_000 }
fn default_worker_tick_ms() -> u64 { 200 }
fn default_heartbeat_secs() -> u64 { 10 }

fn default_synthetic_interval_ms() -> u64 { 3000 }
fn default_fast_interval_ms() -> u64 { 800 }
fn default_debug_market() -> bool { env_bool("DEBUG_MARKET", false) }

fn default_filter_strategy() -> FilterStrategy { FilterStrategy::Layered }
fn default_min_liq_usd() -> f64 { env_f64("MIN_LIQ_USD", 8000.0) }
fn default_min_vol_usd_5m() -> f64 { env_f64("MIN_VOL_USD_5M", 100.0) }

fn default_min_vol_usd_24h() -> f64 {
    // MIN_VOL_USD is the older name for the 24h floor
    env_f64("MIN_VOL_USD_24H", env_f64("MIN_VOL_USD", 5000.0))
}

fn default_early_age_sec() -> u64 { env_u64("EARLY_AGE_SEC", 180) }
fn default_early_min_liq_usd() -> f64 { env_f64("EARLY_MIN_LIQ_USD", 300.0) }
fn default_early_require_vol() -> bool { env_bool("EARLY_REQUIRE_VOL", false) }
fn default_early_fast_pass() -> bool { env_bool("EARLY_FAST_PASS", false) }
fn default_max_tax_pct() -> f64 { env_f64("MAX_TAX_PCT", 12.0) }
fn default_ban_freeze() -> bool { env_bool("BAN_FREEZE", true) }
fn default_ban_mint_auth() -> bool { env_bool("BAN_MINT_AUTH", true) }
fn default_fast_path_no_onchain_check() -> bool { env_bool("FAST_PATH_NO_ONCHAIN_CHECK", false) }
fn default_allowlist_mints() -> Vec<String> { env_list("ALLOWLIST_MINTS") }
fn default_blocklist_mints() -> Vec<String> { env_list("BLOCKLIST_MINTS") }

fn default_enrich_rps() -> f64 { env_f64("ENRICH_RPS", 2.0).max(1.0) }
fn default_enrich_ttl_ms() -> u64 { env_u64("ENRICH_TTL_MS", 30_000) }
fn default_enrich_timeout_ms() -> u64 { 5000 }
fn default_birdeye_key() -> String { env_str("BIRDEYE_KEY").unwrap_or_default() }
fn default_birdeye_base_url() -> String { "https://public-api.birdeye.so".into() }

fn default_max_hits_per_sec() -> f64 { env_f64("MAX_HITS_PER_SEC", 2.0) }
fn default_dedup_ttl_ms() -> u64 { env_u64("DEDUP_TTL_MS", 60_000) }
fn default_channel_capacity() -> usize { 1024 }
fn default_stats_interval_secs() -> u64 { 5 }
fn default_summary_interval_secs() -> u64 { 60 }
fn default_reasons_interval_secs() -> u64 { 15 }
fn default_reasons_top_n() -> usize { 8 }
fn default_symbol_bucket_ms() -> i64 { 5000 }
fn default_allowlist_path() -> Option<String> { env_str("ALLOWLIST_PATH") }
fn default_blocklist_path() -> Option<String> { env_str("BLOCKLIST_PATH") }
fn default_only_hits() -> bool { env_bool("ONLY_HITS", false) }

fn default_buy_usd() -> f64 { env_f64("BUY_USD", 100.0) }
fn default_tp_pct() -> f64 { env_f64("TP_PCT", 25.0) }
fn default_sl_pct() -> f64 { env_f64("SL_PCT", 20.0) }
fn default_watch_sec() -> u64 { env_u64("WATCH_SEC", 15) }
fn default_price_tick_ms() -> u64 { env_u64("PRICE_TICK_MS", 2000) }
fn default_max_jitter_ms() -> u64 { 1500 }
fn default_drift_pct() -> f64 { 6.0 }
fn default_entry_price() -> f64 { 0.01 }

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix POOLWATCH__)
            .add_source(
                config::Environment::with_prefix("POOLWATCH")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("listener.program_ids")
                    .with_list_parse_key("filters.allowlist_mints")
                    .with_list_parse_key("filters.blocklist_mints"),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        CommitmentConfig::from_str(&self.rpc.commitment)
            .map_err(|_| anyhow::anyhow!("Invalid commitment: {}", self.rpc.commitment))?;

        if self.source.kind == SourceKind::Ledger && self.listener.program_ids.is_empty() {
            anyhow::bail!("listener.program_ids cannot be empty for the ledger source");
        }
        for id in &self.listener.program_ids {
            Pubkey::from_str(id).with_context(|| format!("Invalid program id: {}", id))?;
        }

        for (name, rate) in [
            ("listener.fetch_rps", self.listener.fetch_rps),
            ("listener.emit_rps", self.listener.emit_rps),
            ("listener.mint_lookup_rps", self.listener.mint_lookup_rps),
            ("enrichment.rps", self.enrichment.rps),
            ("pipeline.max_hits_per_sec", self.pipeline.max_hits_per_sec),
        ] {
            if !(rate > 0.0) {
                anyhow::bail!("{} must be positive", name);
            }
        }

        if self.listener.candidate_max_per_tx == 0 {
            anyhow::bail!("listener.candidate_max_per_tx must be at least 1");
        }
        if self.listener.poll_ms == 0 || self.listener.worker_tick_ms == 0 {
            anyhow::bail!("listener poll/worker intervals must be positive");
        }
        if self.listener.dedup_ttl_ms == 0 || self.pipeline.dedup_ttl_ms == 0 {
            anyhow::bail!("dedup TTLs must be positive");
        }
        if self.pipeline.symbol_bucket_ms <= 0 {
            anyhow::bail!("pipeline.symbol_bucket_ms must be positive");
        }

        if self.filters.max_tax_pct < 0.0 {
            anyhow::bail!("filters.max_tax_pct cannot be negative");
        }

        // Validate simulation parameters
        if self.simulation.buy_usd <= 0.0 {
            anyhow::bail!("simulation.buy_usd must be positive");
        }
        if self.simulation.tp_pct <= 0.0 {
            anyhow::bail!("simulation.tp_pct must be positive");
        }
        if self.simulation.sl_pct <= 0.0 || self.simulation.sl_pct >= 100.0 {
            anyhow::bail!("simulation.sl_pct must be between 0 and 100");
        }
        if self.simulation.watch_sec == 0 || self.simulation.price_tick_ms == 0 {
            anyhow::bail!("simulation watch window and tick must be positive");
        }
        if self.simulation.drift_pct <= 0.0 || self.simulation.drift_pct >= 100.0 {
            anyhow::bail!("simulation.drift_pct must be between 0 and 100");
        }
        if self.simulation.default_entry_price <= 0.0 {
            anyhow::bail!("simulation.default_entry_price must be positive");
        }

        if self.filters.fast_path_no_onchain_check {
            tracing::warn!(
                "fast_path_no_onchain_check is on - candidates with unknown metrics will be accepted (noisier)"
            );
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    commitment: {}
  Source: {:?}
  Listener:
    programs: {:?}
    poll: {}ms | fetch: {}rps | emit: {}rps | lookup: {}rps
    retries: {} x {}ms ({:?})
    candidates/tx: {}
  Filters:
    strategy: {:?}
    min_liq: {} USD | min_vol_5m: {} USD | min_vol_24h: {} USD
    early: <= {}s, min_liq {} USD, require_vol={}, fast_pass={}
    max_tax: {}% | ban_freeze={} | ban_mint_auth={}
    fast_path_no_onchain_check: {}
    allowlist: {} | blocklist: {}
  Enrichment:
    enabled: {} | rps: {} | ttl: {}ms
    birdeye_key: {}
    dexscreener: {}
  Pipeline:
    max_hits: {}/s | dedup_ttl: {}ms
  Simulation:
    buy: {} USD | tp: {}% | sl: {}% | watch: {}s | tick: {}ms
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.commitment,
            self.source.kind,
            self.listener.program_ids,
            self.listener.poll_ms,
            self.listener.fetch_rps,
            self.listener.emit_rps,
            self.listener.mint_lookup_rps,
            self.listener.max_tx_retries,
            self.listener.retry_null_tx_ms,
            self.listener.retry_backoff,
            self.listener.candidate_max_per_tx,
            self.filters.strategy,
            self.filters.min_liq_usd,
            self.filters.min_vol_usd_5m,
            self.filters.min_vol_usd_24h,
            self.filters.early_age_sec,
            self.filters.early_min_liq_usd,
            self.filters.early_require_vol,
            self.filters.early_fast_pass,
            self.filters.max_tax_pct,
            self.filters.ban_freeze,
            self.filters.ban_mint_auth,
            self.filters.fast_path_no_onchain_check,
            self.filters.allowlist_mints.len(),
            self.filters.blocklist_mints.len(),
            self.enrichment.enabled,
            self.enrichment.rps,
            self.enrichment.ttl_ms,
            if self.enrichment.birdeye_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.enrichment.dexscreener_enabled,
            self.pipeline.max_hits_per_sec,
            self.pipeline.dedup_ttl_ms,
            self.simulation.buy_usd,
            self.simulation.tp_pct,
            self.simulation.sl_pct,
            self.simulation.watch_sec,
            self.simulation.price_tick_ms,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            source: SourceConfig::default(),
            listener: ListenerConfig::default(),
            synthetic: SyntheticConfig::default(),
            filters: FilterConfig::default(),
            enrichment: EnrichmentConfig::default(),
            pipeline: PipelineConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.symbol_bucket_ms, 5000);
        assert!(!config.listener.program_ids.is_empty());
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("ledger".parse::<SourceKind>().unwrap(), SourceKind::Ledger);
        assert_eq!("SIM".parse::<SourceKind>().unwrap(), SourceKind::Synthetic);
        assert!("websocket".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_retry_backoff_deserialize() {
        let json = r#""exponential""#;
        let backoff: RetryBackoff = serde_json::from_str(json).unwrap();
        assert_eq!(backoff, RetryBackoff::Exponential);
    }

    #[test]
    fn test_validate_rejects_bad_stop_loss() {
        let mut config = Config::default();
        config.simulation.sl_pct = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_program_id() {
        let mut config = Config::default();
        config.listener.program_ids = vec!["not-a-pubkey".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool-watch.toml");
        std::fs::write(
            &path,
            r#"
[filters]
min_liq_usd = 1234.0
early_fast_pass = true

[simulation]
tp_pct = 40.0
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.filters.min_liq_usd, 1234.0);
        assert!(config.filters.early_fast_pass);
        assert_eq!(config.simulation.tp_pct, 40.0);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/pool-watch.toml").unwrap();
        assert_eq!(config.pipeline.reasons_top_n, 8);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?api-key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
