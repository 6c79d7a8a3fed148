//! Shared data structures for the candidate pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authority value meaning "renounced" (the System Program address)
pub const NO_AUTHORITY: &str = "11111111111111111111111111111111";

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Ledger,
    Synthetic,
}

impl fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateOrigin::Ledger => write!(f, "ledger"),
            CandidateOrigin::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Market metrics, any of which may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetrics {
    pub liquidity_usd: Option<f64>,
    pub volume_5m_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub buy_tax_pct: Option<f64>,
    pub sell_tax_pct: Option<f64>,
}

impl CandidateMetrics {
    pub fn has_volume(&self) -> bool {
        self.volume_5m_usd.is_some() || self.volume_24h_usd.is_some()
    }

    pub fn has_taxes(&self) -> bool {
        self.buy_tax_pct.is_some() && self.sell_tax_pct.is_some()
    }
}

/// Mint/freeze authority info
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub freeze_authority: Option<String>,
    pub mint_authority: Option<String>,
}

impl TokenInfo {
    pub fn is_complete(&self) -> bool {
        self.freeze_authority.is_some() && self.mint_authority.is_some()
    }
}

/// Normalized "maybe a new pool" event.
///
/// Immutable once built; the filter works on an enriched copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub mint: String,
    pub symbol: String,
    pub signature: Option<String>,
    /// Epoch milliseconds when the candidate was first observed
    pub created_at_ms: i64,
    pub metrics: CandidateMetrics,
    pub token_info: TokenInfo,
    pub price: Option<f64>,
    pub origin: CandidateOrigin,
}

impl Candidate {
    /// Candidate for a mint seen on chain (metrics unknown).
    ///
    /// Carries no signature: one transaction can yield several mints, and
    /// the gate must key those apart by mint.
    pub fn from_ledger(mint: String, created_at_ms: i64) -> Self {
        let symbol = mint.chars().take(4).collect();
        Self {
            mint,
            symbol,
            signature: None,
            created_at_ms,
            metrics: CandidateMetrics::default(),
            token_info: TokenInfo::default(),
            price: None,
            origin: CandidateOrigin::Ledger,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Display label for logs: symbol, then mint, then signature
    pub fn label(&self) -> &str {
        if !self.symbol.is_empty() {
            &self.symbol
        } else if !self.mint.is_empty() {
            &self.mint
        } else {
            self.signature.as_deref().unwrap_or("NA")
        }
    }

    /// Identifier for logs: mint, then signature
    pub fn id(&self) -> &str {
        if !self.mint.is_empty() {
            &self.mint
        } else {
            self.signature.as_deref().unwrap_or("NA")
        }
    }
}

/// Stable, low-cardinality verdict reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterReason {
    InvalidCandidate,
    Blocklist,
    Allowlist,
    AuthBanned,
    TaxTooHigh,
    EarlyFastpass,
    EarlyNoLiqMetrics,
    EarlyLiqTooLow,
    EarlyVolTooLow,
    EarlyPass,
    NoLiqMetrics,
    LiqTooLow,
    VolTooLow,
    Pass,
    // Gate-local list checks and the basic fallback filter
    NotInAllowlist,
    InBlocklist,
    MetricsMissing,
    Vol5mTooLow,
    Vol24hTooLow,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::InvalidCandidate => "invalid-candidate",
            FilterReason::Blocklist => "blocklist",
            FilterReason::Allowlist => "allowlist",
            FilterReason::AuthBanned => "auth-banned",
            FilterReason::TaxTooHigh => "tax-too-high",
            FilterReason::EarlyFastpass => "early-fastpass",
            FilterReason::EarlyNoLiqMetrics => "early-no-liq-metrics",
            FilterReason::EarlyLiqTooLow => "early-liq-too-low",
            FilterReason::EarlyVolTooLow => "early-vol-too-low",
            FilterReason::EarlyPass => "early-pass",
            FilterReason::NoLiqMetrics => "no-liq-metrics",
            FilterReason::LiqTooLow => "liq-too-low",
            FilterReason::VolTooLow => "vol-too-low",
            FilterReason::Pass => "pass",
            FilterReason::NotInAllowlist => "not-in-allowlist",
            FilterReason::InBlocklist => "in-blocklist",
            FilterReason::MetricsMissing => "metrics-missing",
            FilterReason::Vol5mTooLow => "vol5m-too-low",
            FilterReason::Vol24hTooLow => "vol24h-too-low",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running a candidate through a filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterVerdict {
    pub pass: bool,
    pub reason: FilterReason,
    /// Merged metrics the decision was made on (acceptances only)
    pub metrics: Option<CandidateMetrics>,
}

impl FilterVerdict {
    pub fn accept(reason: FilterReason) -> Self {
        Self {
            pass: true,
            reason,
            metrics: None,
        }
    }

    pub fn accept_with(reason: FilterReason, metrics: CandidateMetrics) -> Self {
        Self {
            pass: true,
            reason,
            metrics: Some(metrics),
        }
    }

    pub fn reject(reason: FilterReason) -> Self {
        Self {
            pass: false,
            reason,
            metrics: None,
        }
    }
}

/// Fields a market-data provider may fill in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_5m_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub buy_tax_pct: Option<f64>,
    pub sell_tax_pct: Option<f64>,
    pub freeze_authority: Option<String>,
    pub mint_authority: Option<String>,
}

impl MarketSnapshot {
    /// Fill every unknown field from `other`, keeping known values
    pub fn merge_missing(&mut self, other: &MarketSnapshot) {
        fill(&mut self.price_usd, &other.price_usd);
        fill(&mut self.liquidity_usd, &other.liquidity_usd);
        fill(&mut self.volume_5m_usd, &other.volume_5m_usd);
        fill(&mut self.volume_24h_usd, &other.volume_24h_usd);
        fill(&mut self.buy_tax_pct, &other.buy_tax_pct);
        fill(&mut self.sell_tax_pct, &other.sell_tax_pct);
        fill(&mut self.freeze_authority, &other.freeze_authority);
        fill(&mut self.mint_authority, &other.mint_authority);
    }

    pub fn is_empty(&self) -> bool {
        *self == MarketSnapshot::default()
    }
}

/// `slot = slot.or(other)` without moving out of `other`
pub(crate) fn fill<T: Clone>(slot: &mut Option<T>, other: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(other);
    }
}
