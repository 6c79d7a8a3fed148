//! Mint extraction from parsed transactions
//!
//! Ordered fallback chain, stopping at the first stage that yields anything:
//! balance diff, inner-instruction mints, top-level instruction mints, base58
//! scan over log lines, then account keys. Output is always deduplicated,
//! capped at `max_per_tx` and limited to strings decoding to 32 bytes.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use super::ledger::{AccountKind, LedgerSource, ParsedTransaction};
use crate::throttle::RateLimiter;

pub const MEMO_PROGRAM_ID: &str = "Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo";
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";

lazy_static::lazy_static! {
    /// Candidate base58 addresses inside free text
    static ref BASE58_RE: Regex =
        Regex::new(r"[1-9A-HJ-NP-Za-km-z]{32,44}").expect("Invalid base58 regex");
}

/// True when `s` is base58 for exactly 32 bytes
pub fn is_valid_mint(s: &str) -> bool {
    bs58::decode(s)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

/// Which stage of the chain produced the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    BalanceDiff,
    InnerInstructions,
    Instructions,
    Logs,
    AccountKeys,
    AccountLookup,
    Empty,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionStage::BalanceDiff => "balance-diff",
            ExtractionStage::InnerInstructions => "inner-ix",
            ExtractionStage::Instructions => "ix",
            ExtractionStage::Logs => "logs",
            ExtractionStage::AccountKeys => "account-keys",
            ExtractionStage::AccountLookup => "account-lookup",
            ExtractionStage::Empty => "empty",
        };
        f.write_str(s)
    }
}

/// Ordered, capped, deduplicated set of valid mints
struct MintSet {
    mints: Vec<String>,
    cap: usize,
}

impl MintSet {
    fn new(cap: usize) -> Self {
        Self {
            mints: Vec::with_capacity(cap),
            cap,
        }
    }

    /// Returns false once the cap is reached
    fn push(&mut self, candidate: &str) -> bool {
        if self.is_full() {
            return false;
        }
        if is_valid_mint(candidate) && !self.mints.iter().any(|m| m == candidate) {
            self.mints.push(candidate.to_string());
        }
        !self.is_full()
    }

    fn is_full(&self) -> bool {
        self.mints.len() >= self.cap
    }

    fn is_empty(&self) -> bool {
        self.mints.is_empty()
    }
}

/// Runs the extraction chain for one transaction at a time
#[derive(Debug, Clone)]
pub struct MintExtractor {
    max_per_tx: usize,
    ignore: HashSet<String>,
}

impl MintExtractor {
    /// `watched_programs` are skipped along with the well-known programs
    pub fn new(max_per_tx: usize, watched_programs: &[String]) -> Self {
        let mut ignore: HashSet<String> = [
            solana_sdk::system_program::id().to_string(),
            spl_token::id().to_string(),
            spl_associated_token_account::id().to_string(),
            MEMO_PROGRAM_ID.to_string(),
            COMPUTE_BUDGET_PROGRAM_ID.to_string(),
        ]
        .into_iter()
        .collect();
        ignore.extend(watched_programs.iter().cloned());

        Self {
            max_per_tx: max_per_tx.max(1),
            ignore,
        }
    }

    pub fn is_ignored(&self, address: &str) -> bool {
        self.ignore.contains(address)
    }

    /// Fast chain, no I/O
    pub fn extract(&self, tx: &ParsedTransaction) -> (Vec<String>, ExtractionStage) {
        let mut set = MintSet::new(self.max_per_tx);
        for mint in tx.balance_diff_mints() {
            if !set.push(mint) {
                break;
            }
        }
        if !set.is_empty() {
            return (set.mints, ExtractionStage::BalanceDiff);
        }

        for mint in tx.inner_instructions().filter_map(|ix| ix.mint()) {
            if !set.push(mint) {
                break;
            }
        }
        if !set.is_empty() {
            return (set.mints, ExtractionStage::InnerInstructions);
        }

        for mint in tx.instructions().iter().filter_map(|ix| ix.mint()) {
            if !set.push(mint) {
                break;
            }
        }
        if !set.is_empty() {
            return (set.mints, ExtractionStage::Instructions);
        }

        'logs: for line in tx.log_messages() {
            for hit in BASE58_RE.find_iter(line) {
                if self.is_ignored(hit.as_str()) {
                    continue;
                }
                if !set.push(hit.as_str()) {
                    break 'logs;
                }
            }
        }
        if !set.is_empty() {
            return (set.mints, ExtractionStage::Logs);
        }

        for key in tx.account_keys() {
            if self.is_ignored(key) {
                continue;
            }
            if !set.push(key) {
                break;
            }
        }
        if !set.is_empty() {
            return (set.mints, ExtractionStage::AccountKeys);
        }

        (Vec::new(), ExtractionStage::Empty)
    }

    /// Resolve mints by asking the ledger what each referenced account is.
    ///
    /// Looks at no more than `max_lookups` accounts. A lookup denied by
    /// `limiter` skips that account; lookup errors are swallowed.
    pub async fn resolve_from_accounts(
        &self,
        ledger: &dyn LedgerSource,
        tx: &ParsedTransaction,
        limiter: &RateLimiter,
        max_lookups: usize,
    ) -> Vec<String> {
        let mut set = MintSet::new(self.max_per_tx);

        let keys = tx
            .account_keys()
            .filter(|k| !self.is_ignored(k))
            .take(max_lookups);

        for key in keys {
            if set.is_full() {
                break;
            }
            if !limiter.allow() {
                debug!(account = %key, "lookup limiter denied, skipping account");
                continue;
            }
            match ledger.get_account_kind(key).await {
                Ok(Some(AccountKind::Mint)) => {
                    set.push(key);
                }
                Ok(Some(AccountKind::TokenAccount { mint })) => {
                    set.push(&mint);
                }
                Ok(_) => {}
                Err(e) => debug!(account = %key, error = %e, "account lookup failed"),
            }
        }

        set.mints
    }
}
