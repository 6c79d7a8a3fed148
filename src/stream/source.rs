//! Candidate sources
//!
//! `LedgerSignalSource` turns watched-program activity into candidates:
//! poll recent signatures, queue them, fetch at a bounded rate, run the
//! extraction chain, then emit each new mint. Emission is fire-and-forget
//! into the pipeline channel.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::extractor::{ExtractionStage, MintExtractor};
use super::ledger::LedgerSource;
use super::queue::{PushOutcome, RetryPolicy, SignatureQueue, SignatureQueueItem};
use crate::config::ListenerConfig;
use crate::error::Result;
use crate::throttle::{Deduplicator, RateLimiter};
use crate::types::Candidate;

/// Log the transaction shape every this many fetches
const SHAPE_LOG_EVERY: u64 = 12;

/// Anything that produces candidates for the gate
#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce candidates into `out` until `shutdown` fires
    async fn run(
        self: Arc<Self>,
        out: mpsc::Sender<Candidate>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()>;
}

/// Cumulative listener counters
#[derive(Debug, Default)]
pub struct SourceStats {
    polled: AtomicU64,
    fetched: AtomicU64,
    not_found: AtomicU64,
    retried: AtomicU64,
    exhausted: AtomicU64,
    failed: AtomicU64,
    emitted: AtomicU64,
    emit_limited: AtomicU64,
    emit_failed: AtomicU64,
}

/// Point-in-time copy of `SourceStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub polled: u64,
    pub fetched: u64,
    pub not_found: u64,
    pub retried: u64,
    pub exhausted: u64,
    pub failed: u64,
    pub emitted: u64,
    pub emit_limited: u64,
    pub emit_failed: u64,
}

impl SourceSnapshot {
    /// Counter deltas since `earlier`
    pub fn since(&self, earlier: &SourceSnapshot) -> SourceSnapshot {
        SourceSnapshot {
            polled: self.polled.saturating_sub(earlier.polled),
            fetched: self.fetched.saturating_sub(earlier.fetched),
            not_found: self.not_found.saturating_sub(earlier.not_found),
            retried: self.retried.saturating_sub(earlier.retried),
            exhausted: self.exhausted.saturating_sub(earlier.exhausted),
            failed: self.failed.saturating_sub(earlier.failed),
            emitted: self.emitted.saturating_sub(earlier.emitted),
            emit_limited: self.emit_limited.saturating_sub(earlier.emit_limited),
            emit_failed: self.emit_failed.saturating_sub(earlier.emit_failed),
        }
    }
}

impl SourceStats {
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            polled: self.polled.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            emit_limited: self.emit_limited.load(Ordering::Relaxed),
            emit_failed: self.emit_failed.load(Ordering::Relaxed),
        }
    }
}

/// What happened to one fetched signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Number of candidates emitted (may be 0 if all were deduped/limited)
    Processed { emitted: usize, stage: ExtractionStage },
    /// Not available yet (or transient RPC error); re-enqueued after the delay
    Retrying(Duration),
    /// Retry ceiling reached; dropped for good
    Exhausted,
    /// Non-retryable fetch error; dropped without retry
    Failed,
}

/// Polls watched programs on the ledger and emits candidates
pub struct LedgerSignalSource {
    ledger: Arc<dyn LedgerSource>,
    config: ListenerConfig,
    extractor: MintExtractor,
    queue: Arc<SignatureQueue>,
    retry_policy: RetryPolicy,
    sig_dedup: Deduplicator,
    mint_dedup: Deduplicator,
    fetch_limiter: RateLimiter,
    emit_limiter: RateLimiter,
    lookup_limiter: RateLimiter,
    stats: SourceStats,
}

impl LedgerSignalSource {
    pub fn new(ledger: Arc<dyn LedgerSource>, config: ListenerConfig) -> Self {
        let ttl = Duration::from_millis(config.dedup_ttl_ms);
        Self {
            extractor: MintExtractor::new(config.candidate_max_per_tx, &config.program_ids),
            queue: Arc::new(SignatureQueue::new(config.queue_capacity)),
            retry_policy: RetryPolicy::from_config(&config),
            sig_dedup: Deduplicator::new(ttl),
            mint_dedup: Deduplicator::new(ttl),
            fetch_limiter: RateLimiter::per_second("fetch", config.fetch_rps),
            emit_limiter: RateLimiter::per_second("emit", config.emit_rps),
            lookup_limiter: RateLimiter::per_second("lookup", config.mint_lookup_rps),
            stats: SourceStats::default(),
            ledger,
            config,
        }
    }

    pub fn stats(&self) -> SourceSnapshot {
        self.stats.snapshot()
    }

    pub fn queue(&self) -> &SignatureQueue {
        &self.queue
    }

    /// One pass over every watched program
    pub async fn poll_once(&self) -> usize {
        let mut queued = 0;
        for program_id in &self.config.program_ids {
            let signatures = match self.list_signatures(program_id).await {
                Ok(signatures) => signatures,
                Err(e) => {
                    warn!(program = %short(program_id), error = %e, "signature poll failed");
                    continue;
                }
            };

            self.stats
                .polled
                .fetch_add(signatures.len() as u64, Ordering::Relaxed);

            for signature in signatures {
                if self.sig_dedup.check_and_add(&format!("sig:{}", signature)) {
                    continue;
                }
                if self.queue.push(&signature) == PushOutcome::Queued {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Signature listing with transient-error retries inside one poll period
    async fn list_signatures(&self, program_id: &str) -> Result<Vec<String>> {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(400),
            max_elapsed_time: Some(Duration::from_millis(self.config.poll_ms)),
            ..Default::default()
        };

        retry(backoff, || async {
            match self
                .ledger
                .list_signatures(program_id, self.config.signature_limit)
                .await
            {
                Ok(signatures) => Ok(signatures),
                Err(e) if e.is_retryable() => {
                    debug!(program = %short(program_id), error = %e, "retrying signature poll");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Pop up to one tick's budget of signatures, each costing a fetch token
    pub fn take_batch(&self) -> Vec<SignatureQueueItem> {
        let budget = self.config.fetch_rps.ceil().max(1.0) as usize;
        let mut batch = Vec::with_capacity(budget);
        while batch.len() < budget && !self.queue.is_empty() {
            if !self.fetch_limiter.allow() {
                break;
            }
            match self.queue.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Fetch one signature, extract its mints and emit the new ones
    pub async fn process_signature(
        &self,
        item: SignatureQueueItem,
        out: &mpsc::Sender<Candidate>,
    ) -> FetchOutcome {
        let outcome = match self.ledger.get_parsed_transaction(&item.signature).await {
            Ok(Some(tx)) => {
                let fetched = self.stats.fetched.fetch_add(1, Ordering::Relaxed) + 1;
                if fetched % SHAPE_LOG_EVERY == 0 {
                    let shape = tx.shape();
                    debug!(
                        signature = %short(&item.signature),
                        pre = shape.pre_balances,
                        post = shape.post_balances,
                        inner = shape.inner,
                        logs = shape.logs,
                        keys = shape.keys,
                        "transaction shape"
                    );
                }

                let (mut mints, mut stage) = self.extractor.extract(&tx);
                if mints.is_empty() && self.config.mint_lookup_enabled {
                    mints = self
                        .extractor
                        .resolve_from_accounts(
                            self.ledger.as_ref(),
                            &tx,
                            &self.lookup_limiter,
                            self.config.mint_lookup_max_per_tx,
                        )
                        .await;
                    if !mints.is_empty() {
                        stage = ExtractionStage::AccountLookup;
                    }
                }
                debug!(signature = %short(&item.signature), stage = %stage, mints = ?mints, "extracted");

                let emitted = mints
                    .into_iter()
                    .filter(|mint| self.emit(mint, out))
                    .count();
                FetchOutcome::Processed { emitted, stage }
            }
            Ok(None) => {
                self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                self.schedule_retry(item.clone())
            }
            Err(e) if e.is_retryable() => {
                warn!(signature = %short(&item.signature), error = %e, "transaction fetch failed");
                self.schedule_retry(item.clone())
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(signature = %short(&item.signature), error = %e, "transaction fetch failed permanently, dropping");
                FetchOutcome::Failed
            }
        };

        self.queue.complete(&item.signature);
        outcome
    }

    fn schedule_retry(&self, mut item: SignatureQueueItem) -> FetchOutcome {
        item.attempts += 1;
        match self.retry_policy.next_delay(item.attempts) {
            Some(delay) => {
                self.stats.retried.fetch_add(1, Ordering::Relaxed);
                let queue = self.queue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.push_item(item);
                });
                FetchOutcome::Retrying(delay)
            }
            None => {
                self.stats.exhausted.fetch_add(1, Ordering::Relaxed);
                debug!(signature = %short(&item.signature), attempts = item.attempts, "retries exhausted, dropping");
                FetchOutcome::Exhausted
            }
        }
    }

    /// Mint dedup, then emit budget, then hand off. Returns true if sent.
    fn emit(&self, mint: &str, out: &mpsc::Sender<Candidate>) -> bool {
        let key = format!("mint:{}", mint);
        if self.mint_dedup.has(&key) {
            return false;
        }
        if !self.emit_limiter.allow() {
            self.stats.emit_limited.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.mint_dedup.add(&key);

        let candidate = Candidate::from_ledger(mint.to_string(), chrono::Utc::now().timestamp_millis());

        match out.try_send(candidate) {
            Ok(()) => {
                self.stats.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(c)) => {
                self.stats.emit_failed.fetch_add(1, Ordering::Relaxed);
                warn!(mint = %c.mint, "candidate channel full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(c)) => {
                self.stats.emit_failed.fetch_add(1, Ordering::Relaxed);
                debug!(mint = %c.mint, "candidate channel closed");
                false
            }
        }
    }

    fn log_heartbeat(&self, window: &SourceSnapshot) {
        info!(
            polled = window.polled,
            queued = self.queue.len(),
            inflight = self.queue.inflight(),
            fetched = window.fetched,
            emitted = window.emitted,
            retried = window.retried,
            dropped = window.exhausted + window.failed + self.queue.dropped_count(),
            lookup_tokens = %format!("{:.1}", self.lookup_limiter.available()),
            "listener heartbeat"
        );
    }
}

#[async_trait]
impl CandidateSource for LedgerSignalSource {
    fn name(&self) -> &'static str {
        "ledger"
    }

    async fn run(
        self: Arc<Self>,
        out: mpsc::Sender<Candidate>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(
            programs = ?self.config.program_ids,
            poll_ms = self.config.poll_ms,
            fetch_rps = self.config.fetch_rps,
            emit_rps = self.config.emit_rps,
            lookup_rps = self.config.mint_lookup_rps,
            "starting ledger listener"
        );

        // Poller runs on its own so a slow poll never stalls the workers
        let poller = {
            let this = self.clone();
            let mut shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                let mut ticker = interval(Duration::from_millis(this.config.poll_ms));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let queued = this.poll_once().await;
                            debug!(queued, backlog = this.queue.len(), "poll complete");
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            })
        };

        let mut worker = interval(Duration::from_millis(self.config.worker_tick_ms));
        worker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = interval(Duration::from_secs(self.config.heartbeat_secs.max(1)));
        heartbeat.tick().await;
        let mut sweeper = interval(self.sig_dedup.sweep_interval());
        sweeper.tick().await;

        let mut last = self.stats.snapshot();

        loop {
            tokio::select! {
                _ = worker.tick() => {
                    for item in self.take_batch() {
                        let this = self.clone();
                        let out = out.clone();
                        tokio::spawn(async move {
                            this.process_signature(item, &out).await;
                        });
                    }
                }
                _ = heartbeat.tick() => {
                    let now = self.stats.snapshot();
                    self.log_heartbeat(&now.since(&last));
                    last = now;
                }
                _ = sweeper.tick() => {
                    let removed = self.sig_dedup.sweep() + self.mint_dedup.sweep();
                    debug!(removed, "listener dedup sweep");
                }
                _ = shutdown.recv() => {
                    info!("ledger listener shutting down");
                    break;
                }
            }
        }

        poller.abort();
        Ok(())
    }
}

/// First 8 chars, for log lines
fn short(s: &str) -> &str {
    s.get(..8).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::stream::ledger::{AccountKind, ParsedTransaction};
    use std::collections::HashMap;
    use std::sync::Mutex;

    const MINT_A: &str = "So11111111111111111111111111111111111111112";
    const MINT_B: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[derive(Default)]
    struct MockLedger {
        signatures: Vec<String>,
        txs: HashMap<String, ParsedTransaction>,
        fail_polls: Mutex<u32>,
        /// Signature -> whether its fetch error is transient
        broken: HashMap<String, bool>,
        fetches: AtomicU64,
    }

    #[async_trait]
    impl LedgerSource for MockLedger {
        async fn list_signatures(&self, _program_id: &str, limit: usize) -> Result<Vec<String>> {
            let mut fails = self.fail_polls.lock().unwrap();
            if *fails > 0 {
                *fails -= 1;
                return Err(Error::Rpc("429".into()));
            }
            Ok(self.signatures.iter().take(limit).cloned().collect())
        }

        async fn get_parsed_transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            match self.broken.get(signature) {
                Some(true) => Err(Error::Rpc("connection reset".into())),
                Some(false) => Err(Error::InvalidCandidate(format!("bad signature {}", signature))),
                None => Ok(self.txs.get(signature).cloned()),
            }
        }

        async fn get_account_kind(&self, _address: &str) -> Result<Option<AccountKind>> {
            Ok(None)
        }
    }

    fn tx_with_mints(mints: &[&str]) -> ParsedTransaction {
        let balances: Vec<_> = mints
            .iter()
            .enumerate()
            .map(|(i, m)| serde_json::json!({"accountIndex": i, "mint": m, "uiTokenAmount": {"amount": "1"}}))
            .collect();
        serde_json::from_value(serde_json::json!({"meta": {"postTokenBalances": balances}})).unwrap()
    }

    fn config() -> ListenerConfig {
        ListenerConfig {
            program_ids: vec!["675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string()],
            fetch_rps: 10.0,
            emit_rps: 10.0,
            max_tx_retries: 2,
            retry_null_tx_ms: 1000,
            mint_lookup_enabled: false,
            ..ListenerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_poll_dedups_signatures() {
        let ledger = MockLedger {
            signatures: vec!["s1".into(), "s2".into(), "s1".into()],
            ..Default::default()
        };
        let source = LedgerSignalSource::new(Arc::new(ledger), config());

        assert_eq!(source.poll_once().await, 2);
        // second poll sees the same signatures: all deduped
        assert_eq!(source.poll_once().await, 0);
        assert_eq!(source.queue().len(), 2);
        assert_eq!(source.stats().polled, 6);
    }

    #[tokio::test]
    async fn test_poll_retries_transient_errors() {
        let ledger = MockLedger {
            signatures: vec!["s1".into()],
            fail_polls: Mutex::new(1),
            ..Default::default()
        };
        let source = LedgerSignalSource::new(Arc::new(ledger), config());
        assert_eq!(source.poll_once().await, 1);
    }

    #[tokio::test]
    async fn test_process_emits_each_mint_once() {
        let mut ledger = MockLedger::default();
        ledger.txs.insert("s1".into(), tx_with_mints(&[MINT_A, MINT_B]));
        ledger.txs.insert("s2".into(), tx_with_mints(&[MINT_A]));
        let source = LedgerSignalSource::new(Arc::new(ledger), config());
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = source
            .process_signature(SignatureQueueItem::new("s1"), &tx)
            .await;
        assert_eq!(
            outcome,
            FetchOutcome::Processed {
                emitted: 2,
                stage: ExtractionStage::BalanceDiff
            }
        );

        let outcome = source
            .process_signature(SignatureQueueItem::new("s2"), &tx)
            .await;
        assert!(matches!(outcome, FetchOutcome::Processed { emitted: 0, .. }));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.mint, MINT_A);
        assert_eq!(first.symbol, "So11");
        assert!(first.signature.is_none());
        assert_eq!(rx.recv().await.unwrap().mint, MINT_B);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emit_limiter_caps_output() {
        let mut ledger = MockLedger::default();
        ledger.txs.insert("s1".into(), tx_with_mints(&[MINT_A, MINT_B]));
        let source = LedgerSignalSource::new(
            Arc::new(ledger),
            ListenerConfig {
                emit_rps: 1.0,
                ..config()
            },
        );
        let (tx, _rx) = mpsc::channel(16);

        let outcome = source
            .process_signature(SignatureQueueItem::new("s1"), &tx)
            .await;
        assert!(matches!(outcome, FetchOutcome::Processed { emitted: 1, .. }));
        assert_eq!(source.stats().emit_limited, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_transaction_is_retried_then_dropped() {
        let ledger = Arc::new(MockLedger::default());
        let source = LedgerSignalSource::new(ledger.clone(), config());
        let (tx, _rx) = mpsc::channel(16);

        let outcome = source
            .process_signature(SignatureQueueItem::new("ghost"), &tx)
            .await;
        assert_eq!(outcome, FetchOutcome::Retrying(Duration::from_millis(1000)));
        assert!(source.queue().is_empty());

        tokio::time::sleep(Duration::from_millis(1001)).await;
        let item = source.queue().pop().unwrap();
        assert_eq!(item.attempts, 1);

        let outcome = source.process_signature(item, &tx).await;
        assert_eq!(outcome, FetchOutcome::Exhausted);
        assert_eq!(source.stats().exhausted, 1);
        assert_eq!(ledger.fetches.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_transient_fetch_errors_are_retried() {
        let mut ledger = MockLedger::default();
        ledger.broken.insert("flaky".into(), true);
        ledger.broken.insert("garbage".into(), false);
        let ledger = Arc::new(ledger);
        let source = LedgerSignalSource::new(ledger.clone(), config());
        let (tx, _rx) = mpsc::channel(16);

        let outcome = source
            .process_signature(SignatureQueueItem::new("flaky"), &tx)
            .await;
        assert_eq!(outcome, FetchOutcome::Retrying(Duration::from_millis(1000)));

        let outcome = source
            .process_signature(SignatureQueueItem::new("garbage"), &tx)
            .await;
        assert_eq!(outcome, FetchOutcome::Failed);

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(source.queue().len(), 1);
        assert_eq!(source.queue().pop().unwrap().signature, "flaky");

        let stats = source.stats();
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.exhausted, 0);
    }

    #[tokio::test]
    async fn test_take_batch_respects_fetch_budget() {
        let source = LedgerSignalSource::new(
            Arc::new(MockLedger::default()),
            ListenerConfig {
                fetch_rps: 3.0,
                ..config()
            },
        );
        for i in 0..10 {
            source.queue().push(&format!("s{}", i));
        }
        assert_eq!(source.take_batch().len(), 3);
        // bucket drained: nothing more this instant
        assert!(source.take_batch().is_empty());
        assert_eq!(source.queue().len(), 7);
    }

    #[tokio::test]
    async fn test_closed_channel_is_counted_not_propagated() {
        let mut ledger = MockLedger::default();
        ledger.txs.insert("s1".into(), tx_with_mints(&[MINT_A]));
        let source = LedgerSignalSource::new(Arc::new(ledger), config());
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = source
            .process_signature(SignatureQueueItem::new("s1"), &tx)
            .await;
        assert!(matches!(outcome, FetchOutcome::Processed { emitted: 0, .. }));
        assert_eq!(source.stats().emit_failed, 1);
    }
}
