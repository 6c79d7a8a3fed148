//! Stream module - candidate ingestion
//!
//! Supports:
//! - Ledger polling of watched pool programs (RPC, jsonParsed)
//! - Synthetic generator (offline runs, no RPC needed)

pub mod extractor;
pub mod ledger;
pub mod queue;
pub mod source;
pub mod synthetic;

pub use extractor::{is_valid_mint, ExtractionStage, MintExtractor};
pub use ledger::{AccountKind, LedgerSource, ParsedTransaction, RpcLedger};
pub use queue::{RetryPolicy, SignatureQueue, SignatureQueueItem};
pub use source::{CandidateSource, LedgerSignalSource, SourceSnapshot};
pub use synthetic::SyntheticSource;
