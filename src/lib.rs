//! Pool Watch Library
//!
//! Watches liquidity-pool programs for newly created tokens, gates them
//! through dedup, rate limits and a layered filter, and paper-trades the
//! survivors.

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod market;
pub mod pipeline;
pub mod stream;
pub mod throttle;
pub mod trading;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use types::{Candidate, FilterReason, FilterVerdict};
