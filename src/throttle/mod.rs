//! Throughput and repetition guards shared by every stage

pub mod dedup;
pub mod rate_limiter;

pub use dedup::Deduplicator;
pub use rate_limiter::RateLimiter;
