//! Gate between candidate sources and the paper trader

pub mod gating;
pub mod metrics;
pub mod sink;

pub use gating::{GateOutcome, GatingPipeline};
pub use metrics::{MetricsSnapshot, PipelineMetrics, ReasonHistogram};
pub use sink::{CandidateSink, LogSink};
