//! Paper trading on accepted candidates
//!
//! Nothing here touches the chain: positions are opened at the observed
//! price and closed against a simulated (or injected) price feed.

pub mod position;
pub mod simulation;

pub use position::{CloseReason, Position, TradeResult};
pub use simulation::{PriceSource, RandomWalk, TradeSimulator};
