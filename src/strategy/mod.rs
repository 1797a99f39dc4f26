//! Strategy layer: stop-loss gate and position sizing.
//!
//! Both are pure over a borrowed [`LedgerState`](crate::storage::LedgerState);
//! the engine owns the store and applies their verdicts.

pub mod kelly;
pub mod risk;

pub use kelly::{KellyCalculator, KellyConfig};
pub use risk::{RejectionReason, RiskGate, RiskVerdict};
