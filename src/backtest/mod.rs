//! Strategy backtesting over historical races.

pub mod fixtures;
pub mod predictor;
pub mod runner;

pub use fixtures::demo_races;
pub use predictor::{Predictor, RuleBasedPredictor};
pub use runner::{generate_backtest_report, BacktestConfig, Backtester, DEFAULT_HISTORY_CAP};
