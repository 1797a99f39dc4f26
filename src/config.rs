//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default, so a partial file (or none at all) is valid.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::storage::{RiskControl, DEFAULT_INITIAL_BANKROLL, DEFAULT_STATE_FILE};
use crate::strategy::KellyConfig;
use crate::backtest::{BacktestConfig, DEFAULT_HISTORY_CAP};
use crate::engine::DEFAULT_LEARNING_LOG_CAP;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    pub risk: RiskConfig,
    pub backtest: BacktestSettings,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub state_file: String,
    /// Seeds a fresh ledger only.
    pub initial_bankroll: i64,
    pub learning_log_cap: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            state_file: DEFAULT_STATE_FILE.to_string(),
            initial_bankroll: DEFAULT_INITIAL_BANKROLL,
            learning_log_cap: DEFAULT_LEARNING_LOG_CAP,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub max_losing_streak: u32,
    pub daily_loss_limit: i64,
    pub kelly_multiplier: f64,
    pub max_bet_ratio: f64,
    pub min_bet_amount: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let kelly = KellyConfig::default();
        let limits = RiskControl::default();
        Self {
            max_losing_streak: limits.max_losing_streak_limit,
            daily_loss_limit: limits.daily_loss_limit,
            kelly_multiplier: kelly.multiplier,
            max_bet_ratio: kelly.max_bet_ratio,
            min_bet_amount: kelly.min_bet_amount,
        }
    }
}

impl RiskConfig {
    pub fn risk_control(&self) -> RiskControl {
        RiskControl {
            max_losing_streak_limit: self.max_losing_streak,
            daily_loss_limit: self.daily_loss_limit,
            ..RiskControl::default()
        }
    }

    /// Sizer settings. The minimum stake must be at least one betting unit,
    /// otherwise a split leg can round to a zero stake.
    pub fn kelly_config(&self) -> Result<KellyConfig> {
        let config = KellyConfig {
            multiplier: self.kelly_multiplier,
            max_bet_ratio: self.max_bet_ratio,
            min_bet_amount: self.min_bet_amount,
            ..KellyConfig::default()
        };
        if config.bet_unit <= 0 {
            bail!("bet unit must be positive, got {}", config.bet_unit);
        }
        if config.min_bet_amount < config.bet_unit {
            bail!(
                "risk.min_bet_amount must be at least {} (one betting unit), got {}",
                config.bet_unit,
                config.min_bet_amount
            );
        }
        Ok(config)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BacktestSettings {
    pub strategy_name: String,
    pub initial_bankroll: i64,
    pub confidence_threshold: f64,
    pub kelly_multiplier: f64,
    pub history_cap: usize,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        let defaults = BacktestConfig::default();
        Self {
            strategy_name: defaults.strategy_name,
            initial_bankroll: defaults.initial_bankroll,
            confidence_threshold: defaults.confidence_threshold,
            kelly_multiplier: defaults.kelly_multiplier,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

impl BacktestSettings {
    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            strategy_name: self.strategy_name.clone(),
            initial_bankroll: self.initial_bankroll,
            confidence_threshold: self.confidence_threshold,
            kelly_multiplier: self.kelly_multiplier,
            history_cap: self.history_cap,
            ..BacktestConfig::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .risk
            .kelly_config()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [ledger]
            state_file = "/var/lib/keirin/state.json"

            [risk]
            daily_loss_limit = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.state_file, "/var/lib/keirin/state.json");
        assert_eq!(config.ledger.initial_bankroll, 10_000);
        assert_eq!(config.risk.daily_loss_limit, 5000);
        assert_eq!(config.risk.max_losing_streak, 3);
        assert_eq!(config.risk.kelly_multiplier, 0.1);
        assert_eq!(config.backtest.history_cap, 20);
        assert_eq!(config.dashboard.port, 8080);
    }

    #[test]
    fn test_risk_conversions() {
        let risk = RiskConfig {
            max_losing_streak: 5,
            min_bet_amount: 200,
            ..RiskConfig::default()
        };
        let control = risk.risk_control();
        assert_eq!(control.max_losing_streak_limit, 5);
        assert!(!control.is_stopped_today);
        let kelly = risk.kelly_config().unwrap();
        assert_eq!(kelly.min_bet_amount, 200);
        assert_eq!(kelly.bet_unit, 100);
    }

    #[test]
    fn test_min_bet_below_unit_rejected() {
        let risk = RiskConfig {
            min_bet_amount: 0,
            ..RiskConfig::default()
        };
        assert!(risk.kelly_config().is_err());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[risk]\nmin_bet_amount = 50\n").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("min_bet_amount"));
    }

    #[test]
    fn test_load_or_default() {
        let dir = TempDir::new().unwrap();
        let missing = AppConfig::load_or_default(dir.path().join("config.toml")).unwrap();
        assert_eq!(missing.ledger.learning_log_cap, 100);

        let path = dir.path().join("bad.toml");
        fs::write(&path, "[risk\nmax_losing_streak = ").unwrap();
        assert!(AppConfig::load_or_default(&path).is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = AppConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
        assert!(config.risk.kelly_multiplier > 0.0 && config.risk.kelly_multiplier <= 1.0);
        assert_eq!(config.backtest.confidence_threshold, 0.65);
    }
}
