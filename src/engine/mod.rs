//! Core engine: the bankroll manager and its batch-job operations.
//!
//! [`BankrollManager`] owns the [`LedgerStore`] together with the risk gate
//! and sizer. Placement lives in [`executor`], settlement and reporting in
//! [`accountant`], pattern and learning bookkeeping in [`learning`]. Every
//! public operation runs the daily reset first, applies its effects to the
//! in-memory ledger and persists once before returning.

pub mod accountant;
pub mod executor;
pub mod learning;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::storage::{Clock, LedgerState, LedgerStore};
use crate::strategy::{KellyCalculator, RiskGate, RiskVerdict};
use crate::types::BetType;

/// Learning log entries kept by default.
pub const DEFAULT_LEARNING_LOG_CAP: usize = 100;

pub struct BankrollManager {
    store: LedgerStore,
    gate: RiskGate,
    kelly: KellyCalculator,
    learning_log_cap: usize,
}

impl BankrollManager {
    pub fn new(store: LedgerStore, gate: RiskGate, kelly: KellyCalculator) -> Self {
        Self {
            store,
            gate,
            kelly,
            learning_log_cap: DEFAULT_LEARNING_LOG_CAP,
        }
    }

    /// Open the configured ledger file.
    pub fn open(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = LedgerStore::open(
            &config.ledger.state_file,
            clock,
            config.ledger.initial_bankroll,
            config.risk.risk_control(),
        )?;
        let kelly = KellyCalculator::new(config.risk.kelly_config()?);
        let gate = RiskGate::new(config.risk.min_bet_amount);
        Ok(Self::new(store, gate, kelly).with_learning_log_cap(config.ledger.learning_log_cap))
    }

    pub fn with_learning_log_cap(mut self, cap: usize) -> Self {
        self.learning_log_cap = cap;
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut LedgerStore {
        &mut self.store
    }

    pub fn state(&self) -> &LedgerState {
        self.store.state()
    }

    pub fn current_bankroll(&self) -> i64 {
        self.state().current_amount()
    }

    /// Evaluate the risk gate.
    ///
    /// A losing-streak or daily-loss denial sets the stop flag and persists
    /// it, so the stop survives a restart until the next daily reset or an
    /// explicit [`resume`](Self::resume).
    pub fn can_bet(&mut self) -> Result<RiskVerdict> {
        self.store.reset_daily()?;
        let verdict = self.gate.evaluate(self.store.state());
        if let RiskVerdict::Denied(reason) = &verdict {
            if reason.trips_stop() {
                warn!(reason = %reason, "Stop condition reached, betting halted for today");
                self.store.state_mut().trip_stop(reason.to_string());
                self.store.save()?;
            }
        }
        Ok(verdict)
    }

    /// Stake for one bet type at the current bankroll, or 0 when the gate
    /// denies betting. A 0 means "do not place this leg".
    pub fn size_bet(&mut self, confidence: f64, bet_type: &BetType) -> Result<i64> {
        if !self.can_bet()?.is_allowed() {
            return Ok(0);
        }
        Ok(self
            .kelly
            .size_bet(self.current_bankroll(), confidence, bet_type))
    }

    /// Manual resume after a stop.
    pub fn resume(&mut self) -> Result<()> {
        self.store.state_mut().resume();
        self.store.save()?;
        info!("Betting resumed manually");
        Ok(())
    }

    /// Discard the ledger and start over.
    pub fn full_reset(&mut self) -> Result<()> {
        self.store.full_reset()?;
        info!(bankroll = self.current_bankroll(), "Bankroll reset");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::storage::load_state;
    use crate::strategy::RejectionReason;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_streak_denial_trips_and_persists_stop() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let mut m = manager(&dir, &clock);
        m.store_mut().state_mut().statistics_mut().current_losing_streak = 3;
        m.store_mut().state_mut().statistics_mut().last_bet_date = Some(m.store().today());

        let verdict = m.can_bet().unwrap();
        assert!(matches!(verdict.reason(), Some(RejectionReason::LosingStreak { .. })));

        let persisted = load_state(m.store().path()).unwrap();
        assert!(persisted.risk_control().is_stopped_today);

        // Streak cleared behind the gate's back: the stop still holds.
        m.store_mut().state_mut().statistics_mut().current_losing_streak = 0;
        let verdict = m.can_bet().unwrap();
        assert!(matches!(verdict.reason(), Some(RejectionReason::StoppedToday(_))));
        assert_eq!(m.size_bet(0.9, &BetType::ExactTrifecta).unwrap(), 0);
    }

    #[test]
    fn test_next_day_clears_stop() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let mut m = manager(&dir, &clock);
        m.store_mut().state_mut().statistics_mut().daily_loss = 3000;
        m.store_mut().state_mut().statistics_mut().last_bet_date = Some(m.store().today());
        assert!(!m.can_bet().unwrap().is_allowed());

        clock.advance(Duration::days(1));
        assert!(m.can_bet().unwrap().is_allowed());
        assert_eq!(m.state().statistics().daily_loss, 0);
    }

    #[test]
    fn test_resume_lifts_stop() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let mut m = manager(&dir, &clock);
        m.store_mut().state_mut().statistics_mut().current_losing_streak = 3;
        assert!(!m.can_bet().unwrap().is_allowed());

        m.resume().unwrap();
        assert!(m.can_bet().unwrap().is_allowed());
        assert_eq!(m.state().statistics().current_losing_streak, 0);
    }

    #[test]
    fn test_size_bet_uses_current_bankroll() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let mut m = manager(&dir, &clock);
        assert_eq!(m.size_bet(0.82, &BetType::ExactTrifecta).unwrap(), 400);
    }

    #[test]
    fn test_full_reset() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let mut m = manager(&dir, &clock);
        m.store_mut().state_mut().trip_stop("manual".into());
        m.full_reset().unwrap();
        assert!(m.can_bet().unwrap().is_allowed());
        assert_eq!(m.current_bankroll(), 10_000);
    }
}
