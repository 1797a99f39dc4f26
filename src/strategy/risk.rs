//! Stop-loss gate.
//!
//! Pure evaluation over the ledger: stop flag, losing streak, daily loss,
//! then available funds, short-circuiting on the first failure. Tripping the
//! stop flag is the caller's job (see `BankrollManager::can_bet`), so the
//! gate itself never mutates state.

use std::fmt;

use crate::storage::LedgerState;

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Why the gate refused a new bet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Already stopped for the day; carries the stored reason.
    StoppedToday(String),
    LosingStreak { streak: u32, limit: u32 },
    DailyLoss { loss: i64, limit: i64 },
    InsufficientFunds { bankroll: i64, minimum: i64 },
}

impl RejectionReason {
    /// Whether this rejection should set the persisted stop flag.
    pub fn trips_stop(&self) -> bool {
        matches!(
            self,
            RejectionReason::LosingStreak { .. } | RejectionReason::DailyLoss { .. }
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::StoppedToday(reason) => write!(f, "{reason}"),
            RejectionReason::LosingStreak { streak, limit } => {
                write!(f, "losing streak stop: {streak} straight losses (limit {limit})")
            }
            RejectionReason::DailyLoss { loss, limit } => {
                write!(f, "daily loss stop: lost {loss} today (limit {limit})")
            }
            RejectionReason::InsufficientFunds { bankroll, minimum } => {
                write!(f, "insufficient funds: {bankroll} available, {minimum} needed")
            }
        }
    }
}

/// Outcome of a gate check. Denial is a value, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskVerdict {
    Allowed,
    Denied(RejectionReason),
}

impl RiskVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskVerdict::Allowed)
    }

    /// The rejection, if denied.
    pub fn reason(&self) -> Option<&RejectionReason> {
        match self {
            RiskVerdict::Denied(reason) => Some(reason),
            RiskVerdict::Allowed => None,
        }
    }
}

impl fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskVerdict::Allowed => write!(f, "betting allowed"),
            RiskVerdict::Denied(reason) => write!(f, "betting denied: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskGate {
    min_bet_amount: i64,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RiskGate {
    pub fn new(min_bet_amount: i64) -> Self {
        Self { min_bet_amount }
    }

    pub fn evaluate(&self, state: &LedgerState) -> RiskVerdict {
        match self.check(state) {
            Ok(()) => RiskVerdict::Allowed,
            Err(reason) => RiskVerdict::Denied(reason),
        }
    }

    fn check(&self, state: &LedgerState) -> Result<(), RejectionReason> {
        let risk = state.risk_control();
        let stats = state.statistics();

        if risk.is_stopped_today {
            let reason = risk
                .stop_reason
                .clone()
                .unwrap_or_else(|| "stopped for today".to_string());
            return Err(RejectionReason::StoppedToday(reason));
        }

        if stats.current_losing_streak >= risk.max_losing_streak_limit {
            return Err(RejectionReason::LosingStreak {
                streak: stats.current_losing_streak,
                limit: risk.max_losing_streak_limit,
            });
        }

        if stats.daily_loss >= risk.daily_loss_limit {
            return Err(RejectionReason::DailyLoss {
                loss: stats.daily_loss,
                limit: risk.daily_loss_limit,
            });
        }

        if state.current_amount() < self.min_bet_amount {
            return Err(RejectionReason::InsufficientFunds {
                bankroll: state.current_amount(),
                minimum: self.min_bet_amount,
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_allowed() {
        let gate = RiskGate::default();
        assert_eq!(gate.evaluate(&LedgerState::default()), RiskVerdict::Allowed);
    }

    #[test]
    fn test_stop_flag_checked_first() {
        let mut state = LedgerState::default();
        state.statistics_mut().current_losing_streak = 5;
        state.trip_stop("manual stop".into());
        let verdict = RiskGate::default().evaluate(&state);
        assert_eq!(
            verdict.reason(),
            Some(&RejectionReason::StoppedToday("manual stop".into()))
        );
        assert!(!verdict.reason().unwrap().trips_stop());
    }

    #[test]
    fn test_losing_streak_at_limit_denies() {
        let mut state = LedgerState::default();
        state.statistics_mut().current_losing_streak = 2;
        assert!(RiskGate::default().evaluate(&state).is_allowed());

        state.statistics_mut().current_losing_streak = 3;
        let verdict = RiskGate::default().evaluate(&state);
        let reason = verdict.reason().unwrap();
        assert!(matches!(reason, RejectionReason::LosingStreak { streak: 3, limit: 3 }));
        assert!(reason.trips_stop());
    }

    #[test]
    fn test_streak_takes_precedence_over_daily_loss() {
        let mut state = LedgerState::default();
        state.statistics_mut().current_losing_streak = 4;
        state.statistics_mut().daily_loss = 9000;
        let verdict = RiskGate::default().evaluate(&state);
        assert!(matches!(verdict.reason(), Some(RejectionReason::LosingStreak { .. })));
    }

    #[test]
    fn test_daily_loss_at_limit_denies() {
        let mut state = LedgerState::default();
        state.statistics_mut().daily_loss = 2999;
        assert!(RiskGate::default().evaluate(&state).is_allowed());

        state.statistics_mut().daily_loss = 3000;
        let verdict = RiskGate::default().evaluate(&state);
        assert!(matches!(
            verdict.reason(),
            Some(RejectionReason::DailyLoss { loss: 3000, limit: 3000 })
        ));
    }

    #[test]
    fn test_insufficient_funds_does_not_trip_stop() {
        let mut state = LedgerState::default();
        state.bankroll_mut().current_amount = 99;
        let verdict = RiskGate::default().evaluate(&state);
        let reason = verdict.reason().unwrap();
        assert!(matches!(reason, RejectionReason::InsufficientFunds { bankroll: 99, minimum: 100 }));
        assert!(!reason.trips_stop());
        assert!(reason.to_string().contains("insufficient funds"));
    }
}
