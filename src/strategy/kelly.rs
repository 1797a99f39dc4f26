//! Confidence-proportional position sizing.
//!
//! A damped Kelly-style fraction of the bankroll, split across bet types by a
//! fixed allocation table, capped, and rounded down to whole betting units.

use tracing::debug;

use crate::types::BetType;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sizing configuration.
#[derive(Debug, Clone)]
pub struct KellyConfig {
    /// Damping factor applied to `bankroll * confidence`.
    pub multiplier: f64,
    /// Maximum stake per bet type as a fraction of bankroll.
    pub max_bet_ratio: f64,
    /// Smallest stake ever placed on a combination.
    pub min_bet_amount: i64,
    /// Stakes are whole multiples of this.
    pub bet_unit: i64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.1,
            max_bet_ratio: 0.1,
            min_bet_amount: 100,
            bet_unit: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    /// Largest whole-unit amount not above `amount`. Negative input gives 0.
    pub fn round_down(&self, amount: f64) -> i64 {
        if amount <= 0.0 || !amount.is_finite() {
            return 0;
        }
        let unit = self.config.bet_unit as f64;
        ((amount / unit).floor() * unit) as i64
    }

    /// Total stake for one bet type.
    ///
    /// `raw = bankroll * confidence * multiplier`, scaled by the type's
    /// allocation, capped at `bankroll * max_bet_ratio`, rounded down to a
    /// unit, floored at the minimum and finally clamped to what the bankroll
    /// can cover. Returns 0 when the bankroll cannot cover the minimum.
    pub fn size_bet(&self, bankroll: i64, confidence: f64, bet_type: &BetType) -> i64 {
        let affordable = self.round_down(bankroll as f64);
        if affordable < self.config.min_bet_amount {
            return 0;
        }

        let raw = bankroll as f64 * confidence * self.config.multiplier;
        let allocated = raw * bet_type.allocation();
        let capped = allocated.min(bankroll as f64 * self.config.max_bet_ratio);
        let amount = self
            .round_down(capped)
            .max(self.config.min_bet_amount)
            .min(affordable);

        debug!(
            bet_type = %bet_type,
            bankroll,
            confidence,
            raw = format!("{raw:.1}"),
            allocated = format!("{allocated:.1}"),
            amount,
            "Bet sized"
        );
        amount
    }

    /// Single-ticket stake without a type allocation: `bankroll * confidence
    /// * multiplier` rounded down to a unit, capped at the truncated
    /// `bankroll * max_bet_ratio`, floored at the minimum. The floor can
    /// exceed a tiny bankroll; callers check affordability.
    pub fn size_single(&self, bankroll: i64, confidence: f64) -> i64 {
        let sized = self.round_down(bankroll as f64 * confidence * self.config.multiplier);
        let cap = (bankroll as f64 * self.config.max_bet_ratio) as i64;
        sized.min(cap).max(self.config.min_bet_amount)
    }

    /// Per-combination share of a type's stake, rounded down to a unit and
    /// floored at the minimum. Zero combinations get 0.
    pub fn split_stake(&self, type_amount: i64, combinations: usize) -> i64 {
        if combinations == 0 {
            return 0;
        }
        let unit = self.config.bet_unit;
        let share = type_amount / combinations as i64;
        ((share / unit) * unit).max(self.config.min_bet_amount)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
