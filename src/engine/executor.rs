//! Bet placement.
//!
//! Turns a decision plus per-type recommendations into a [`BetRecord`],
//! debits the bankroll once and persists. Legs the sizer refuses, or that
//! the remaining bankroll cannot cover, are skipped rather than failing the
//! whole placement.

use anyhow::Result;
use tracing::{debug, info, warn};

use super::BankrollManager;
use crate::types::{
    BetGroup, BetRecommendation, BetRecord, CombinationStake, Decision, LedgerError, Prediction,
};

impl BankrollManager {
    /// Record a decision for a race.
    ///
    /// KEN appends a zero-amount record that is already checked. GO sizes
    /// each recommendation against the current bankroll, splits the type's
    /// stake evenly across its combinations and debits the sum.
    pub fn place_multi_bet(
        &mut self,
        race_id: &str,
        decision: Decision,
        confidence: f64,
        recommendations: &[BetRecommendation],
    ) -> Result<BetRecord> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(LedgerError::InvalidConfidence(confidence).into());
        }
        self.store.reset_daily()?;

        let now = self.store.now();
        let today = self.store.today();
        let bet_id = format!(
            "bet_{race_id}_{}_{}",
            now.format("%Y%m%dT%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let mut record = BetRecord {
            bet_id,
            race_id: race_id.to_string(),
            timestamp: now,
            decision,
            confidence_score: confidence,
            bets: Vec::new(),
            total_amount: 0,
            expected_return: 0.0,
            actual_return: None,
            is_won: None,
            result_checked: false,
            winning_combination: None,
            kimarite: String::new(),
            official_return: None,
        };

        if decision == Decision::Ken {
            record.result_checked = true;
            self.store.state_mut().record_skip(record.clone(), today);
            self.store.save()?;
            info!(bet_id = %record.bet_id, race_id, "KEN recorded");
            return Ok(record);
        }

        let allowed = self.can_bet()?.is_allowed();
        let bankroll = self.current_bankroll();
        let mut remaining = bankroll;

        for rec in recommendations {
            if rec.combinations.is_empty() {
                continue;
            }
            let type_amount = if allowed {
                self.kelly.size_bet(bankroll, confidence, &rec.bet_type)
            } else {
                0
            };
            if type_amount == 0 {
                debug!(race_id, bet_type = %rec.bet_type, "Sizer returned 0, leg skipped");
                continue;
            }

            let per_combo = self.kelly.split_stake(type_amount, rec.combinations.len());
            if per_combo <= 0 {
                debug!(race_id, bet_type = %rec.bet_type, type_amount, "Stake splits to 0, leg skipped");
                continue;
            }
            let affordable = (remaining / per_combo) as usize;
            let take = rec.combinations.len().min(affordable);
            if take == 0 {
                warn!(race_id, bet_type = %rec.bet_type, remaining, "Bankroll exhausted, leg skipped");
                continue;
            }
            if take < rec.combinations.len() {
                warn!(
                    race_id,
                    bet_type = %rec.bet_type,
                    placed = take,
                    requested = rec.combinations.len(),
                    "Bankroll covers only part of the leg"
                );
            }

            let stakes: Vec<CombinationStake> = rec.combinations[..take]
                .iter()
                .map(|combination| CombinationStake {
                    combination: combination.clone(),
                    amount: per_combo,
                    odds: rec.quoted_odds(combination),
                })
                .collect();
            let subtotal = per_combo * take as i64;

            record.expected_return += stakes
                .iter()
                .map(|s| s.amount as f64 * s.odds * confidence * rec.expected_value)
                .sum::<f64>();
            record.total_amount += subtotal;
            remaining -= subtotal;
            record.bets.push(BetGroup {
                bet_type: rec.bet_type.clone(),
                combinations: stakes,
                subtotal,
            });
        }

        if record.total_amount == 0 {
            // Nothing was staked, so there is nothing to settle.
            record.result_checked = true;
            record.actual_return = Some(0);
        }

        self.store
            .state_mut()
            .record_placement(record.clone(), today, now);
        self.store.save()?;

        info!(
            bet_id = %record.bet_id,
            race_id,
            total = record.total_amount,
            groups = record.bets.len(),
            expected_return = format!("{:.0}", record.expected_return),
            bankroll = self.current_bankroll(),
            "Bet placed"
        );
        Ok(record)
    }

    /// Place a validated prediction.
    pub fn place_prediction(&mut self, prediction: &Prediction) -> Result<BetRecord> {
        prediction.validate()?;
        self.place_multi_bet(
            &prediction.race_id,
            prediction.decision,
            prediction.confidence_score,
            &prediction.bet_recommendations,
        )
    }

    /// Morning job: place predictions in order while the gate allows.
    ///
    /// KEN decisions are always recorded. Once the gate denies, remaining GO
    /// predictions are left unplaced rather than logged as empty records.
    pub fn place_batch(&mut self, predictions: &[Prediction]) -> Result<Vec<BetRecord>> {
        let mut placed = Vec::with_capacity(predictions.len());
        for prediction in predictions {
            if prediction.decision == Decision::Go {
                let verdict = self.can_bet()?;
                if !verdict.is_allowed() {
                    info!(race_id = %prediction.race_id, verdict = %verdict, "Betting halted, GO not placed");
                    continue;
                }
            }
            placed.push(self.place_prediction(prediction)?);
        }
        Ok(placed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
