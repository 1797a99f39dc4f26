//! Accountant: settlement against actual results, and the ledger report.
//!
//! Settlement pays quoted odds. When the result carries an official payout
//! for a winning ticket, the official figure is kept on the record next to
//! the credited one and any difference is logged.

use anyhow::Result;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

use super::BankrollManager;
use crate::storage::LedgerState;
use crate::types::{ActualResult, BetRecord, Combination, RaceOutcome};

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Outcome of matching one bet record against an actual result.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// Sum of `stake * quoted odds` over winning stakes, truncated per stake.
    pub actual_return: i64,
    pub is_won: bool,
    /// Last winning combination encountered.
    pub winning_combination: Option<Combination>,
    /// Return implied by the official payout table, if it priced any winner.
    pub official_return: Option<i64>,
}

/// Match every stake of `record` against `result`. Pure.
pub fn evaluate_settlement(record: &BetRecord, result: &ActualResult) -> Settlement {
    let mut settlement = Settlement {
        actual_return: 0,
        is_won: false,
        winning_combination: None,
        official_return: None,
    };

    for group in &record.bets {
        let official = result.payouts.get(&group.bet_type);
        for stake in &group.combinations {
            if !group.bet_type.is_hit(&stake.combination, &result.finish_order) {
                continue;
            }
            settlement.is_won = true;
            settlement.actual_return += (stake.amount as f64 * stake.odds) as i64;
            settlement.winning_combination = Some(stake.combination.clone());

            if let Some(payout) = official
                .filter(|p| group.bet_type.same_ticket(&p.combination, &stake.combination))
            {
                *settlement.official_return.get_or_insert(0) += stake.amount / 100 * payout.amount;
            }
        }
    }
    settlement
}

impl BankrollManager {
    /// Settle an open bet.
    ///
    /// Unknown ids give `Ok(None)`. A record that is already checked comes
    /// back unchanged, so settling twice never credits twice.
    pub fn settle_bet(&mut self, bet_id: &str, result: &ActualResult) -> Result<Option<BetRecord>> {
        self.store.reset_daily()?;

        let Some(index) = self.store.state().bet_index(bet_id) else {
            warn!(bet_id, "Settlement requested for unknown bet");
            return Ok(None);
        };
        let record = self.store.state().bet_at(index);

        if record.result_checked {
            debug!(bet_id, "Bet already settled");
            return Ok(Some(record.clone()));
        }
        if record.is_ken() {
            let record = self.store.state_mut().mark_checked(index);
            self.store.save()?;
            return Ok(Some(record));
        }

        let settlement = evaluate_settlement(record, result);
        if let Some(official) = settlement.official_return {
            if official != settlement.actual_return {
                warn!(
                    bet_id,
                    credited = settlement.actual_return,
                    official,
                    "Quoted-odds return differs from official payout"
                );
            }
        }

        let now = self.store.now();
        let settled =
            self.store
                .state_mut()
                .apply_settlement(index, &settlement, &result.winning_pattern, now);
        self.store.save()?;

        info!(
            bet_id,
            race_id = %settled.race_id,
            won = settlement.is_won,
            stake = settled.total_amount,
            actual_return = settlement.actual_return,
            bankroll = self.current_bankroll(),
            "Bet settled"
        );
        Ok(Some(settled))
    }

    /// GO records still awaiting a result, oldest first.
    pub fn unsettled_bets(&self) -> Vec<BetRecord> {
        self.state().unsettled_bets().cloned().collect()
    }

    pub fn generate_report(&self) -> String {
        render_report(self.state())
    }

    /// Evening job: settle every open bet that has an outcome, then feed
    /// each settled race into the pattern counters and the racer database.
    ///
    /// Outcomes without an open bet only update the racer database.
    pub fn settle_outcomes(&mut self, outcomes: &[RaceOutcome]) -> Result<Vec<BetRecord>> {
        let mut settled = Vec::new();

        for outcome in outcomes {
            let open: Vec<String> = self
                .state()
                .unsettled_bets()
                .filter(|bet| bet.race_id == outcome.race_id)
                .map(|bet| bet.bet_id.clone())
                .collect();

            let mut race_won = None;
            for bet_id in &open {
                if let Some(record) = self.settle_bet(bet_id, &outcome.result)? {
                    if let Some(won) = record.is_won {
                        race_won = Some(race_won.unwrap_or(false) || won);
                    }
                    settled.push(record);
                }
            }

            if let Some(won) = race_won {
                self.record_outcome(
                    outcome.bank_type,
                    won,
                    &outcome.result.winning_pattern,
                    outcome.weather.as_deref(),
                )?;
            }
            for finish in &outcome.racers {
                self.update_racer(
                    &finish.racer_id,
                    &finish.name,
                    finish.finish_position,
                    outcome.bank_type,
                )?;
            }
        }

        info!(
            outcomes = outcomes.len(),
            settled = settled.len(),
            still_open = self.state().unsettled_bets().count(),
            "Settlement run complete"
        );
        Ok(settled)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// `¥12,345` with thousands separators; negatives as `-¥1,200`.
pub fn format_yen(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

/// Like [`format_yen`] but with an explicit `+` for non-negative amounts.
pub fn format_signed_yen(amount: i64) -> String {
    if amount >= 0 {
        format!("+{}", format_yen(amount))
    } else {
        format_yen(amount)
    }
}

/// Human-readable ledger summary.
pub fn render_report(state: &LedgerState) -> String {
    let stats = state.statistics();
    let risk = state.risk_control();
    let bankroll = state.bankroll();

    let status = if risk.is_stopped_today {
        format!(
            "STOPPED: {}",
            risk.stop_reason.as_deref().unwrap_or("stopped for today")
        )
    } else if stats.current_losing_streak >= 2 {
        format!("CAUTION: {} losses in a row", stats.current_losing_streak)
    } else {
        "RUNNING".to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "=== Keirin Bankroll Report ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Status: {status}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Bankroll");
    let _ = writeln!(out, "  Current:     {}", format_yen(bankroll.current_amount));
    let _ = writeln!(out, "  Initial:     {}", format_yen(bankroll.initial_amount));
    let _ = writeln!(out, "  Profit/Loss: {}", format_signed_yen(state.profit()));
    let _ = writeln!(out, "  Today lost:  {}", format_yen(-stats.daily_loss));
    let _ = writeln!(out);
    let _ = writeln!(out, "Record");
    let _ = writeln!(out, "  Bets:     {}", stats.total_bets);
    let _ = writeln!(out, "  Wins:     {}", stats.wins);
    let _ = writeln!(out, "  Losses:   {}", stats.losses);
    let _ = writeln!(out, "  Skipped:  {}", stats.ken_count);
    let _ = writeln!(out, "  Win rate: {:.1}%", stats.win_rate());
    let _ = writeln!(out);
    let _ = writeln!(out, "Efficiency");
    let _ = writeln!(out, "  Wagered:  {}", format_yen(stats.total_wagered));
    let _ = writeln!(out, "  Returned: {}", format_yen(stats.total_returned));
    let _ = writeln!(out, "  ROI:      {:.1}%", stats.roi_percentage);
    let _ = writeln!(out);
    let _ = writeln!(out, "Risk");
    let _ = writeln!(out, "  Current streak: {}", stats.current_losing_streak);
    let _ = writeln!(out, "  Max streak:     {}", stats.max_losing_streak);
    let _ = write!(
        out,
        "  Stop at:        {} losses in a row or {} in a day",
        risk.max_losing_streak_limit,
        format_yen(-risk.daily_loss_limit)
    );
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::types::{BetRecommendation, BetType, Decision, Payout};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn rec(bet_type: BetType, combos: &[&str], odds: f64) -> BetRecommendation {
        BetRecommendation {
            bet_type,
            combinations: combos.iter().map(|c| c.parse().unwrap()).collect(),
            odds: combos.iter().map(|c| (c.to_string(), odds)).collect(),
            expected_value: 1.0,
        }
    }

    fn result(finish: &[u8]) -> ActualResult {
        ActualResult {
            finish_order: finish.to_vec(),
            winning_pattern: "逃げ".into(),
            payouts: BTreeMap::new(),
        }
    }

    #[test]
    fn test_format_yen() {
        assert_eq!(format_yen(0), "¥0");
        assert_eq!(format_yen(999), "¥999");
        assert_eq!(format_yen(10_000), "¥10,000");
        assert_eq!(format_yen(-1_234_567), "-¥1,234,567");
        assert_eq!(format_signed_yen(550), "+¥550");
        assert_eq!(format_signed_yen(-200), "-¥200");
    }

    #[test]
    fn test_win_credits_quoted_odds() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let placed = m
            .place_multi_bet(
                "maebashi_11",
                Decision::Go,
                0.3,
                &[rec(BetType::ExactTrifecta, &["1-2-4", "1-4-2"], 8.5)],
            )
            .unwrap();

        let settled = m.settle_bet(&placed.bet_id, &result(&[1, 2, 4, 7, 3])).unwrap().unwrap();
        assert_eq!(settled.is_won, Some(true));
        assert_eq!(settled.actual_return, Some(850));
        assert_eq!(settled.winning_combination, Some("1-2-4".parse().unwrap()));
        assert_eq!(settled.kimarite, "逃げ");
        assert_eq!(m.current_bankroll(), 10_000 - 200 + 850);
        assert_eq!(m.state().statistics().wins, 1);
        assert!(m.state().reconciles());
    }

    #[test]
    fn test_pair_place_and_duplet_matching() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let placed = m
            .place_multi_bet(
                "kawasaki_3",
                Decision::Go,
                0.9,
                &[
                    rec(BetType::PairPlace, &["2-1"], 2.0),
                    rec(BetType::ExactDuplet, &["1-3"], 12.0),
                ],
            )
            .unwrap();

        let settled = m.settle_bet(&placed.bet_id, &result(&[1, 2, 4, 7, 3])).unwrap().unwrap();
        assert_eq!(settled.is_won, Some(true));
        assert_eq!(settled.actual_return, Some(200));
        assert_eq!(settled.winning_combination, Some("2-1".parse().unwrap()));
    }

    #[test]
    fn test_loss_updates_streak() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let placed = m
            .place_multi_bet("kokura_8", Decision::Go, 0.7, &[rec(BetType::ExactTrifecta, &["3-5-7"], 40.0)])
            .unwrap();
        let settled = m.settle_bet(&placed.bet_id, &result(&[1, 2, 4])).unwrap().unwrap();

        assert_eq!(settled.is_won, Some(false));
        assert_eq!(settled.actual_return, Some(0));
        let stats = m.state().statistics();
        assert_eq!(stats.losses, 1);
        assert_eq!(stats.current_losing_streak, 1);
        assert_eq!(stats.daily_loss, placed.total_amount);
        assert!(m.state().reconciles());
    }

    #[test]
    fn test_settle_twice_does_not_double_credit() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let placed = m
            .place_multi_bet("hiratsuka_1", Decision::Go, 0.82, &[rec(BetType::ExactTrifecta, &["1-2-4"], 8.5)])
            .unwrap();
        let outcome = result(&[1, 2, 4]);
        let first = m.settle_bet(&placed.bet_id, &outcome).unwrap().unwrap();
        let bankroll = m.current_bankroll();
        let second = m.settle_bet(&placed.bet_id, &outcome).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(m.current_bankroll(), bankroll);
        assert_eq!(m.state().statistics().wins, 1);
    }

    #[test]
    fn test_unknown_bet_is_none() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        assert!(m.settle_bet("bet_missing", &result(&[1, 2, 3])).unwrap().is_none());
    }

    #[test]
    fn test_ken_settles_without_stats() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let placed = m.place_multi_bet("r1", Decision::Ken, 0.3, &[]).unwrap();
        let settled = m.settle_bet(&placed.bet_id, &result(&[1, 2, 3])).unwrap().unwrap();
        assert!(settled.result_checked);
        assert_eq!(m.state().statistics().losses, 0);
        assert_eq!(m.state().statistics().wins, 0);
    }

    #[test]
    fn test_official_payout_recorded() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let placed = m
            .place_multi_bet("keiokaku_4", Decision::Go, 0.82, &[rec(BetType::UnorderedTrifecta, &["4-2-1"], 3.0)])
            .unwrap();
        let mut outcome = result(&[1, 2, 4]);
        outcome.payouts.insert(
            BetType::UnorderedTrifecta,
            Payout { amount: 320, combination: "1-2-4".parse().unwrap() },
        );

        let settled = m.settle_bet(&placed.bet_id, &outcome).unwrap().unwrap();
        assert_eq!(settled.actual_return, Some(300));
        assert_eq!(settled.official_return, Some(320));
        // Credited figure is the quoted one.
        assert_eq!(m.current_bankroll(), 10_000 - 100 + 300);
    }

    #[test]
    fn test_unsettled_bets_lists_open_go_records() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        m.place_multi_bet("r1", Decision::Ken, 0.3, &[]).unwrap();
        let open = m
            .place_multi_bet("r2", Decision::Go, 0.8, &[rec(BetType::ExactTrifecta, &["1-2-3"], 9.0)])
            .unwrap();
        let unsettled = m.unsettled_bets();
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].bet_id, open.bet_id);
    }

    #[test]
    fn test_report_sections() {
        let mut state = LedgerState::default();
        state.statistics_mut().current_losing_streak = 2;
        let report = render_report(&state);
        assert!(report.contains("CAUTION: 2 losses in a row"));
        assert!(report.contains("Current:     ¥10,000"));
        assert!(report.contains("Profit/Loss: +¥0"));
        assert!(report.contains("3 losses in a row or -¥3,000 in a day"));

        state.trip_stop("daily loss stop".into());
        assert!(render_report(&state).contains("STOPPED: daily loss stop"));
    }

    #[test]
    fn test_settle_outcomes_feeds_patterns_and_racers() {
        let dir = TempDir::new().unwrap();
        let mut m = manager(&dir, &clock());
        let won = m
            .place_multi_bet("maebashi_11", Decision::Go, 0.82, &[rec(BetType::ExactTrifecta, &["1-2-4"], 8.5)])
            .unwrap();
        let open = m
            .place_multi_bet("kokura_8", Decision::Go, 0.7, &[rec(BetType::ExactTrifecta, &["3-5-7"], 40.0)])
            .unwrap();

        let outcome = RaceOutcome {
            race_id: "maebashi_11".into(),
            bank_type: crate::types::BankType::Bank333,
            weather: Some("晴".into()),
            result: result(&[1, 2, 4]),
            racers: vec![crate::types::RacerFinish {
                racer_id: "014321".into(),
                name: "Sato".into(),
                finish_position: 1,
            }],
        };
        let settled = m.settle_outcomes(&[outcome]).unwrap();

        assert_eq!(settled.len(), 1);
        assert_eq!(settled[0].bet_id, won.bet_id);
        let unsettled = m.unsettled_bets();
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].bet_id, open.bet_id);

        let patterns = m.state().pattern_analysis();
        let bank = patterns.bank_stats[&crate::types::BankType::Bank333];
        assert_eq!((bank.wins, bank.total), (1, 1));
        assert_eq!(patterns.weather_stats["晴"].wins, 1);
        assert_eq!(m.state().racer_database()["014321"].wins, 1);
    }
}
