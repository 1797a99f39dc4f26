//! Historical backtesting engine.
//!
//! Replays a chronological sequence of settled races through a predictor,
//! single-ticket sizing and exact-trifecta matching, tracking bankroll,
//! drawdown, streaks, best and worst bets and a per-venue-category
//! breakdown. The replay keeps its own running totals; only the finished
//! result is written to the ledger.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

use super::predictor::{Predictor, RuleBasedPredictor};
use crate::engine::accountant::{format_signed_yen, format_yen};
use crate::engine::BankrollManager;
use crate::storage::percentage;
use crate::strategy::{KellyCalculator, KellyConfig};
use crate::types::{
    BacktestResult, BankType, BestBet, BetType, Decision, SimulatedRace, VenuePerformance,
    WorstBet, DEFAULT_ODDS,
};

/// Backtest results kept in the ledger by default.
pub const DEFAULT_HISTORY_CAP: usize = 20;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub strategy_name: String,
    pub initial_bankroll: i64,
    /// Predictions below this confidence are skipped.
    pub confidence_threshold: f64,
    pub kelly_multiplier: f64,
    pub max_bet_ratio: f64,
    pub min_bet_amount: i64,
    /// Results kept in the ledger.
    pub history_cap: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            strategy_name: "rule_based".to_string(),
            initial_bankroll: 10_000,
            confidence_threshold: 0.65,
            kelly_multiplier: 0.1,
            max_bet_ratio: 0.1,
            min_bet_amount: 100,
            history_cap: DEFAULT_HISTORY_CAP,
        }
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Running totals
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tally {
    bets_placed: u64,
    ken_count: u64,
    wins: u64,
    losses: u64,
    total_wagered: i64,
    total_returned: i64,
    losing_streak: u32,
    max_losing_streak: u32,
    peak_bankroll: i64,
    max_drawdown: i64,
    odds_won: Vec<Decimal>,
    best_bet: Option<BestBet>,
    worst_bet: Option<WorstBet>,
    by_bank: BTreeMap<BankType, VenuePerformance>,
}

impl Tally {
    fn record_win(&mut self, race_id: &str, bank: BankType, stake: i64, payout: i64) {
        let profit = payout - stake;
        let odds = Decimal::from(payout) / Decimal::from(stake);
        self.wins += 1;
        self.total_returned += payout;
        self.losing_streak = 0;
        self.odds_won.push(odds);

        let venue = self.by_bank.entry(bank).or_default();
        venue.wins += 1;
        venue.profit += profit;

        let best = self.best_bet.as_ref().map_or(0, |b| b.profit);
        if profit > best {
            self.best_bet = Some(BestBet {
                race_id: race_id.to_string(),
                profit,
                odds: round2(odds),
            });
        }
    }

    fn record_loss(&mut self, race_id: &str, bank: BankType, stake: i64) {
        self.losses += 1;
        self.losing_streak += 1;
        self.max_losing_streak = self.max_losing_streak.max(self.losing_streak);
        self.by_bank.entry(bank).or_default().profit -= stake;

        let worst = self.worst_bet.as_ref().map_or(0, |w| w.loss);
        if stake > worst {
            self.worst_bet = Some(WorstBet {
                race_id: race_id.to_string(),
                loss: stake,
            });
        }
    }

    fn track_drawdown(&mut self, bankroll: i64) {
        self.peak_bankroll = self.peak_bankroll.max(bankroll);
        self.max_drawdown = self.max_drawdown.max(self.peak_bankroll - bankroll);
    }

    fn avg_odds_won(&self) -> Decimal {
        if self.odds_won.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = self.odds_won.iter().sum();
        round2(sum / Decimal::from(self.odds_won.len()))
    }
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

pub struct Backtester<P: Predictor = RuleBasedPredictor> {
    config: BacktestConfig,
    kelly: KellyCalculator,
    predictor: P,
}

impl Backtester<RuleBasedPredictor> {
    pub fn new(config: BacktestConfig) -> Self {
        Self::with_predictor(config, RuleBasedPredictor)
    }
}

impl<P: Predictor> Backtester<P> {
    pub fn with_predictor(config: BacktestConfig, predictor: P) -> Self {
        let kelly = KellyCalculator::new(KellyConfig {
            multiplier: config.kelly_multiplier,
            max_bet_ratio: config.max_bet_ratio,
            min_bet_amount: config.min_bet_amount,
            ..KellyConfig::default()
        });
        Self {
            config,
            kelly,
            predictor,
        }
    }

    /// Replay `races` in order. Pure apart from logging.
    pub fn run(&self, races: &[SimulatedRace], now: DateTime<Utc>) -> BacktestResult {
        let initial = self.config.initial_bankroll;
        let mut bankroll = initial;
        let mut tally = Tally {
            peak_bankroll: initial,
            ..Tally::default()
        };

        info!(
            strategy = %self.config.strategy_name,
            races = races.len(),
            bankroll = initial,
            "Backtest started"
        );

        for race in races {
            let card = &race.card;
            let prediction = self.predictor.predict(card);

            if prediction.decision == Decision::Ken
                || prediction.confidence_score < self.config.confidence_threshold
            {
                tally.ken_count += 1;
                continue;
            }
            let Some(combination) = prediction
                .bet_recommendations
                .iter()
                .find(|r| r.bet_type == BetType::ExactTrifecta)
                .and_then(|r| r.combinations.first())
            else {
                tally.ken_count += 1;
                continue;
            };

            let stake = self.kelly.size_single(bankroll, prediction.confidence_score);
            if stake > bankroll {
                warn!(race_id = %card.race_id, stake, bankroll, "Insufficient bankroll, race skipped");
                continue;
            }

            bankroll -= stake;
            tally.bets_placed += 1;
            tally.total_wagered += stake;
            tally.by_bank.entry(card.bank_type).or_default().bets += 1;

            if BetType::ExactTrifecta.is_hit(combination, &race.actual_result.finish_order) {
                let odds = card
                    .odds
                    .quoted(&BetType::ExactTrifecta, combination)
                    .unwrap_or(DEFAULT_ODDS);
                let payout = (stake as f64 * odds) as i64;
                bankroll += payout;
                tally.record_win(&card.race_id, card.bank_type, stake, payout);
                debug!(race_id = %card.race_id, %combination, stake, payout, "Backtest hit");
            } else {
                tally.record_loss(&card.race_id, card.bank_type, stake);
            }

            tally.track_drawdown(bankroll);
        }

        let test_period = match (races.first(), races.last()) {
            (Some(first), Some(last)) => format!("{} - {}", first.card.race_id, last.card.race_id),
            _ => String::new(),
        };

        let result = BacktestResult {
            test_id: format!("bt_{}_{}", self.config.strategy_name, now.format("%Y%m%d%H%M%S")),
            strategy_name: self.config.strategy_name.clone(),
            test_period,
            total_races: races.len(),
            bets_placed: tally.bets_placed,
            ken_count: tally.ken_count,
            wins: tally.wins,
            losses: tally.losses,
            initial_bankroll: initial,
            final_bankroll: bankroll,
            total_wagered: tally.total_wagered,
            total_returned: tally.total_returned,
            roi_percentage: percentage(
                tally.total_returned - tally.total_wagered,
                tally.total_wagered,
            ),
            win_rate: percentage(tally.wins as i64, tally.bets_placed as i64),
            max_drawdown: tally.max_drawdown,
            max_losing_streak: tally.max_losing_streak,
            avg_odds_won: tally.avg_odds_won(),
            best_bet: tally.best_bet.take(),
            worst_bet: tally.worst_bet.take(),
            bank_type_performance: std::mem::take(&mut tally.by_bank),
            timestamp: now,
        };

        info!(
            test_id = %result.test_id,
            bets = result.bets_placed,
            wins = result.wins,
            roi = %result.roi_percentage,
            win_rate = %result.win_rate,
            final_bankroll = result.final_bankroll,
            "Backtest completed"
        );
        result
    }

    /// Run and append the result to the ledger's capped backtest history.
    pub fn run_and_record(
        &self,
        races: &[SimulatedRace],
        manager: &mut BankrollManager,
    ) -> Result<BacktestResult> {
        let result = self.run(races, manager.store().now());
        let store = manager.store_mut();
        store
            .state_mut()
            .push_backtest(result.clone(), self.config.history_cap);
        store.save()?;
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Human-readable backtest summary.
pub fn generate_backtest_report(result: &BacktestResult) -> String {
    let profit = result.final_bankroll - result.initial_bankroll;
    let mut out = String::new();

    let _ = writeln!(out, "=== Backtest Report ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Test");
    let _ = writeln!(out, "  ID:       {}", result.test_id);
    let _ = writeln!(out, "  Strategy: {}", result.strategy_name);
    let _ = writeln!(out, "  Period:   {}", result.test_period);
    let _ = writeln!(out, "  Races:    {}", result.total_races);
    let _ = writeln!(out);
    let _ = writeln!(out, "Bankroll");
    let _ = writeln!(out, "  Initial:      {}", format_yen(result.initial_bankroll));
    let _ = writeln!(out, "  Final:        {}", format_yen(result.final_bankroll));
    let _ = writeln!(out, "  Profit/Loss:  {}", format_signed_yen(profit));
    let _ = writeln!(out, "  Max drawdown: {}", format_yen(-result.max_drawdown));
    let _ = writeln!(out);
    let _ = writeln!(out, "Performance");
    let _ = writeln!(out, "  Bets:      {}", result.bets_placed);
    let _ = writeln!(out, "  Skipped:   {}", result.ken_count);
    let _ = writeln!(out, "  Wins:      {}", result.wins);
    let _ = writeln!(out, "  Losses:    {}", result.losses);
    let _ = writeln!(out, "  Win rate:  {}%", result.win_rate);
    let _ = writeln!(out, "  ROI:       {}%", result.roi_percentage);
    let _ = writeln!(out, "  Avg odds:  {}x", result.avg_odds_won);
    let _ = writeln!(out, "  Max streak: {} losses", result.max_losing_streak);
    let _ = writeln!(out);
    let _ = write!(out, "By bank");
    for (bank, perf) in &result.bank_type_performance {
        let rate = percentage(perf.wins as i64, perf.bets as i64);
        let _ = write!(
            out,
            "\n  {bank} bank: {}/{} ({:.0}%) {}",
            perf.wins,
            perf.bets,
            rate,
            format_signed_yen(perf.profit)
        );
    }
    if let Some(best) = result.best_bet.as_ref().filter(|b| b.profit > 0) {
        let _ = write!(
            out,
            "\n\nBest bet\n  {}\n  Profit: {} ({:.1}x)",
            best.race_id,
            format_signed_yen(best.profit),
            best.odds
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
