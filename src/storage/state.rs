//! Persisted ledger document.
//!
//! [`LedgerState`] is the single owning aggregate: bankroll, running
//! statistics, risk-control flags, bet history, learning log, racer
//! database, pattern aggregates and backtest history. Fields are private;
//! readers get shared references and every mutation goes through one of the
//! crate-private methods below, each of which keeps the bankroll identity
//! `current = initial + returned - wagered` intact.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::accountant::Settlement;
use crate::types::{BacktestResult, BankType, BetRecord, Decision};

/// Starting bankroll of a fresh ledger, in minor units.
pub const DEFAULT_INITIAL_BANKROLL: i64 = 10_000;

/// `num / den * 100`, rounded half away from zero to two places.
/// Zero when `den` is zero.
pub fn percentage(num: i64, den: i64) -> Decimal {
    if den == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(num) * dec!(100) / Decimal::from(den))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Substructures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankrollState {
    pub initial_amount: i64,
    pub current_amount: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    /// Races skipped with a KEN decision.
    pub ken_count: u64,
    pub total_wagered: i64,
    pub total_returned: i64,
    pub roi_percentage: Decimal,
    pub current_losing_streak: u32,
    pub max_losing_streak: u32,
    pub daily_loss: i64,
    pub last_bet_date: Option<NaiveDate>,
    /// Date the daily counters were last cleared.
    pub last_reset_date: Option<NaiveDate>,
}

impl Statistics {
    /// Wins over placed bets, as a percentage.
    pub fn win_rate(&self) -> Decimal {
        percentage(self.wins as i64, self.total_bets as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskControl {
    pub max_losing_streak_limit: u32,
    pub daily_loss_limit: i64,
    pub is_stopped_today: bool,
    pub stop_reason: Option<String>,
}

impl Default for RiskControl {
    fn default() -> Self {
        Self {
            max_losing_streak_limit: 3,
            daily_loss_limit: 3000,
            is_stopped_today: false,
            stop_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningLogEntry {
    pub timestamp: DateTime<Utc>,
    pub race_id: String,
    pub prediction_summary: String,
    pub result_summary: String,
    pub reflection: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WinTotal {
    pub wins: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatternCount {
    pub total: u64,
    pub predicted: u64,
}

/// Additive win/loss counters. Never decremented.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternAnalysis {
    pub bank_stats: BTreeMap<BankType, WinTotal>,
    /// Keyed by winning pattern (決まり手).
    pub kimarite_stats: BTreeMap<String, PatternCount>,
    pub weather_stats: BTreeMap<String, WinTotal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BankRecord {
    pub races: u64,
    pub wins: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacerRecord {
    pub racer_id: String,
    pub name: String,
    pub total_races: u64,
    pub wins: u64,
    pub second: u64,
    pub third: u64,
    #[serde(default)]
    pub results_by_bank: BTreeMap<BankType, BankRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RacerRecord {
    fn new(racer_id: &str, name: &str) -> Self {
        Self {
            racer_id: racer_id.to_string(),
            name: name.to_string(),
            total_races: 0,
            wins: 0,
            second: 0,
            third: 0,
            results_by_bank: BTreeMap::new(),
            last_updated: None,
        }
    }

    pub fn win_rate(&self) -> Decimal {
        percentage(self.wins as i64, self.total_races as i64)
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    bankroll: BankrollState,
    statistics: Statistics,
    risk_control: RiskControl,
    bet_history: Vec<BetRecord>,
    learning_logs: Vec<LearningLogEntry>,
    racer_database: BTreeMap<String, RacerRecord>,
    pattern_analysis: PatternAnalysis,
    backtest_results: Vec<BacktestResult>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BANKROLL, RiskControl::default())
    }
}

impl LedgerState {
    /// Fresh zero state with the given bankroll and stop-loss limits.
    pub fn new(initial_bankroll: i64, risk_control: RiskControl) -> Self {
        Self {
            bankroll: BankrollState {
                initial_amount: initial_bankroll,
                current_amount: initial_bankroll,
                last_updated: None,
            },
            statistics: Statistics::default(),
            risk_control,
            bet_history: Vec::new(),
            learning_logs: Vec::new(),
            racer_database: BTreeMap::new(),
            pattern_analysis: PatternAnalysis::default(),
            backtest_results: Vec::new(),
        }
    }

    // -- readers -----------------------------------------------------------

    pub fn bankroll(&self) -> &BankrollState {
        &self.bankroll
    }

    pub fn current_amount(&self) -> i64 {
        self.bankroll.current_amount
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn risk_control(&self) -> &RiskControl {
        &self.risk_control
    }

    pub fn bet_history(&self) -> &[BetRecord] {
        &self.bet_history
    }

    pub fn bet(&self, bet_id: &str) -> Option<&BetRecord> {
        self.bet_history.iter().find(|b| b.bet_id == bet_id)
    }

    /// GO records still awaiting a result.
    pub fn unsettled_bets(&self) -> impl Iterator<Item = &BetRecord> {
        self.bet_history
            .iter()
            .filter(|b| !b.result_checked && b.decision == Decision::Go)
    }

    pub fn learning_logs(&self) -> &[LearningLogEntry] {
        &self.learning_logs
    }

    pub fn racer_database(&self) -> &BTreeMap<String, RacerRecord> {
        &self.racer_database
    }

    pub fn pattern_analysis(&self) -> &PatternAnalysis {
        &self.pattern_analysis
    }

    pub fn backtest_results(&self) -> &[BacktestResult] {
        &self.backtest_results
    }

    /// Profit or loss against the initial bankroll.
    pub fn profit(&self) -> i64 {
        self.bankroll.current_amount - self.bankroll.initial_amount
    }

    /// Whether `current == initial + returned - wagered` holds.
    pub fn reconciles(&self) -> bool {
        self.bankroll.current_amount
            == self.bankroll.initial_amount + self.statistics.total_returned
                - self.statistics.total_wagered
    }

    // -- risk control ------------------------------------------------------

    /// Clear the daily counters once per calendar day.
    ///
    /// Runs when `today` differs from both the last bet date and the last
    /// reset date. Zeroes the daily loss and the current losing streak and
    /// lifts the stop flag. Returns whether a reset happened.
    pub(crate) fn apply_daily_reset(&mut self, today: NaiveDate) -> bool {
        let stats = &mut self.statistics;
        if stats.last_bet_date == Some(today) || stats.last_reset_date == Some(today) {
            return false;
        }
        stats.daily_loss = 0;
        stats.current_losing_streak = 0;
        stats.last_reset_date = Some(today);
        self.risk_control.is_stopped_today = false;
        self.risk_control.stop_reason = None;
        true
    }

    pub(crate) fn trip_stop(&mut self, reason: String) {
        self.risk_control.is_stopped_today = true;
        self.risk_control.stop_reason = Some(reason);
    }

    /// Manual resume: lift the stop and clear the counters that tripped it.
    pub(crate) fn resume(&mut self) {
        self.risk_control.is_stopped_today = false;
        self.risk_control.stop_reason = None;
        self.statistics.current_losing_streak = 0;
        self.statistics.daily_loss = 0;
    }

    // -- bet history -------------------------------------------------------

    /// Append a KEN record. No funds move.
    pub(crate) fn record_skip(&mut self, record: BetRecord, today: NaiveDate) {
        self.statistics.ken_count += 1;
        self.statistics.last_bet_date = Some(today);
        self.bet_history.push(record);
    }

    /// Append a GO record and debit its total stake exactly once.
    pub(crate) fn record_placement(
        &mut self,
        record: BetRecord,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) {
        self.statistics.last_bet_date = Some(today);
        if record.total_amount > 0 {
            self.bankroll.current_amount -= record.total_amount;
            self.statistics.total_bets += 1;
            self.statistics.total_wagered += record.total_amount;
        }
        self.bankroll.last_updated = Some(now);
        self.bet_history.push(record);
    }

    pub(crate) fn bet_index(&self, bet_id: &str) -> Option<usize> {
        self.bet_history.iter().position(|b| b.bet_id == bet_id)
    }

    pub(crate) fn bet_at(&self, index: usize) -> &BetRecord {
        &self.bet_history[index]
    }

    /// Mark a record checked without touching funds or statistics.
    pub(crate) fn mark_checked(&mut self, index: usize) -> BetRecord {
        let record = &mut self.bet_history[index];
        record.result_checked = true;
        record.clone()
    }

    /// Write a settlement onto an open record and apply exactly one of the
    /// win or loss statistic updates.
    pub(crate) fn apply_settlement(
        &mut self,
        index: usize,
        settlement: &Settlement,
        kimarite: &str,
        now: DateTime<Utc>,
    ) -> BetRecord {
        let record = &mut self.bet_history[index];
        record.is_won = Some(settlement.is_won);
        record.actual_return = Some(settlement.actual_return);
        record.result_checked = true;
        record.winning_combination = settlement.winning_combination.clone();
        record.official_return = settlement.official_return;
        record.kimarite = kimarite.to_string();
        let total_amount = record.total_amount;
        let settled = record.clone();

        let stats = &mut self.statistics;
        if settlement.is_won {
            self.bankroll.current_amount += settlement.actual_return;
            stats.wins += 1;
            stats.total_returned += settlement.actual_return;
            stats.current_losing_streak = 0;
        } else {
            stats.losses += 1;
            stats.current_losing_streak += 1;
            stats.daily_loss += total_amount;
            stats.max_losing_streak = stats.max_losing_streak.max(stats.current_losing_streak);
        }
        if stats.total_wagered > 0 {
            stats.roi_percentage =
                percentage(stats.total_returned - stats.total_wagered, stats.total_wagered);
        }
        self.bankroll.last_updated = Some(now);
        settled
    }

    // -- learning ----------------------------------------------------------

    pub(crate) fn record_pattern(
        &mut self,
        bank: BankType,
        won: bool,
        pattern: &str,
        weather: Option<&str>,
    ) {
        let pa = &mut self.pattern_analysis;

        let bank_entry = pa.bank_stats.entry(bank).or_default();
        bank_entry.total += 1;
        if won {
            bank_entry.wins += 1;
        }

        if !pattern.is_empty() {
            let entry = pa.kimarite_stats.entry(pattern.to_string()).or_default();
            entry.total += 1;
            if won {
                entry.predicted += 1;
            }
        }

        if let Some(weather) = weather.filter(|w| !w.is_empty()) {
            let entry = pa.weather_stats.entry(weather.to_string()).or_default();
            entry.total += 1;
            if won {
                entry.wins += 1;
            }
        }
    }

    /// Append a log entry, keeping only the most recent `cap` entries.
    pub(crate) fn push_learning_log(&mut self, entry: LearningLogEntry, cap: usize) {
        self.learning_logs.push(entry);
        if self.learning_logs.len() > cap {
            let excess = self.learning_logs.len() - cap;
            self.learning_logs.drain(..excess);
        }
    }

    pub(crate) fn upsert_racer(
        &mut self,
        racer_id: &str,
        name: &str,
        finish_position: u8,
        bank: BankType,
        now: DateTime<Utc>,
    ) -> RacerRecord {
        let record = self
            .racer_database
            .entry(racer_id.to_string())
            .or_insert_with(|| RacerRecord::new(racer_id, name));
        record.name = name.to_string();
        record.total_races += 1;
        record.last_updated = Some(now);
        match finish_position {
            1 => record.wins += 1,
            2 => record.second += 1,
            3 => record.third += 1,
            _ => {}
        }
        let by_bank = record.results_by_bank.entry(bank).or_default();
        by_bank.races += 1;
        if finish_position == 1 {
            by_bank.wins += 1;
        }
        record.clone()
    }

    /// Append a backtest result, keeping only the most recent `cap`.
    pub(crate) fn push_backtest(&mut self, result: BacktestResult, cap: usize) {
        self.backtest_results.push(result);
        if self.backtest_results.len() > cap {
            let excess = self.backtest_results.len() - cap;
            self.backtest_results.drain(..excess);
        }
    }

    #[cfg(test)]
    pub(crate) fn statistics_mut(&mut self) -> &mut Statistics {
        &mut self.statistics
    }

    #[cfg(test)]
    pub(crate) fn bankroll_mut(&mut self) -> &mut BankrollState {
        &mut self.bankroll
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
