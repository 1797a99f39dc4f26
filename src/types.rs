//! Shared types for the keirin bankroll ledger.
//!
//! These types form the data model used across all modules: bet types and
//! combinations, bet records, and the plain records exchanged with the
//! surrounding application (race cards, predictions, actual results).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Odds assumed for a combination that has no quoted figure.
pub const DEFAULT_ODDS: f64 = 10.0;

// ---------------------------------------------------------------------------
// Bet type
// ---------------------------------------------------------------------------

/// Wager type. Four supported types plus a fallback that keeps an
/// unrecognised tag intact so a persisted record never fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BetType {
    /// First three finishers in exact order (3連単).
    ExactTrifecta,
    /// First three finishers in any order (3連複).
    UnorderedTrifecta,
    /// First two finishers in exact order (2車単).
    ExactDuplet,
    /// Both named participants anywhere in the first three (ワイド).
    PairPlace,
    /// Unrecognised tag. Sized with the fallback allocation, never wins.
    Other(String),
}

impl BetType {
    pub fn name(&self) -> &str {
        match self {
            BetType::ExactTrifecta => "exact_trifecta",
            BetType::UnorderedTrifecta => "unordered_trifecta",
            BetType::ExactDuplet => "exact_duplet",
            BetType::PairPlace => "pair_place",
            BetType::Other(tag) => tag,
        }
    }

    /// Share of a confidence-sized stake committed to this type.
    ///
    /// `Other` falls back to 0.5.
    pub fn allocation(&self) -> f64 {
        match self {
            BetType::ExactTrifecta => 0.6,
            BetType::UnorderedTrifecta => 0.2,
            BetType::ExactDuplet => 0.15,
            BetType::PairPlace => 0.05,
            BetType::Other(_) => 0.5,
        }
    }

    /// How many leading finishers decide this type.
    fn finishers_considered(&self) -> usize {
        match self {
            BetType::ExactTrifecta | BetType::UnorderedTrifecta | BetType::PairPlace => 3,
            BetType::ExactDuplet => 2,
            BetType::Other(_) => 0,
        }
    }

    /// Whether `combination` wins under this type for the given finish order.
    pub fn is_hit(&self, combination: &Combination, finish_order: &[u8]) -> bool {
        let needed = self.finishers_considered();
        if needed == 0 || finish_order.len() < needed {
            return false;
        }
        let top = &finish_order[..needed];
        match self {
            BetType::ExactTrifecta | BetType::ExactDuplet => combination.numbers() == top,
            BetType::UnorderedTrifecta => {
                combination.len() == 3
                    && combination.as_set() == top.iter().copied().collect::<BTreeSet<u8>>()
            }
            BetType::PairPlace => {
                combination.len() == 2 && combination.numbers().iter().all(|n| top.contains(n))
            }
            BetType::Other(_) => false,
        }
    }

    /// Whether two combinations denote the same ticket under this type.
    pub fn same_ticket(&self, a: &Combination, b: &Combination) -> bool {
        match self {
            BetType::UnorderedTrifecta | BetType::PairPlace => a.as_set() == b.as_set(),
            _ => a == b,
        }
    }
}

impl From<String> for BetType {
    fn from(tag: String) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "exact_trifecta" | "sanrentan" | "trifecta" | "3連単" => BetType::ExactTrifecta,
            "unordered_trifecta" | "sanrenpuku" | "trio" | "3連複" => BetType::UnorderedTrifecta,
            "exact_duplet" | "nirentan" | "exacta" | "2車単" => BetType::ExactDuplet,
            "pair_place" | "wide" | "ワイド" => BetType::PairPlace,
            _ => BetType::Other(tag),
        }
    }
}

impl From<&str> for BetType {
    fn from(tag: &str) -> Self {
        BetType::from(tag.to_string())
    }
}

impl From<BetType> for String {
    fn from(bet_type: BetType) -> Self {
        bet_type.name().to_string()
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Whether a race is bet on (GO) or skipped (KEN, 見).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "KEN")]
    Ken,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Go => write!(f, "GO"),
            Decision::Ken => write!(f, "KEN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Combination
// ---------------------------------------------------------------------------

/// Tuple of participant (frame) numbers, written `1-2-4`.
///
/// Order is kept as given; whether it matters is decided by the bet type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Combination(Vec<u8>);

impl Combination {
    /// Build a combination, rejecting empty tuples, frame number 0 and repeats.
    pub fn new(numbers: Vec<u8>) -> Result<Self, LedgerError> {
        let text = numbers
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join("-");
        if numbers.is_empty() || numbers.contains(&0) {
            return Err(LedgerError::InvalidCombination(text));
        }
        let distinct: BTreeSet<u8> = numbers.iter().copied().collect();
        if distinct.len() != numbers.len() {
            return Err(LedgerError::InvalidCombination(text));
        }
        Ok(Self(numbers))
    }

    pub fn numbers(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_set(&self) -> BTreeSet<u8> {
        self.0.iter().copied().collect()
    }
}

impl FromStr for Combination {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let numbers = s
            .split(['-', '='])
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| LedgerError::InvalidCombination(s.to_string()))?;
        Combination::new(numbers).map_err(|_| LedgerError::InvalidCombination(s.to_string()))
    }
}

impl TryFrom<String> for Combination {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Combination> for String {
    fn from(combination: Combination) -> Self {
        combination.to_string()
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u8::to_string).collect();
        write!(f, "{}", parts.join("-"))
    }
}

// ---------------------------------------------------------------------------
// Bet records
// ---------------------------------------------------------------------------

/// Stake committed to one combination at its quoted odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinationStake {
    pub combination: Combination,
    pub amount: i64,
    pub odds: f64,
}

/// All stakes of one bet type within a bet record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetGroup {
    pub bet_type: BetType,
    pub combinations: Vec<CombinationStake>,
    pub subtotal: i64,
}

/// One placement decision and, once settled, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecord {
    pub bet_id: String,
    pub race_id: String,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub confidence_score: f64,
    pub bets: Vec<BetGroup>,
    pub total_amount: i64,
    pub expected_return: f64,
    pub actual_return: Option<i64>,
    pub is_won: Option<bool>,
    pub result_checked: bool,
    #[serde(default)]
    pub winning_combination: Option<Combination>,
    /// Deciding pattern of the race (決まり手), free text.
    #[serde(default)]
    pub kimarite: String,
    /// Return implied by the official payout table, when one was supplied.
    #[serde(default)]
    pub official_return: Option<i64>,
}

impl BetRecord {
    pub fn is_ken(&self) -> bool {
        self.decision == Decision::Ken
    }

    /// Net result of a settled record (`None` until settled).
    pub fn profit(&self) -> Option<i64> {
        if !self.result_checked {
            return None;
        }
        Some(self.actual_return.unwrap_or(0) - self.total_amount)
    }
}

impl fmt::Display for BetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} conf={:.2} stake={} groups={}",
            self.bet_id,
            self.race_id,
            self.decision,
            self.confidence_score,
            self.total_amount,
            self.bets.len(),
        )?;
        match (self.result_checked, self.is_won) {
            (true, Some(true)) => write!(f, " WON return={}", self.actual_return.unwrap_or(0)),
            (true, Some(false)) => write!(f, " LOST"),
            (true, None) => write!(f, " checked"),
            (false, _) => write!(f, " open"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records exchanged with collaborators
// ---------------------------------------------------------------------------

/// One recommended bet type with its combinations and quoted odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRecommendation {
    pub bet_type: BetType,
    pub combinations: Vec<Combination>,
    /// Quoted odds keyed by combination text.
    #[serde(default)]
    pub odds: BTreeMap<String, f64>,
    #[serde(default = "default_expected_value")]
    pub expected_value: f64,
}

fn default_expected_value() -> f64 {
    1.0
}

impl BetRecommendation {
    /// Quoted odds for `combination`, or [`DEFAULT_ODDS`] when none is quoted.
    pub fn quoted_odds(&self, combination: &Combination) -> f64 {
        if let Some(odds) = self.odds.get(&combination.to_string()) {
            return *odds;
        }
        self.odds
            .iter()
            .find(|(key, _)| {
                key.parse::<Combination>()
                    .map(|c| self.bet_type.same_ticket(&c, combination))
                    .unwrap_or(false)
            })
            .map(|(_, odds)| *odds)
            .unwrap_or(DEFAULT_ODDS)
    }
}

/// A prediction for one race, as produced by the prediction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub race_id: String,
    pub decision: Decision,
    pub confidence_score: f64,
    #[serde(default)]
    pub bet_recommendations: Vec<BetRecommendation>,
    #[serde(default)]
    pub reasoning: String,
}

impl Prediction {
    /// Reject confidence scores outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(LedgerError::InvalidConfidence(self.confidence_score));
        }
        Ok(())
    }
}

/// Official payout for one bet type, per 100 units staked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payout {
    pub amount: i64,
    pub combination: Combination,
}

/// Actual outcome of a race.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActualResult {
    /// Frame numbers, winner first.
    pub finish_order: Vec<u8>,
    #[serde(default)]
    pub winning_pattern: String,
    /// Official payout table. Informational: settlement pays quoted odds.
    #[serde(default)]
    pub payouts: BTreeMap<BetType, Payout>,
}

/// One registered racer's finish, for the racer database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacerFinish {
    pub racer_id: String,
    #[serde(default)]
    pub name: String,
    pub finish_position: u8,
}

/// A race result as fed to the evening settlement job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceOutcome {
    pub race_id: String,
    #[serde(default)]
    pub bank_type: BankType,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(flatten)]
    pub result: ActualResult,
    #[serde(default)]
    pub racers: Vec<RacerFinish>,
}

/// Venue category: the track ("bank") length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BankType {
    #[serde(rename = "33", alias = "333")]
    Bank333,
    #[default]
    #[serde(rename = "400")]
    Bank400,
    #[serde(rename = "500")]
    Bank500,
}

impl fmt::Display for BankType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankType::Bank333 => write!(f, "33"),
            BankType::Bank400 => write!(f, "400"),
            BankType::Bank500 => write!(f, "500"),
        }
    }
}

impl FromStr for BankType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "33" | "333" => Ok(BankType::Bank333),
            "400" => Ok(BankType::Bank400),
            "500" => Ok(BankType::Bank500),
            other => Err(LedgerError::UnknownBankType(other.to_string())),
        }
    }
}

/// One participant on the race card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Racer {
    #[serde(alias = "waku")]
    pub number: u8,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub comment: String,
    /// Recent finishing positions, most recent first.
    #[serde(default)]
    pub recent_results: Vec<u8>,
}

/// A line (team) of riders and its declared running style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFormation {
    #[serde(alias = "line_members")]
    pub members: Vec<u8>,
    pub strategy: String,
}

/// Quoted odds keyed by bet type, then combination text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OddsTable(pub BTreeMap<BetType, BTreeMap<String, f64>>);

impl OddsTable {
    pub fn quoted(&self, bet_type: &BetType, combination: &Combination) -> Option<f64> {
        self.0
            .get(bet_type)
            .and_then(|table| table.get(&combination.to_string()))
            .copied()
    }

    pub fn insert(&mut self, bet_type: BetType, combination: &Combination, odds: f64) {
        self.0
            .entry(bet_type)
            .or_default()
            .insert(combination.to_string(), odds);
    }
}

/// Race description supplied by the data collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceCard {
    pub race_id: String,
    #[serde(alias = "velodrome")]
    pub venue: String,
    pub bank_type: BankType,
    #[serde(default)]
    pub race_grade: String,
    #[serde(default)]
    pub distance: u32,
    #[serde(default)]
    pub weather: String,
    pub racers: Vec<Racer>,
    #[serde(default)]
    pub line_formations: Vec<LineFormation>,
    #[serde(default)]
    pub odds: OddsTable,
}

/// A historical race with its known outcome, used for backtesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedRace {
    #[serde(flatten)]
    pub card: RaceCard,
    pub actual_result: ActualResult,
}

// ---------------------------------------------------------------------------
// Backtest results
// ---------------------------------------------------------------------------

/// Most profitable single bet of a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestBet {
    pub race_id: String,
    pub profit: i64,
    pub odds: Decimal,
}

/// Largest single losing stake of a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstBet {
    pub race_id: String,
    pub loss: i64,
}

/// Backtest results for one venue category.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VenuePerformance {
    pub bets: u64,
    pub wins: u64,
    pub profit: i64,
}

/// Aggregate of a full backtest replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub test_id: String,
    pub strategy_name: String,
    pub test_period: String,
    pub total_races: usize,
    pub bets_placed: u64,
    pub ken_count: u64,
    pub wins: u64,
    pub losses: u64,
    pub initial_bankroll: i64,
    pub final_bankroll: i64,
    pub total_wagered: i64,
    pub total_returned: i64,
    pub roi_percentage: Decimal,
    pub win_rate: Decimal,
    pub max_drawdown: i64,
    pub max_losing_streak: u32,
    pub avg_odds_won: Decimal,
    pub best_bet: Option<BestBet>,
    pub worst_bet: Option<WorstBet>,
    pub bank_type_performance: BTreeMap<BankType, VenuePerformance>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid combination: {0:?}")]
    InvalidCombination(String),

    #[error("Confidence score out of range [0, 1]: {0}")]
    InvalidConfidence(f64),

    #[error("Unknown bank type: {0:?}")]
    UnknownBankType(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
