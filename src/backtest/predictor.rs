//! Prediction sources for backtesting.
//!
//! The live system takes its predictions from an external engine; a
//! backtest substitutes a deterministic rule so runs are reproducible.

use std::collections::BTreeMap;

use crate::types::{BankType, BetRecommendation, BetType, Combination, Decision, Prediction, RaceCard};

/// Produces a prediction for a race card.
#[cfg_attr(test, mockall::automock)]
pub trait Predictor: Send + Sync {
    fn predict(&self, card: &RaceCard) -> Prediction;
}

// Confidence is accumulated in basis points so thresholds compare exactly.
const BASE_BPS: i32 = 5_000;
const BANK_STYLE_BONUS_BPS: i32 = 1_500;
const TOP_SCORE_BONUS_BPS: i32 = 1_000;
const COMMENT_STEP_BPS: i32 = 500;
const GO_THRESHOLD_BPS: i32 = 6_500;
const CAP_BPS: i32 = 9_500;

/// Scores above this earn the top-scorer bonus.
const TOP_SCORE_LINE: f64 = 115.0;

const FRONT_RUNNING_STYLES: [&str; 2] = ["先行", "逃げ"];
const CLOSING_STYLES: [&str; 2] = ["追込", "差し"];
const TRUST_WORDS: [&str; 2] = ["信頼", "任せる"];
const SOLO_WORDS: [&str; 2] = ["自力", "単騎"];

/// Fixed rule-based predictor.
///
/// Starting from 0.50:
/// - +0.15 on a 33 bank if any line runs a front-running style, or on a
///   500 bank if any line runs a closing style;
/// - +0.10 if the top score is above 115;
/// - +0.05 per comment expressing trust in a partner, -0.05 per comment
///   announcing a solo effort.
///
/// GO at 0.65 or above (capped at 0.95) with an exact trifecta on the three
/// highest scores, ties kept in card order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedPredictor;

impl RuleBasedPredictor {
    fn confidence_bps(card: &RaceCard) -> i32 {
        let mut bps = BASE_BPS;

        let favoured: &[&str] = match card.bank_type {
            BankType::Bank333 => &FRONT_RUNNING_STYLES,
            BankType::Bank500 => &CLOSING_STYLES,
            BankType::Bank400 => &[],
        };
        if card
            .line_formations
            .iter()
            .any(|line| favoured.contains(&line.strategy.as_str()))
        {
            bps += BANK_STYLE_BONUS_BPS;
        }

        let top_score = card
            .racers
            .iter()
            .map(|r| r.score)
            .fold(f64::NEG_INFINITY, f64::max);
        if top_score > TOP_SCORE_LINE {
            bps += TOP_SCORE_BONUS_BPS;
        }

        for racer in &card.racers {
            if TRUST_WORDS.iter().any(|w| racer.comment.contains(w)) {
                bps += COMMENT_STEP_BPS;
            }
            if SOLO_WORDS.iter().any(|w| racer.comment.contains(w)) {
                bps -= COMMENT_STEP_BPS;
            }
        }
        bps
    }

    fn top_three(card: &RaceCard) -> Option<Combination> {
        let mut ranked: Vec<_> = card.racers.iter().collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if ranked.len() < 3 {
            return None;
        }
        Combination::new(ranked[..3].iter().map(|r| r.number).collect()).ok()
    }
}

impl Predictor for RuleBasedPredictor {
    fn predict(&self, card: &RaceCard) -> Prediction {
        let bps = Self::confidence_bps(card);
        let confidence = f64::from(bps.clamp(0, CAP_BPS)) / 10_000.0;

        let pick = (bps >= GO_THRESHOLD_BPS)
            .then(|| Self::top_three(card))
            .flatten();

        match pick {
            Some(combination) => Prediction {
                race_id: card.race_id.clone(),
                decision: Decision::Go,
                confidence_score: confidence,
                bet_recommendations: vec![BetRecommendation {
                    bet_type: BetType::ExactTrifecta,
                    combinations: vec![combination],
                    odds: BTreeMap::new(),
                    expected_value: 1.0,
                }],
                reasoning: format!("rule-based score {bps} bps"),
            },
            None => Prediction {
                race_id: card.race_id.clone(),
                decision: Decision::Ken,
                confidence_score: confidence,
                bet_recommendations: Vec::new(),
                reasoning: format!("rule-based score {bps} bps"),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
