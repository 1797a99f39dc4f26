//! Deterministic demo race data.
//!
//! Seeded, so a given `(seed, count)` always yields the same races. Used by
//! `backtest --demo` and by tests that need a realistic sequence.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::types::{
    ActualResult, BankType, BetType, Combination, LineFormation, OddsTable, RaceCard, Racer,
    SimulatedRace,
};

const VENUES: [(&str, BankType); 5] = [
    ("maebashi", BankType::Bank333),
    ("kawasaki", BankType::Bank400),
    ("hiratsuka", BankType::Bank400),
    ("kokura", BankType::Bank333),
    ("keiokaku", BankType::Bank500),
];
const STYLES: [&str; 4] = ["先行", "捲り", "追込", "自在"];
const COMMENTS: [&str; 4] = ["信頼して付く", "自力で勝負", "展開次第", "任せる"];
const PATTERNS: [&str; 4] = ["逃げ", "捲り", "差し", "マーク"];
const GRADES: [&str; 5] = ["GI", "GII", "GIII", "FI", "FII"];
const WEATHER: [&str; 3] = ["晴", "曇", "雨"];
const LINES: [&[u8]; 3] = [&[1, 2, 4], &[3, 7], &[5, 8, 9]];
const FIELD_SIZE: u8 = 9;

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `count` races on consecutive days from 2024-12-01.
pub fn demo_races(seed: u64, count: usize) -> Vec<SimulatedRace> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap_or_default();

    (0..count)
        .map(|i| {
            let (venue, bank_type) = *pick(&mut rng, &VENUES);

            let racers: Vec<Racer> = (1..=FIELD_SIZE)
                .map(|number| Racer {
                    number,
                    name: format!("Racer {number}"),
                    score: round1(rng.random_range(100.0..=120.0)),
                    comment: pick(&mut rng, &COMMENTS).to_string(),
                    recent_results: Vec::new(),
                })
                .collect();

            let line_formations = LINES
                .iter()
                .map(|members| LineFormation {
                    members: members.to_vec(),
                    strategy: pick(&mut rng, &STYLES).to_string(),
                })
                .collect();

            let mut finish_order: Vec<u8> = (1..=FIELD_SIZE).collect();
            finish_order.shuffle(&mut rng);

            let mut odds = OddsTable::default();
            for a in 1..=FIELD_SIZE {
                for b in (1..=FIELD_SIZE).filter(|&b| b != a) {
                    for c in (1..=FIELD_SIZE).filter(|&c| c != a && c != b) {
                        if let Ok(combination) = Combination::new(vec![a, b, c]) {
                            let quoted = round1(rng.random_range(5.0..=100.0));
                            odds.insert(BetType::ExactTrifecta, &combination, quoted);
                        }
                    }
                }
            }

            let date = start
                .checked_add_days(Days::new(i as u64))
                .unwrap_or(start)
                .format("%Y%m%d");
            let race_no = rng.random_range(1..=12);

            SimulatedRace {
                card: RaceCard {
                    race_id: format!("{venue}_{race_no}_{date}"),
                    venue: venue.to_string(),
                    bank_type,
                    race_grade: pick(&mut rng, &GRADES).to_string(),
                    distance: 2025,
                    weather: pick(&mut rng, &WEATHER).to_string(),
                    racers,
                    line_formations,
                    odds,
                },
                actual_result: ActualResult {
                    finish_order,
                    winning_pattern: pick(&mut rng, &PATTERNS).to_string(),
                    payouts: Default::default(),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_races() {
        assert_eq!(demo_races(7, 5), demo_races(7, 5));
        assert_ne!(demo_races(7, 5), demo_races(8, 5));
    }

    #[test]
    fn test_race_shape() {
        let races = demo_races(42, 3);
        assert_eq!(races.len(), 3);
        let race = &races[0];
        assert_eq!(race.card.racers.len(), 9);
        assert_eq!(race.card.line_formations.len(), 3);
        assert_eq!(race.card.odds.0[&BetType::ExactTrifecta].len(), 9 * 8 * 7);
        assert!(race.card.racers.iter().all(|r| (100.0..=120.0).contains(&r.score)));

        let mut finish = race.actual_result.finish_order.clone();
        finish.sort_unstable();
        assert_eq!(finish, (1..=9).collect::<Vec<u8>>());
        assert!(races[2].card.race_id.ends_with("_20241203"));
    }
}
