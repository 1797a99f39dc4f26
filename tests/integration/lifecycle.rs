//! Morning placement, evening settlement and the stop-loss across days.

use chrono::Duration;
use keirin_bankroll::storage::load_state;
use keirin_bankroll::strategy::RejectionReason;
use keirin_bankroll::types::{
    ActualResult, BankType, BetRecommendation, BetType, Decision, Prediction, RaceOutcome,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

use super::{open_manager, race_day_clock};

fn go(race_id: &str, confidence: f64, combos: &[&str], odds: f64) -> Prediction {
    Prediction {
        race_id: race_id.into(),
        decision: Decision::Go,
        confidence_score: confidence,
        bet_recommendations: vec![BetRecommendation {
            bet_type: BetType::ExactTrifecta,
            combinations: combos.iter().map(|c| c.parse().unwrap()).collect(),
            odds: combos.iter().map(|c| (c.to_string(), odds)).collect(),
            expected_value: 1.0,
        }],
        reasoning: String::new(),
    }
}

fn outcome(race_id: &str, finish: &[u8]) -> RaceOutcome {
    RaceOutcome {
        race_id: race_id.into(),
        bank_type: BankType::Bank400,
        weather: Some("曇".into()),
        result: ActualResult {
            finish_order: finish.to_vec(),
            winning_pattern: "捲り".into(),
            payouts: BTreeMap::new(),
        },
        racers: Vec::new(),
    }
}

#[test]
fn test_place_settle_report_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger").join("state.json");
    let clock = race_day_clock();
    let mut m = open_manager(&path, &clock);

    let placed = m
        .place_batch(&[
            go("kawasaki_11", 0.3, &["1-2-4", "1-4-2"], 8.5),
            go("kawasaki_12", 0.82, &["3-5-7"], 40.0),
        ])
        .unwrap();
    assert_eq!(placed.len(), 2);
    let wagered: i64 = placed.iter().map(|b| b.total_amount).sum();
    assert_eq!(m.current_bankroll(), 10_000 - wagered);
    assert_eq!(m.unsettled_bets().len(), 2);

    clock.advance(Duration::hours(9));
    let settled = m
        .settle_outcomes(&[outcome("kawasaki_11", &[1, 2, 4, 9, 3]), outcome("kawasaki_12", &[1, 2, 3])])
        .unwrap();
    assert_eq!(settled.len(), 2);
    assert!(m.unsettled_bets().is_empty());

    let stats = m.state().statistics();
    assert_eq!((stats.wins, stats.losses), (1, 1));
    assert_eq!(stats.total_returned, 850);
    assert!(m.state().reconciles());

    // A fresh process sees exactly what was written.
    let reloaded = load_state(&path).unwrap();
    assert_eq!(reloaded.current_amount(), m.current_bankroll());
    let ids = |bets: &[keirin_bankroll::types::BetRecord]| {
        bets.iter().map(|b| (b.bet_id.clone(), b.actual_return)).collect::<Vec<_>>()
    };
    assert_eq!(ids(reloaded.bet_history()), ids(m.state().bet_history()));
    assert_eq!(reloaded.statistics().total_returned, 850);

    let report = m.generate_report();
    assert!(report.contains("Status: RUNNING"));
    assert!(report.contains("Wins:     1"));
}

#[test]
fn test_losing_streak_stops_until_next_day() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let clock = race_day_clock();
    let mut m = open_manager(&path, &clock);

    for race in ["hiratsuka_1", "hiratsuka_2", "hiratsuka_3"] {
        m.place_batch(&[go(race, 0.7, &["7-8-9"], 60.0)]).unwrap();
        m.settle_outcomes(&[outcome(race, &[1, 2, 3])]).unwrap();
    }
    assert_eq!(m.state().statistics().current_losing_streak, 3);

    let verdict = m.can_bet().unwrap();
    assert!(matches!(
        verdict.reason(),
        Some(RejectionReason::LosingStreak { streak: 3, limit: 3 })
    ));
    // The fourth prediction of the day is not placed.
    assert!(m.place_batch(&[go("hiratsuka_4", 0.9, &["1-2-3"], 9.0)]).unwrap().is_empty());
    assert!(m.generate_report().contains("STOPPED"));

    // Reopening the same day keeps the stop.
    drop(m);
    let mut m = open_manager(&path, &clock);
    assert!(m.state().risk_control().is_stopped_today);
    assert!(!m.can_bet().unwrap().is_allowed());

    clock.advance(Duration::days(1));
    let mut m = open_manager(&path, &clock);
    assert!(m.can_bet().unwrap().is_allowed());
    let stats = m.state().statistics();
    assert_eq!(stats.current_losing_streak, 0);
    assert_eq!(stats.daily_loss, 0);
    assert_eq!(stats.max_losing_streak, 3);
    assert!(m.state().reconciles());
}

/// Three single-combination trifecta legs at full confidence.
fn spread(race_id: &str) -> Prediction {
    let mut prediction = go(race_id, 1.0, &["7-8-9"], 60.0);
    for combo in ["7-9-8", "8-7-9"] {
        let leg = go(race_id, 1.0, &[combo], 60.0);
        prediction.bet_recommendations.extend(leg.bet_recommendations);
    }
    prediction
}

#[test]
fn test_daily_loss_stops_until_next_day() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let clock = race_day_clock();
    let mut m = open_manager(&path, &clock);

    // 3 x 600 at a 10,000 bankroll, then 3 x 400 at 8,200.
    let first = m.place_batch(&[spread("tachikawa_1")]).unwrap();
    assert_eq!(first[0].total_amount, 1_800);
    m.settle_outcomes(&[outcome("tachikawa_1", &[1, 2, 3])]).unwrap();
    assert!(m.can_bet().unwrap().is_allowed());

    let second = m.place_batch(&[spread("tachikawa_2")]).unwrap();
    assert_eq!(second[0].total_amount, 1_200);
    m.settle_outcomes(&[outcome("tachikawa_2", &[1, 2, 3])]).unwrap();

    let stats = m.state().statistics();
    assert_eq!(stats.daily_loss, 3_000);
    assert_eq!(stats.current_losing_streak, 2);
    assert!(matches!(
        m.can_bet().unwrap().reason(),
        Some(RejectionReason::DailyLoss { loss: 3_000, limit: 3_000 })
    ));

    // Later the same day nothing more is placed, even after a restart.
    clock.advance(Duration::hours(6));
    assert!(m.place_batch(&[go("tachikawa_3", 0.9, &["1-2-3"], 9.0)]).unwrap().is_empty());
    drop(m);
    let mut m = open_manager(&path, &clock);
    assert!(m.state().risk_control().is_stopped_today);
    assert!(!m.can_bet().unwrap().is_allowed());
    assert_eq!(m.current_bankroll(), 7_000);

    clock.advance(Duration::days(1));
    let mut m = open_manager(&path, &clock);
    assert!(m.can_bet().unwrap().is_allowed());
    assert_eq!(m.state().statistics().daily_loss, 0);
    assert_eq!(m.place_batch(&[go("tachikawa_4", 0.8, &["1-2-3"], 9.0)]).unwrap().len(), 1);
}

#[test]
fn test_manual_resume_same_day() {
    let dir = TempDir::new().unwrap();
    let clock = race_day_clock();
    let mut m = open_manager(&dir.path().join("state.json"), &clock);

    for race in ["kokura_1", "kokura_2", "kokura_3"] {
        m.place_batch(&[go(race, 0.7, &["7-8-9"], 60.0)]).unwrap();
        m.settle_outcomes(&[outcome(race, &[1, 2, 3])]).unwrap();
    }
    assert!(!m.can_bet().unwrap().is_allowed());

    m.resume().unwrap();
    assert!(m.can_bet().unwrap().is_allowed());
    assert_eq!(m.place_batch(&[go("kokura_4", 0.8, &["1-2-3"], 9.0)]).unwrap().len(), 1);
}

#[test]
fn test_corrupt_ledger_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{ \"bankroll\": ").unwrap();

    let mut m = open_manager(&path, &race_day_clock());
    assert_eq!(m.current_bankroll(), 10_000);
    assert!(m.state().bet_history().is_empty());

    m.place_batch(&[go("maebashi_1", 0.8, &["1-2-3"], 9.0)]).unwrap();
    assert_eq!(load_state(&path).unwrap().bet_history().len(), 1);
}

#[test]
fn test_full_reset_discards_history() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let mut m = open_manager(&path, &race_day_clock());
    m.place_batch(&[go("maebashi_1", 0.8, &["1-2-3"], 9.0)]).unwrap();

    m.full_reset().unwrap();
    assert_eq!(m.current_bankroll(), 10_000);
    assert!(load_state(&path).unwrap().bet_history().is_empty());
}
