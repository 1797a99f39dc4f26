//! Backtest replay over generated race sequences.

use keirin_bankroll::backtest::{demo_races, generate_backtest_report, BacktestConfig, Backtester};
use keirin_bankroll::storage::{load_state, Clock};
use tempfile::TempDir;

use super::{open_manager, race_day_clock};

#[test]
fn test_demo_backtest_is_consistent() {
    let races = demo_races(42, 40);
    let backtester = Backtester::new(BacktestConfig::default());
    let result = backtester.run(&races, race_day_clock().now());

    assert_eq!(result.total_races, 40);
    assert_eq!(result.bets_placed, result.wins + result.losses);
    assert_eq!(
        result.final_bankroll,
        result.initial_bankroll - result.total_wagered + result.total_returned
    );
    assert!(result.max_drawdown >= 0);
    assert!(result.test_period.starts_with(&races[0].card.race_id));

    let per_bank: u64 = result.bank_type_performance.values().map(|p| p.bets).sum();
    assert_eq!(per_bank, result.bets_placed);

    // Same races, same strategy, same numbers.
    let again = backtester.run(&races, race_day_clock().now());
    assert_eq!(again.final_bankroll, result.final_bankroll);

    let report = generate_backtest_report(&result);
    assert!(report.contains(&result.test_id));
}

#[test]
fn test_backtest_history_is_capped_and_leaves_bankroll_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let mut m = open_manager(&path, &race_day_clock());
    let races = demo_races(7, 10);
    let backtester = Backtester::new(BacktestConfig {
        history_cap: 5,
        ..BacktestConfig::default()
    });

    for _ in 0..7 {
        backtester.run_and_record(&races, &mut m).unwrap();
    }

    let persisted = load_state(&path).unwrap();
    assert_eq!(persisted.backtest_results().len(), 5);
    assert_eq!(persisted.current_amount(), 10_000);
    assert!(persisted.bet_history().is_empty());
}
