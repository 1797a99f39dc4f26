//! Integration tests: full ledger lifecycle against real files on disk.

mod lifecycle;
mod simulation;

use chrono::{TimeZone, Utc};
use keirin_bankroll::engine::BankrollManager;
use keirin_bankroll::storage::{LedgerStore, ManualClock, RiskControl};
use keirin_bankroll::strategy::{KellyCalculator, RiskGate};
use std::path::Path;
use std::sync::Arc;

/// 09:00 UTC on the first race day.
pub fn race_day_clock() -> ManualClock {
    ManualClock::at(Utc.with_ymd_and_hms(2024, 12, 1, 9, 0, 0).unwrap())
}

pub fn open_manager(path: &Path, clock: &ManualClock) -> BankrollManager {
    let store = LedgerStore::open(path, Arc::new(clock.clone()), 10_000, RiskControl::default())
        .unwrap();
    BankrollManager::new(store, RiskGate::default(), KellyCalculator::default())
}
