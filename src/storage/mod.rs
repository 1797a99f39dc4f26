//! Persistence layer.
//!
//! The whole ledger lives in one pretty-printed JSON document. Writes go to a
//! sibling temp file which is synced and renamed over the real one, so a
//! crash mid-write never leaves a half-written ledger behind. A missing or
//! unreadable file loads as a fresh state.

pub mod clock;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use state::{
    percentage, BankRecord, BankrollState, LearningLogEntry, LedgerState, PatternAnalysis,
    PatternCount, RacerRecord, RiskControl, Statistics, WinTotal, DEFAULT_INITIAL_BANKROLL,
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::LedgerError;

/// Default state file path.
pub const DEFAULT_STATE_FILE: &str = "data/bankroll_state.json";

/// Save ledger state atomically. Creates parent directories if needed.
pub fn save_state(state: &LedgerState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(state).map_err(LedgerError::from)?;
    let temp_path = path.with_extension("json.tmp");

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(LedgerError::Storage {
            path: path.display().to_string(),
            source: e,
        }
        .into());
    }

    debug!(path = %path.display(), bankroll = state.current_amount(), "State saved");
    Ok(())
}

/// Load ledger state from a JSON file.
///
/// Returns `None` when the file does not exist or cannot be parsed; the
/// caller starts fresh in both cases.
pub fn load_state(path: &Path) -> Option<LedgerState> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No saved state found, starting fresh");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "State file unreadable, starting fresh");
            return None;
        }
    };

    match serde_json::from_str::<LedgerState>(&json) {
        Ok(state) => {
            info!(
                path = %path.display(),
                bankroll = state.current_amount(),
                bets = state.bet_history().len(),
                "State loaded from disk"
            );
            Some(state)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "State file corrupt, starting fresh");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Owns the in-memory ledger and its file.
///
/// Every public operation elsewhere in the crate mutates through
/// [`LedgerStore::state_mut`] and then calls [`LedgerStore::save`] once, so
/// each operation is persisted as a single unit.
pub struct LedgerStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    initial_bankroll: i64,
    risk_defaults: RiskControl,
    state: LedgerState,
}

impl LedgerStore {
    /// Load the ledger at `path` (or start fresh) and run the daily reset.
    ///
    /// `initial_bankroll` and `risk_defaults` only seed a fresh ledger; a
    /// persisted one keeps its own limits.
    pub fn open(
        path: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
        initial_bankroll: i64,
        risk_defaults: RiskControl,
    ) -> Result<Self> {
        let path = path.into();
        let state = load_state(&path)
            .unwrap_or_else(|| LedgerState::new(initial_bankroll, risk_defaults.clone()));
        let mut store = Self {
            path,
            clock,
            initial_bankroll,
            risk_defaults,
            state,
        };
        store.reset_daily()?;
        Ok(store)
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut LedgerState {
        &mut self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn save(&self) -> Result<()> {
        save_state(&self.state, &self.path)
    }

    /// Clear the daily loss and stop flag if the date has moved on since the
    /// last bet. Persists only when something changed.
    pub fn reset_daily(&mut self) -> Result<bool> {
        let today = self.today();
        if !self.state.apply_daily_reset(today) {
            return Ok(false);
        }
        info!(%today, "Daily counters reset");
        self.save()?;
        Ok(true)
    }

    /// Discard everything and start over from the configured defaults.
    pub fn full_reset(&mut self) -> Result<()> {
        warn!(path = %self.path.display(), "Full ledger reset");
        self.state = LedgerState::new(self.initial_bankroll, self.risk_defaults.clone());
        self.save()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
