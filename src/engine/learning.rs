//! Pattern and learning bookkeeping.
//!
//! Additive win/loss counters by venue category, winning pattern and
//! weather; a capped reflection log; and the per-racer results database.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use super::BankrollManager;
use crate::storage::{LearningLogEntry, PatternAnalysis, RacerRecord};
use crate::types::BankType;

/// Reflections kept in a snapshot.
const SNAPSHOT_MISTAKES: usize = 3;
/// Characters kept per reflection in a snapshot.
const MISTAKE_PREVIEW_CHARS: usize = 100;

/// Soft context handed to the prediction side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningSnapshot {
    #[serde(flatten)]
    pub patterns: PatternAnalysis,
    /// Most recent reflections that read as a missed call, oldest first.
    pub recent_mistakes: Vec<String>,
}

/// Whether a reflection reads as a missed prediction.
fn is_mistake(reflection: &str) -> bool {
    reflection.to_lowercase().contains("mistake") || reflection.contains('外')
}

impl BankrollManager {
    pub fn record_outcome(
        &mut self,
        bank: BankType,
        won: bool,
        winning_pattern: &str,
        weather: Option<&str>,
    ) -> Result<()> {
        self.store
            .state_mut()
            .record_pattern(bank, won, winning_pattern, weather);
        self.store.save()?;
        debug!(%bank, won, winning_pattern, "Pattern recorded");
        Ok(())
    }

    pub fn append_learning_log(
        &mut self,
        race_id: &str,
        prediction_summary: &str,
        result_summary: &str,
        reflection: &str,
    ) -> Result<()> {
        let entry = LearningLogEntry {
            timestamp: self.store.now(),
            race_id: race_id.to_string(),
            prediction_summary: prediction_summary.to_string(),
            result_summary: result_summary.to_string(),
            reflection: reflection.to_string(),
        };
        let cap = self.learning_log_cap;
        self.store.state_mut().push_learning_log(entry, cap);
        self.store.save()
    }

    pub fn learning_snapshot(&self) -> LearningSnapshot {
        let state = self.state();
        let mut recent_mistakes: Vec<String> = state
            .learning_logs()
            .iter()
            .rev()
            .filter(|log| is_mistake(&log.reflection))
            .take(SNAPSHOT_MISTAKES)
            .map(|log| log.reflection.chars().take(MISTAKE_PREVIEW_CHARS).collect())
            .collect();
        recent_mistakes.reverse();

        LearningSnapshot {
            patterns: state.pattern_analysis().clone(),
            recent_mistakes,
        }
    }

    /// Upsert one racer's finish into the racer database.
    pub fn update_racer(
        &mut self,
        racer_id: &str,
        name: &str,
        finish_position: u8,
        bank: BankType,
    ) -> Result<RacerRecord> {
        let now = self.store.now();
        let record = self
            .store
            .state_mut()
            .upsert_racer(racer_id, name, finish_position, bank, now);
        self.store.save()?;
        info!(racer_id, name, finish_position, races = record.total_races, "Racer updated");
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
