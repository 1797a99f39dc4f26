//! Dashboard API route handlers.
//!
//! Every handler reads the ledger file fresh, so the dashboard always shows
//! what the last batch job persisted and never writes anything itself.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use crate::config::AppConfig;
use crate::engine::accountant::render_report;
use crate::storage::{load_state, LedgerState, RiskControl, Statistics};
use crate::types::{BacktestResult, BetRecord};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Where the dashboard finds the ledger.
pub struct DashboardState {
    pub state_file: PathBuf,
    /// Shown when no ledger has been written yet.
    pub initial_bankroll: i64,
    /// Limits shown when no ledger has been written yet.
    pub risk_control: RiskControl,
}

impl DashboardState {
    pub fn new(state_file: impl Into<PathBuf>, initial_bankroll: i64) -> Self {
        Self {
            state_file: state_file.into(),
            initial_bankroll,
            risk_control: RiskControl::default(),
        }
    }

    /// Dashboard over the configured ledger. Fails when `[dashboard]` is
    /// disabled.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        if !config.dashboard.enabled {
            anyhow::bail!("dashboard is disabled; set [dashboard] enabled = true to serve it");
        }
        Ok(Self {
            risk_control: config.risk.risk_control(),
            ..Self::new(&config.ledger.state_file, config.ledger.initial_bankroll)
        })
    }

    async fn snapshot(&self) -> Result<LedgerState, StatusCode> {
        let path = self.state_file.clone();
        let initial = self.initial_bankroll;
        let limits = self.risk_control.clone();
        tokio::task::spawn_blocking(move || {
            load_state(&path).unwrap_or_else(|| LedgerState::new(initial, limits))
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Ledger read task failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub current_bankroll: i64,
    pub initial_bankroll: i64,
    pub profit: i64,
    pub win_rate: rust_decimal::Decimal,
    pub unsettled_bets: usize,
    pub statistics: Statistics,
    pub risk_control: RiskControl,
}

impl StatusResponse {
    fn from_state(state: &LedgerState) -> Self {
        let risk = state.risk_control();
        let stats = state.statistics();
        let status = if risk.is_stopped_today {
            "STOPPED"
        } else if stats.current_losing_streak >= 2 {
            "CAUTION"
        } else {
            "RUNNING"
        };
        Self {
            status: status.to_string(),
            current_bankroll: state.current_amount(),
            initial_bankroll: state.bankroll().initial_amount,
            profit: state.profit(),
            win_rate: stats.win_rate(),
            unsettled_bets: state.unsettled_bets().count(),
            statistics: stats.clone(),
            risk_control: risk.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BetsQuery {
    pub limit: Option<usize>,
}

const DEFAULT_BET_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(app): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let state = app.snapshot().await?;
    Ok(Json(StatusResponse::from_state(&state)))
}

/// GET /api/bets?limit=n
///
/// Most recent first.
pub async fn get_bets(
    State(app): State<AppState>,
    Query(query): Query<BetsQuery>,
) -> Result<Json<Vec<BetRecord>>, StatusCode> {
    let state = app.snapshot().await?;
    let limit = query.limit.unwrap_or(DEFAULT_BET_LIMIT);
    Ok(Json(
        state.bet_history().iter().rev().take(limit).cloned().collect(),
    ))
}

/// GET /api/backtests
pub async fn get_backtests(
    State(app): State<AppState>,
) -> Result<Json<Vec<BacktestResult>>, StatusCode> {
    let state = app.snapshot().await?;
    Ok(Json(state.backtest_results().to_vec()))
}

/// GET /api/report
pub async fn get_report(State(app): State<AppState>) -> Result<String, StatusCode> {
    let state = app.snapshot().await?;
    Ok(render_report(&state))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
