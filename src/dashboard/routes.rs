//! Query surface route handlers.
//!
//! All endpoints return JSON read from the engine's published snapshots.
//! Handlers never fetch upstream; the refresh endpoint only queues work for
//! the scheduler.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::engine::board::SportSnapshot;
use crate::engine::budget::BudgetSnapshot;
use crate::engine::cache::CacheStats;
use crate::engine::scheduler::RefreshTrigger;
use crate::engine::MarketEngine;
use crate::pricing::arb::ArbBet;
use crate::pricing::ev::EvBet;
use crate::pricing::middle::MiddleBet;
use crate::storage::RecordedBet;
use crate::types::{GameRow, PropRow};

/// Default lookback for `/api/history` without `since`.
const HISTORY_LOOKBACK_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct DashboardState {
    pub engine: Arc<MarketEngine>,
    /// Absent when the scheduler is not running.
    pub trigger: Option<RefreshTrigger>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(engine: Arc<MarketEngine>, trigger: Option<RefreshTrigger>) -> Self {
        Self {
            engine,
            trigger,
            started_at: Utc::now(),
        }
    }

    fn is_active(&self, sport: &str) -> bool {
        self.engine.sports().iter().any(|s| s == sport)
    }

    /// Snapshot for an active sport. An active sport with nothing published
    /// yet reads as an empty snapshot.
    fn snapshot(&self, sport: &str) -> Result<Arc<SportSnapshot>, Response> {
        if !self.is_active(sport) {
            return Err(error_response(
                StatusCode::NOT_FOUND,
                format!("unknown sport: {sport}"),
            ));
        }
        Ok(self.engine.snapshot(sport).unwrap_or_else(|| {
            Arc::new(SportSnapshot {
                sport: sport.to_string(),
                ..Default::default()
            })
        }))
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetResponse {
    #[serde(flatten)]
    pub budget: BudgetSnapshot,
    pub cache: CacheStats,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SportSummary {
    pub sport: String,
    pub games: usize,
    pub props: usize,
    pub ev: usize,
    pub arbs: usize,
    pub middles: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SportSummary {
    fn from_snapshot(sport: &str, snap: Option<&SportSnapshot>) -> Self {
        let Some(snap) = snap else {
            return Self {
                sport: sport.to_string(),
                games: 0,
                props: 0,
                ev: 0,
                arbs: 0,
                middles: 0,
                updated_at: None,
            };
        };
        let (g, p) = (&snap.game_opportunities, &snap.prop_opportunities);
        Self {
            sport: sport.to_string(),
            games: snap.games.len(),
            props: snap.props.len(),
            ev: g.ev.len() + p.ev.len(),
            arbs: g.arbs.len() + p.arbs.len(),
            middles: g.middles.len() + p.middles.len(),
            updated_at: snap.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// RFC 3339 lower bound, inclusive.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub sport: String,
    pub queued: bool,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/budget
pub async fn get_budget(State(state): State<AppState>) -> Json<BudgetResponse> {
    Json(BudgetResponse {
        budget: state.engine.budget(),
        cache: state.engine.cache_stats(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// GET /api/sports
pub async fn get_sports(State(state): State<AppState>) -> Json<Vec<SportSummary>> {
    let summaries = state
        .engine
        .sports()
        .iter()
        .map(|sport| SportSummary::from_snapshot(sport, state.engine.snapshot(sport).as_deref()))
        .collect();
    Json(summaries)
}

/// GET /api/sports/:sport/games
pub async fn get_games(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> Result<Json<Vec<GameRow>>, Response> {
    let snap = state.snapshot(&sport)?;
    Ok(Json(snap.games.clone()))
}

/// GET /api/sports/:sport/props
pub async fn get_props(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> Result<Json<Vec<PropRow>>, Response> {
    let snap = state.snapshot(&sport)?;
    Ok(Json(snap.props.clone()))
}

/// GET /api/sports/:sport/ev
pub async fn get_ev(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> Result<Json<Vec<EvBet>>, Response> {
    let snap = state.snapshot(&sport)?;
    Ok(Json(snap.ev_bets()))
}

/// GET /api/sports/:sport/arbs
pub async fn get_arbs(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> Result<Json<Vec<ArbBet>>, Response> {
    let snap = state.snapshot(&sport)?;
    let mut arbs: Vec<ArbBet> = snap
        .game_opportunities
        .arbs
        .iter()
        .chain(&snap.prop_opportunities.arbs)
        .cloned()
        .collect();
    arbs.sort_by(|a, b| b.profit_percent.total_cmp(&a.profit_percent));
    Ok(Json(arbs))
}

/// GET /api/sports/:sport/middles
pub async fn get_middles(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> Result<Json<Vec<MiddleBet>>, Response> {
    let snap = state.snapshot(&sport)?;
    let mut middles: Vec<MiddleBet> = snap
        .game_opportunities
        .middles
        .iter()
        .chain(&snap.prop_opportunities.middles)
        .cloned()
        .collect();
    middles.sort_by(|a, b| b.ev_percent.total_cmp(&a.ev_percent));
    Ok(Json(middles))
}

/// GET /api/history?since=<rfc3339>
pub async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<RecordedBet>>, Response> {
    let since = params
        .since
        .unwrap_or_else(|| Utc::now() - Duration::hours(HISTORY_LOOKBACK_HOURS));
    match state.engine.history().recent(since).await {
        Ok(rows) => Ok(Json(rows)),
        Err(e) => {
            error!(error = %e, "History query failed");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// POST /api/sports/:sport/refresh
pub async fn post_refresh(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> Response {
    if !state.is_active(&sport) {
        return error_response(StatusCode::NOT_FOUND, format!("unknown sport: {sport}"));
    }
    let Some(trigger) = &state.trigger else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "refresh scheduler is not running".into(),
        );
    };
    if !trigger.request(&sport) {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "refresh queue is full".into(),
        );
    }
    info!(sport = %sport, "Force refresh queued");
    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse { sport, queued: true }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
