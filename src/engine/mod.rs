//! Market engine: refresh -> merge -> price -> publish -> record.
//!
//! Owns the fetch orchestrator, the pricing engine, the published board
//! and the history store. Every successful refresh rebuilds the sport's
//! snapshot from the cache; skips and failures leave the board untouched.
//! Rebuilds of one sport run one at a time, so a rebuild that read older
//! cache contents can never publish over a newer one.

pub mod board;
pub mod budget;
pub mod cache;
pub mod merger;
pub mod orchestrator;
pub mod scheduler;

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::pricing::ev::EvBet;
use crate::pricing::PricingEngine;
use crate::storage::HistoryStore;
use crate::types::{DataKind, Event, Score};
use board::{Board, SportSnapshot};
use budget::BudgetSnapshot;
use cache::CacheStats;
use merger::PriceOverrides;
use orchestrator::{FetchOrchestrator, RefreshOutcome};

pub struct MarketEngine {
    orchestrator: FetchOrchestrator,
    pricing: PricingEngine,
    overrides: PriceOverrides,
    board: Board,
    history: Arc<dyn HistoryStore>,
    sports: RwLock<Vec<String>>,
    /// Held from the cache read through publish.
    rebuild_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MarketEngine {
    pub fn new(
        orchestrator: FetchOrchestrator,
        pricing: PricingEngine,
        overrides: PriceOverrides,
        history: Arc<dyn HistoryStore>,
        sports: Vec<String>,
    ) -> Self {
        Self {
            orchestrator,
            pricing,
            overrides,
            board: Board::new(),
            history,
            sports: RwLock::new(sports),
            rebuild_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Narrow the configured sports to those the provider offers.
    pub async fn load_sports(&self) -> Vec<String> {
        let configured = self.sports();
        let resolved = self.orchestrator.resolve_sports(&configured).await;
        *self.sports.write().unwrap_or_else(|e| e.into_inner()) = resolved.clone();
        info!(sports = ?resolved, "Active sports");
        resolved
    }

    pub fn sports(&self) -> Vec<String> {
        self.sports.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn snapshot(&self, sport: &str) -> Option<Arc<SportSnapshot>> {
        self.board.get(sport)
    }

    pub fn budget(&self) -> BudgetSnapshot {
        self.orchestrator.budget().snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.orchestrator.cache().stats()
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Run one refresh cycle and, if it produced data, rebuild the sport.
    pub async fn refresh(&self, sport: &str, kind: DataKind) -> RefreshOutcome {
        let outcome = self.orchestrator.refresh(sport, kind).await;
        if outcome.is_updated() {
            self.rebuild(sport, kind).await;
        }
        outcome
    }

    /// Expire the sport's cache and rerun every cycle for it. Cycles
    /// already in flight are coalesced, not restarted. A cycle that fails
    /// leaves its previous data on the board.
    pub async fn force_refresh(&self, sport: &str) -> Vec<(DataKind, RefreshOutcome)> {
        self.orchestrator.invalidate(sport);
        info!(sport, "Force refresh");
        let runs = DataKind::ALL.iter().map(|kind| async move {
            (*kind, self.refresh(sport, *kind).await)
        });
        join_all(runs).await
    }

    fn cached_events(&self, sport: &str, kind: DataKind) -> Arc<Vec<Event>> {
        self.orchestrator
            .cache()
            .last_known(sport, kind)
            .and_then(|p| p.events())
            .unwrap_or_default()
    }

    fn cached_scores(&self, sport: &str) -> Arc<Vec<Score>> {
        self.orchestrator
            .cache()
            .last_known(sport, DataKind::Scores)
            .and_then(|p| p.scores())
            .unwrap_or_default()
    }

    async fn lock_rebuild(&self, sport: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.rebuild_locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(sport.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Rebuild and publish the sport's snapshot from whatever is cached.
    pub async fn rebuild(&self, sport: &str, updated: DataKind) {
        let guard = self.lock_rebuild(sport).await;
        let now = Utc::now();
        let odds = self.cached_events(sport, DataKind::Odds);
        let alt = self.cached_events(sport, DataKind::AltLines);
        let prop_events = self.cached_events(sport, DataKind::Props);
        let scores = self.cached_scores(sport);

        let events = merger::merge_alt_lines(&odds, &alt);
        let games = merger::merge_games(&events, &scores, &self.overrides, now);
        let props = merger::merge_props(&prop_events, &scores, &self.overrides, now);

        let game_opportunities = self.pricing.price_games(&games, now);
        let prop_opportunities = self.pricing.price_props(&props, now);

        debug!(
            sport,
            kind = %updated,
            games = games.len(),
            props = props.len(),
            ev = game_opportunities.ev.len() + prop_opportunities.ev.len(),
            "Rebuilt snapshot"
        );

        // Only newly fetched quotes produce new history rows.
        let (to_record, is_prop): (Vec<EvBet>, bool) = match updated {
            DataKind::Odds | DataKind::AltLines => (game_opportunities.ev.clone(), false),
            DataKind::Props => (prop_opportunities.ev.clone(), true),
            DataKind::Scores => (Vec::new(), false),
        };

        self.board.publish(SportSnapshot {
            sport: sport.to_string(),
            games,
            props,
            game_opportunities,
            prop_opportunities,
            updated_at: Some(now),
        });
        drop(guard);

        for bet in &to_record {
            if let Err(e) = self.history.record(bet, is_prop, now).await {
                warn!(sport, error = %e, "Failed to record EV bet");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
