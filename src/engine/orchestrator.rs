//! Fetch orchestrator.
//!
//! One `refresh(sport, kind)` call is one refresh cycle:
//!
//! 1. coalesce: if the same (sport, kind) is already in flight, do nothing
//! 2. cache: if the cached entry is still fresh, skip
//! 3. budget: if the kind is blocked, skip
//! 4. fetch; on success update cache and budget, on failure touch neither
//!
//! Cache entries are stamped with the cycle's start time, so fetch latency
//! never pushes an entry's expiry past the next scheduled tick.
//!
//! Props and alternate lines are per-event: one upstream call per upcoming
//! event, run concurrently under a fixed limit. A failed event is dropped
//! from the cycle without affecting the others.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

use super::budget::ConsumptionBudget;
use super::cache::{CacheKey, FreshnessCache, Payload};
use crate::data::{CreditReport, FeedError, OddsQuery, QuoteSource};
use crate::types::{DataKind, Event, Sport};

/// Markets requested for the alternate-lines cycle.
pub const ALT_LINE_MARKETS: &[&str] = &["alternate_spreads", "alternate_totals"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Regions, featured markets and odds format for the bulk odds call.
    pub query: OddsQuery,
    pub props_markets: HashMap<String, Vec<String>>,
    pub props_enabled: bool,
    pub alt_lines_enabled: bool,
    /// Upper bound on outstanding per-event calls.
    pub max_concurrent: usize,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Cached data is still within its TTL.
    Fresh,
    /// The budget does not allow this kind right now.
    BudgetExhausted,
    /// Another refresh of the same (sport, kind) is outstanding.
    InFlight,
    /// The kind is switched off (or has nothing to fetch) for this sport.
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Fresh => "fresh",
            SkipReason::BudgetExhausted => "budget exhausted",
            SkipReason::InFlight => "in flight",
            SkipReason::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum RefreshOutcome {
    /// New data is in the cache. `failed` counts dropped per-event calls.
    Updated { records: usize, failed: usize },
    Skipped(SkipReason),
    Failed(FeedError),
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, RefreshOutcome::Updated { .. })
    }
}

/// Result of an upstream fetch that did not error.
enum Fetched {
    Data { payload: Payload, credits: CreditReport, failed: usize },
    /// Nothing was issued because the budget closed mid-cycle.
    Blocked,
}

/// Removes the key from the in-flight set when the cycle ends, however it ends.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<CacheKey>>,
    key: CacheKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct FetchOrchestrator {
    source: Arc<dyn QuoteSource>,
    cache: Arc<FreshnessCache>,
    budget: Arc<ConsumptionBudget>,
    settings: OrchestratorSettings,
    in_flight: Mutex<HashSet<CacheKey>>,
    sports: OnceCell<Vec<Sport>>,
}

impl FetchOrchestrator {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        cache: Arc<FreshnessCache>,
        budget: Arc<ConsumptionBudget>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            source,
            cache,
            budget,
            settings,
            in_flight: Mutex::new(HashSet::new()),
            sports: OnceCell::new(),
        }
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    pub fn budget(&self) -> &ConsumptionBudget {
        &self.budget
    }

    /// Claim the (sport, kind) slot. `None` when it is already taken.
    fn begin(&self, sport: &str, kind: DataKind) -> Option<InFlightGuard<'_>> {
        let key = CacheKey::new(sport, kind);
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard { set: &self.in_flight, key })
    }

    pub fn is_in_flight(&self, sport: &str, kind: DataKind) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&CacheKey::new(sport, kind))
    }

    fn per_event_markets(&self, sport: &str, kind: DataKind) -> Vec<String> {
        match kind {
            DataKind::Props if self.settings.props_enabled => self
                .settings
                .props_markets
                .get(sport)
                .cloned()
                .unwrap_or_default(),
            DataKind::AltLines if self.settings.alt_lines_enabled => {
                ALT_LINE_MARKETS.iter().map(|m| m.to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Run one refresh cycle for (sport, kind).
    pub async fn refresh(&self, sport: &str, kind: DataKind) -> RefreshOutcome {
        let Some(_guard) = self.begin(sport, kind) else {
            debug!(sport, %kind, "Refresh already in flight, coalesced");
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        };

        if kind.is_per_event() && self.per_event_markets(sport, kind).is_empty() {
            return RefreshOutcome::Skipped(SkipReason::Disabled);
        }

        if self.cache.get(sport, kind).is_some() {
            debug!(sport, %kind, "Cache fresh, skipping fetch");
            return RefreshOutcome::Skipped(SkipReason::Fresh);
        }

        if !self.budget.can_fetch(kind) {
            debug!(sport, %kind, remaining = ?self.budget.remaining(), "Budget blocks fetch");
            return RefreshOutcome::Skipped(SkipReason::BudgetExhausted);
        }

        let started = Instant::now();
        match self.fetch(sport, kind).await {
            Ok(Fetched::Data { payload, credits, failed }) => {
                let records = payload.len();
                self.cache.put_at(sport, kind, payload, started);
                self.budget.record(credits);
                info!(
                    sport,
                    %kind,
                    records,
                    failed,
                    remaining = ?self.budget.remaining(),
                    "Refresh complete"
                );
                RefreshOutcome::Updated { records, failed }
            }
            Ok(Fetched::Blocked) => RefreshOutcome::Skipped(SkipReason::BudgetExhausted),
            Err(e) => {
                warn!(sport, %kind, error = %e, "Refresh failed, keeping cached data");
                RefreshOutcome::Failed(e)
            }
        }
    }

    async fn fetch(&self, sport: &str, kind: DataKind) -> Result<Fetched, FeedError> {
        match kind {
            DataKind::Odds => {
                let resp = self.source.odds(sport, &self.settings.query).await?;
                Ok(Fetched::Data {
                    payload: Payload::Events(Arc::new(resp.data)),
                    credits: resp.credits,
                    failed: 0,
                })
            }
            DataKind::Scores => {
                let resp = self.source.scores(sport).await?;
                Ok(Fetched::Data {
                    payload: Payload::Scores(Arc::new(resp.data)),
                    credits: resp.credits,
                    failed: 0,
                })
            }
            DataKind::Props | DataKind::AltLines => self.fetch_per_event(sport, kind).await,
        }
    }

    /// Fan out one call per upcoming event, at most `max_concurrent` at once.
    async fn fetch_per_event(&self, sport: &str, kind: DataKind) -> Result<Fetched, FeedError> {
        let listing = self.source.events(sport).await?;
        self.budget.record(listing.credits);

        let now = Utc::now();
        let event_ids: Vec<String> = listing
            .data
            .into_iter()
            .filter(|e| !e.has_started(now))
            .map(|e| e.id)
            .collect();

        let query = self.settings.query.with_markets(&self.per_event_markets(sport, kind));
        let limit = self.settings.max_concurrent.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        debug!(sport, %kind, events = event_ids.len(), limit, "Fetching per-event data");

        let results: Vec<(String, Result<Option<Event>, FeedError>)> = stream::iter(event_ids)
            .map(|event_id| {
                let semaphore = Arc::clone(&semaphore);
                let query = &query;
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    // Checked before every call, not once per cycle.
                    if !self.budget.can_fetch(kind) {
                        return (event_id, Ok(None));
                    }
                    let resp = match kind {
                        DataKind::Props => self.source.event_props(sport, &event_id, query).await,
                        _ => self.source.event_odds(sport, &event_id, query).await,
                    };
                    let result = resp.map(|m| {
                        self.budget.record(m.credits);
                        Some(m.data)
                    });
                    (event_id, result)
                }
            })
            // Allow some buffering, the semaphore is the real limit.
            .buffer_unordered(limit * 2)
            .collect()
            .await;

        let attempted = results.len();
        let mut events = Vec::new();
        let mut failed = 0;
        let mut blocked = 0;
        let mut last_error = None;

        for (event_id, result) in results {
            match result {
                Ok(Some(event)) => events.push(event),
                Ok(None) => blocked += 1,
                Err(e) => {
                    warn!(sport, %kind, event_id = %event_id, error = %e, "Dropping event from cycle");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if events.is_empty() && attempted > 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
            if blocked > 0 {
                return Ok(Fetched::Blocked);
            }
        }

        Ok(Fetched::Data {
            payload: Payload::Events(Arc::new(events)),
            credits: CreditReport {
                remaining: self.budget.remaining(),
                used: self.budget.used(),
            },
            failed,
        })
    }

    /// Expire every cached entry for a sport so the next cycles refetch.
    /// The old payloads stay readable until new data replaces them.
    pub fn invalidate(&self, sport: &str) -> usize {
        let expired = self.cache.invalidate(sport);
        debug!(sport, expired, "Cache invalidated");
        expired
    }

    /// The provider's sports list. Fetched on first use, then fixed.
    pub async fn load_sports(&self) -> Result<&[Sport], FeedError> {
        let sports = self
            .sports
            .get_or_try_init(|| async {
                let resp = self.source.sports().await?;
                self.budget.record(resp.credits);
                info!(count = resp.data.len(), "Loaded sports list");
                Ok::<_, FeedError>(resp.data)
            })
            .await?;
        Ok(sports.as_slice())
    }

    /// Configured sports the provider actually offers. Unknown keys are
    /// logged and dropped. If the list cannot be loaded, all are kept.
    pub async fn resolve_sports(&self, configured: &[String]) -> Vec<String> {
        let known = match self.load_sports().await {
            Ok(sports) => sports,
            Err(e) => {
                warn!(error = %e, "Could not load sports list, using configured sports as-is");
                return configured.to_vec();
            }
        };

        configured
            .iter()
            .filter(|key| {
                let found = known.iter().any(|s| &s.key == *key);
                if !found {
                    warn!(sport = %key, "Unknown sport in config, skipping");
                }
                found
            })
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
