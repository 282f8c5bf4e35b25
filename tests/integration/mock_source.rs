//! Mock quote source for integration testing.
//!
//! Provides a deterministic `QuoteSource` implementation that serves
//! canned events, scores and props from memory, meters every paid call
//! against a credit balance, and records how it was called.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use sharpline::data::{CreditReport, FeedError, Metered, OddsQuery, QuoteSource};
use sharpline::engine::budget::{BudgetThresholds, ConsumptionBudget};
use sharpline::engine::cache::{CacheTtls, FreshnessCache};
use sharpline::engine::merger::PriceOverrides;
use sharpline::engine::orchestrator::{FetchOrchestrator, OrchestratorSettings};
use sharpline::engine::MarketEngine;
use sharpline::pricing::{PricingConfig, PricingEngine};
use sharpline::storage::HistoryStore;
use sharpline::types::*;

pub const NBA: &str = "basketball_nba";

/// A mock quote source with fully controllable responses.
pub struct MockSource {
    odds: Mutex<Vec<Event>>,
    scores: Mutex<Vec<Score>>,
    props: Mutex<HashMap<String, Event>>,
    remaining: Mutex<u32>,
    used: Mutex<u32>,
    calls: Mutex<HashMap<&'static str, usize>>,
    /// Per-event calls for these ids fail.
    failing_events: Mutex<HashSet<String>>,
    /// If set, every call returns this upstream status.
    force_error: Mutex<Option<u16>>,
    /// If set, `odds` waits for a notification before answering.
    gate: Mutex<Option<Arc<Notify>>>,
    per_event_delay: Mutex<std::time::Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockSource {
    pub fn new(remaining: u32) -> Self {
        Self {
            odds: Mutex::new(Vec::new()),
            scores: Mutex::new(Vec::new()),
            props: Mutex::new(HashMap::new()),
            remaining: Mutex::new(remaining),
            used: Mutex::new(0),
            calls: Mutex::new(HashMap::new()),
            failing_events: Mutex::new(HashSet::new()),
            force_error: Mutex::new(None),
            gate: Mutex::new(None),
            per_event_delay: Mutex::new(std::time::Duration::ZERO),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn set_odds(&self, events: Vec<Event>) {
        *self.odds.lock().unwrap() = events;
    }

    pub fn set_scores(&self, scores: Vec<Score>) {
        *self.scores.lock().unwrap() = scores;
    }

    /// Props for one event. The event also appears in the events listing.
    pub fn add_props(&self, event: Event) {
        self.props.lock().unwrap().insert(event.id.clone(), event);
    }

    pub fn fail_event(&self, event_id: &str) {
        self.failing_events.lock().unwrap().insert(event_id.to_string());
    }

    pub fn set_error(&self, status: u16) {
        *self.force_error.lock().unwrap() = Some(status);
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Hold `odds` calls until the returned handle is notified.
    pub fn gate_odds(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn set_per_event_delay(&self, delay: std::time::Duration) {
        *self.per_event_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_paid_calls(&self) -> usize {
        ["odds", "scores", "event_odds"]
            .iter()
            .map(|e| self.calls(e))
            .sum()
    }

    /// Most per-event calls ever outstanding at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record_call(&self, endpoint: &'static str) -> Result<(), FeedError> {
        *self.calls.lock().unwrap().entry(endpoint).or_insert(0) += 1;
        match *self.force_error.lock().unwrap() {
            Some(status) => Err(FeedError::Upstream {
                status,
                message: "forced".into(),
            }),
            None => Ok(()),
        }
    }

    /// Charge one credit and report the balance.
    fn charge(&self) -> CreditReport {
        let mut remaining = self.remaining.lock().unwrap();
        let mut used = self.used.lock().unwrap();
        *remaining = remaining.saturating_sub(1);
        *used += 1;
        CreditReport::new(*remaining, *used)
    }

    fn listing(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.odds.lock().unwrap().clone();
        for event in self.props.lock().unwrap().values() {
            if !events.iter().any(|e| e.id == event.id) {
                events.push(event.clone());
            }
        }
        events
            .into_iter()
            .map(|e| Event { bookmakers: Vec::new(), ..e })
            .collect()
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    async fn sports(&self) -> Result<Metered<Vec<Sport>>, FeedError> {
        self.record_call("sports")?;
        Ok(Metered::free(vec![Sport {
            key: NBA.into(),
            group: "Basketball".into(),
            title: "NBA".into(),
            description: "US Basketball".into(),
            active: true,
            has_outrights: false,
        }]))
    }

    async fn events(&self, _sport: &str) -> Result<Metered<Vec<Event>>, FeedError> {
        self.record_call("events")?;
        Ok(Metered::free(self.listing()))
    }

    async fn scores(&self, _sport: &str) -> Result<Metered<Vec<Score>>, FeedError> {
        self.record_call("scores")?;
        let credits = self.charge();
        Ok(Metered::new(self.scores.lock().unwrap().clone(), credits))
    }

    async fn odds(&self, _sport: &str, _query: &OddsQuery) -> Result<Metered<Vec<Event>>, FeedError> {
        self.record_call("odds")?;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let credits = self.charge();
        Ok(Metered::new(self.odds.lock().unwrap().clone(), credits))
    }

    async fn event_odds(
        &self,
        _sport: &str,
        event_id: &str,
        _query: &OddsQuery,
    ) -> Result<Metered<Event>, FeedError> {
        self.record_call("event_odds")?;

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let delay = *self.per_event_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing_events.lock().unwrap().contains(event_id) {
            return Err(FeedError::Malformed(format!("bad payload for {event_id}")));
        }
        let event = self
            .props
            .lock()
            .unwrap()
            .get(event_id)
            .cloned()
            .ok_or_else(|| FeedError::Upstream {
                status: 404,
                message: format!("no event {event_id}"),
            })?;
        let credits = self.charge();
        Ok(Metered::new(event, credits))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn starts_in(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}

pub fn quote(name: &str, price: f64, point: Option<f64>) -> OutcomeQuote {
    OutcomeQuote {
        name: name.into(),
        price,
        point,
        description: None,
    }
}

pub fn player_quote(name: &str, player: &str, price: f64, point: f64) -> OutcomeQuote {
    OutcomeQuote {
        name: name.into(),
        price,
        point: Some(point),
        description: Some(player.into()),
    }
}

pub fn book(key: &str, markets: Vec<(&str, Vec<OutcomeQuote>)>) -> Bookmaker {
    Bookmaker {
        key: key.into(),
        title: key.to_uppercase(),
        last_update: None,
        markets: markets
            .into_iter()
            .map(|(k, outcomes)| MarketQuotes {
                key: k.into(),
                last_update: None,
                outcomes,
            })
            .collect(),
    }
}

pub fn event(id: &str, home: &str, away: &str, commence: DateTime<Utc>, bookmakers: Vec<Bookmaker>) -> Event {
    Event {
        id: id.into(),
        sport_key: NBA.into(),
        sport_title: "NBA".into(),
        commence_time: commence,
        home_team: home.into(),
        away_team: away.into(),
        bookmakers,
    }
}

pub fn h2h_book(key: &str, home: (&str, f64), away: (&str, f64)) -> Bookmaker {
    book(key, vec![("h2h", vec![quote(home.0, home.1, None), quote(away.0, away.1, None)])])
}

/// Three sharp books at -110/-110 plus one soft book.
pub fn ev_event(id: &str, soft_home: f64, soft_away: f64) -> Event {
    event(
        id,
        "Lakers",
        "Celtics",
        starts_in(3),
        vec![
            h2h_book("sharp1", ("Lakers", -110.0), ("Celtics", -110.0)),
            h2h_book("sharp2", ("Lakers", -110.0), ("Celtics", -110.0)),
            h2h_book("sharp3", ("Lakers", -110.0), ("Celtics", -110.0)),
            h2h_book("soft", ("Lakers", soft_home), ("Celtics", soft_away)),
        ],
    )
}

/// An event whose props every sharp book quotes identically.
pub fn props_event(id: &str, player: &str) -> Event {
    let sharp = |key: &str| {
        book(
            key,
            vec![(
                "player_points",
                vec![
                    player_quote("Over", player, -110.0, 25.5),
                    player_quote("Under", player, -110.0, 25.5),
                ],
            )],
        )
    };
    event(
        id,
        "Lakers",
        "Celtics",
        starts_in(4),
        vec![sharp("sharp1"), sharp("sharp2"), sharp("sharp3")],
    )
}

// ---------------------------------------------------------------------------
// Engine harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub props_enabled: bool,
    pub max_concurrent: usize,
    pub pricing: PricingConfig,
    pub overrides: HashMap<String, f64>,
    pub thresholds: BudgetThresholds,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            props_enabled: true,
            max_concurrent: 5,
            pricing: PricingConfig {
                bookmakers: None,
                ..PricingConfig::default()
            },
            overrides: HashMap::new(),
            thresholds: BudgetThresholds::default(),
        }
    }
}

impl Harness {
    pub fn build(self, source: Arc<MockSource>, history: Arc<dyn HistoryStore>) -> Arc<MarketEngine> {
        let mut props_markets = HashMap::new();
        props_markets.insert(NBA.to_string(), vec!["player_points".to_string()]);

        let orchestrator = FetchOrchestrator::new(
            source,
            Arc::new(FreshnessCache::new(CacheTtls::default())),
            Arc::new(ConsumptionBudget::new(self.thresholds)),
            OrchestratorSettings {
                query: OddsQuery {
                    regions: vec!["us".into()],
                    markets: vec!["h2h".into(), "spreads".into(), "totals".into()],
                    odds_format: OddsFormat::American,
                },
                props_markets,
                props_enabled: self.props_enabled,
                alt_lines_enabled: false,
                max_concurrent: self.max_concurrent,
            },
        );
        let mut pricing = self.pricing;
        pricing.dfs_books = self.overrides.keys().cloned().collect();

        Arc::new(MarketEngine::new(
            orchestrator,
            PricingEngine::with_default_density(pricing),
            PriceOverrides::new(self.overrides),
            history,
            vec![NBA.to_string()],
        ))
    }
}
