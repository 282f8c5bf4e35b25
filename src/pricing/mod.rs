//! Pricing engine: no-vig consensus, +EV, arbitrage and middles.
//!
//! Everything here is a pure function over merged rows. The engine holds
//! only immutable settings and the scoring-density model, so it can be
//! shared freely across refresh tasks.

pub mod arb;
pub mod consensus;
pub mod density;
pub mod ev;
pub mod middle;
pub mod odds;
pub mod sizing;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::types::{GameRow, OddsFormat, PropRow};
use arb::ArbBet;
use consensus::{game_groups, prop_group, OutcomeGroup};
use density::{NormalDensity, ScoringDensity};
use ev::EvBet;
use middle::MiddleBet;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub odds_format: OddsFormat,
    /// Books allowed to appear as an opportunity leg. `None` allows all.
    pub bookmakers: Option<HashSet<String>>,
    /// Books with synthetic prices. Never part of consensus.
    pub dfs_books: HashSet<String>,
    pub ev_threshold: f64,
    /// Price bounds for EV legs, always in American odds.
    pub ev_odds_min: Option<f64>,
    pub ev_odds_max: Option<f64>,
    pub arb_enabled: bool,
    pub arb_min_profit_pct: f64,
    pub middle_enabled: bool,
    pub middle_min_window: f64,
    pub middle_max_combined_cost: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            odds_format: OddsFormat::American,
            bookmakers: None,
            dfs_books: HashSet::new(),
            ev_threshold: 2.0,
            ev_odds_min: Some(-200.0),
            ev_odds_max: Some(200.0),
            arb_enabled: true,
            arb_min_profit_pct: 0.1,
            middle_enabled: true,
            middle_min_window: 0.5,
            middle_max_combined_cost: 1.08,
        }
    }
}

impl PricingConfig {
    pub fn allows_leg(&self, book: &str) -> bool {
        self.bookmakers
            .as_ref()
            .map_or(true, |books| books.contains(book))
    }

    /// Whether a quoted price, in the configured format, falls inside the
    /// American-odds bounds. Unusable prices never do.
    pub fn price_in_range(&self, price: f64) -> bool {
        let Some(american) = self.odds_format.to_american(price) else {
            return false;
        };
        self.ev_odds_min.map_or(true, |min| american >= min)
            && self.ev_odds_max.map_or(true, |max| american <= max)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Everything one pricing pass found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Opportunities {
    pub ev: Vec<EvBet>,
    pub arbs: Vec<ArbBet>,
    pub middles: Vec<MiddleBet>,
}

impl Opportunities {
    pub fn is_empty(&self) -> bool {
        self.ev.is_empty() && self.arbs.is_empty() && self.middles.is_empty()
    }

    fn sort(&mut self) {
        self.ev.sort_by(|a, b| b.ev_percent.total_cmp(&a.ev_percent));
        self.arbs.sort_by(|a, b| b.profit_percent.total_cmp(&a.profit_percent));
        self.middles.sort_by(|a, b| b.ev_percent.total_cmp(&a.ev_percent));
    }
}

pub struct PricingEngine {
    config: PricingConfig,
    density: Arc<dyn ScoringDensity>,
}

impl PricingEngine {
    pub fn new(config: PricingConfig, density: Arc<dyn ScoringDensity>) -> Self {
        Self { config, density }
    }

    pub fn with_default_density(config: PricingConfig) -> Self {
        Self::new(config, Arc::new(NormalDensity::default()))
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Price every pre-game row. Started games are skipped entirely.
    pub fn price_games(&self, rows: &[GameRow], now: DateTime<Utc>) -> Opportunities {
        let mut found = Opportunities::default();
        for row in rows.iter().filter(|r| r.pre_game) {
            let groups = game_groups(row);
            for group in &groups {
                self.price_group(group, now, &mut found);
            }
            if self.config.middle_enabled {
                found
                    .middles
                    .extend(middle::find_middles(&groups, &self.config, self.density.as_ref(), now));
            }
        }
        found.sort();
        debug!(
            rows = rows.len(),
            ev = found.ev.len(),
            arbs = found.arbs.len(),
            middles = found.middles.len(),
            "Priced game rows"
        );
        found
    }

    /// Price every pre-game prop row. Each (player, market, line) stands alone
    /// for EV and arbs; middles pair lines of the same player and market.
    pub fn price_props(&self, rows: &[PropRow], now: DateTime<Utc>) -> Opportunities {
        let mut found = Opportunities::default();
        let groups: Vec<OutcomeGroup> = rows.iter().filter(|r| r.pre_game).map(prop_group).collect();
        for group in &groups {
            self.price_group(group, now, &mut found);
        }
        if self.config.middle_enabled {
            found
                .middles
                .extend(middle::find_middles(&groups, &self.config, self.density.as_ref(), now));
        }
        found.sort();
        debug!(
            rows = rows.len(),
            ev = found.ev.len(),
            arbs = found.arbs.len(),
            middles = found.middles.len(),
            "Priced prop rows"
        );
        found
    }

    fn price_group(&self, group: &OutcomeGroup, now: DateTime<Utc>, found: &mut Opportunities) {
        found.ev.extend(ev::find_ev(group, &self.config, now));
        if self.config.arb_enabled {
            found.arbs.extend(arb::find_arbs(group, &self.config, now));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
