//! No-vig consensus pricing.
//!
//! Splits merged rows into outcome groups (mutually exclusive outcomes at a
//! single line of a single market), averages each outcome's implied
//! probability across books, and normalizes the averages so the group sums
//! to 1.0. The result is the market's fair price with the aggregate vig
//! removed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::types::{GameRow, OddsFormat, PropRow};

/// Fewer contributing books than this and an outcome has no consensus.
pub const MIN_CONSENSUS_BOOKS: usize = 3;

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Broad market family. Decides how lines pair up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Moneyline,
    Spread,
    Total,
    PlayerProp,
}

impl MarketKind {
    /// Classify a game market key. Anything else is not a game market.
    pub fn for_game_market(key: &str) -> Option<Self> {
        match key {
            "h2h" => Some(MarketKind::Moneyline),
            "spreads" | "alternate_spreads" => Some(MarketKind::Spread),
            "totals" | "alternate_totals" => Some(MarketKind::Total),
            _ => None,
        }
    }
}

/// One book's quote inside an outcome group.
#[derive(Debug, Clone, PartialEq)]
pub struct BookQuote {
    pub book: String,
    pub title: String,
    pub price: f64,
    pub point: Option<f64>,
}

/// Mutually exclusive outcomes at one line of one market.
#[derive(Debug, Clone)]
pub struct OutcomeGroup {
    pub sport_key: String,
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub market: String,
    pub kind: MarketKind,
    /// Total, prop line, or the home side's spread.
    pub line: Option<f64>,
    pub player: Option<String>,
    pub outcomes: BTreeMap<String, Vec<BookQuote>>,
}

impl OutcomeGroup {
    pub fn is_prop(&self) -> bool {
        self.kind == MarketKind::PlayerProp
    }

    fn push(&mut self, outcome: &str, quote: BookQuote) {
        let quotes = self.outcomes.entry(outcome.to_string()).or_default();
        // One quote per book per outcome.
        if !quotes.iter().any(|q| q.book == quote.book) {
            quotes.push(quote);
        }
    }
}

/// Lines as integer hundredths so they can key a map.
fn line_key(point: Option<f64>) -> Option<i64> {
    point.map(|p| (p * 100.0).round() as i64)
}

/// Split a game row into outcome groups, one per (market, line).
pub fn game_groups(row: &GameRow) -> Vec<OutcomeGroup> {
    let mut groups: BTreeMap<(String, Option<i64>), OutcomeGroup> = BTreeMap::new();

    for book in &row.bookmakers {
        for market in &book.markets {
            let Some(kind) = MarketKind::for_game_market(&market.key) else {
                continue;
            };
            for outcome in &market.outcomes {
                let line = match kind {
                    MarketKind::Moneyline => None,
                    // Key both sides of a spread by the home team's number.
                    MarketKind::Spread if outcome.name == row.away_team => outcome.point.map(|p| -p),
                    _ => outcome.point,
                };
                if kind != MarketKind::Moneyline && line.is_none() {
                    continue;
                }

                let group = groups
                    .entry((market.key.clone(), line_key(line)))
                    .or_insert_with(|| OutcomeGroup {
                        sport_key: row.sport_key.clone(),
                        event_id: row.event_id.clone(),
                        home_team: row.home_team.clone(),
                        away_team: row.away_team.clone(),
                        commence_time: row.commence_time,
                        market: market.key.clone(),
                        kind,
                        line,
                        player: None,
                        outcomes: BTreeMap::new(),
                    });
                group.push(
                    &outcome.name,
                    BookQuote {
                        book: book.key.clone(),
                        title: book.title.clone(),
                        price: outcome.price,
                        point: outcome.point,
                    },
                );
            }
        }
    }

    groups.into_values().collect()
}

/// A prop row is already one (player, market, line): Over vs Under.
pub fn prop_group(row: &PropRow) -> OutcomeGroup {
    let mut outcomes = BTreeMap::new();
    for (side, prices) in [("Over", &row.over), ("Under", &row.under)] {
        if prices.is_empty() {
            continue;
        }
        let quotes = prices
            .iter()
            .map(|(book, bp)| BookQuote {
                book: book.clone(),
                title: bp.title.clone(),
                price: bp.price,
                point: row.line,
            })
            .collect();
        outcomes.insert(side.to_string(), quotes);
    }

    OutcomeGroup {
        sport_key: row.sport_key.clone(),
        event_id: row.event_id.clone(),
        home_team: row.home_team.clone(),
        away_team: row.away_team.clone(),
        commence_time: row.commence_time,
        market: row.market.clone(),
        kind: MarketKind::PlayerProp,
        line: row.line,
        player: Some(row.player.clone()),
        outcomes,
    }
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Derived fair probability for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusPrice {
    pub outcome: String,
    pub fair_probability: f64,
    pub fair_price: Option<f64>,
    pub books: usize,
}

/// Normalize probabilities so they sum to 1.
pub fn remove_vig(probs: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = probs.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(probs.iter().map(|p| p / total).collect())
}

/// Market-average no-vig probabilities for every outcome of a group.
///
/// Books in `excluded` (synthetic DFS prices) never contribute. If any
/// outcome falls short of `MIN_CONSENSUS_BOOKS`, the whole group has no
/// consensus because the normalizing vector would be incomplete.
pub fn consensus(
    group: &OutcomeGroup,
    format: OddsFormat,
    excluded: &HashSet<String>,
) -> Option<Vec<ConsensusPrice>> {
    if group.outcomes.len() < 2 {
        return None;
    }

    let mut names = Vec::with_capacity(group.outcomes.len());
    let mut averages = Vec::with_capacity(group.outcomes.len());
    let mut counts = Vec::with_capacity(group.outcomes.len());

    for (name, quotes) in &group.outcomes {
        let probs: Vec<f64> = quotes
            .iter()
            .filter(|q| !excluded.contains(&q.book))
            .filter_map(|q| format.implied_probability(q.price))
            .collect();
        if probs.len() < MIN_CONSENSUS_BOOKS {
            return None;
        }
        names.push(name.clone());
        averages.push(probs.iter().sum::<f64>() / probs.len() as f64);
        counts.push(probs.len());
    }

    let fair = remove_vig(&averages)?;

    Some(
        names
            .into_iter()
            .zip(fair)
            .zip(counts)
            .map(|((outcome, fair_probability), books)| ConsensusPrice {
                outcome,
                fair_probability,
                fair_price: format.price_for_probability(fair_probability),
                books,
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
