//! Record merger.
//!
//! Pure functions from cached feed records to the canonical rows the
//! pricing engine and the query surface read. DFS price overrides are
//! applied here, once, so every consumer sees the same price.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::{BookPrice, Bookmaker, Event, GameRow, PropRow, Score};

// ---------------------------------------------------------------------------
// DFS overrides
// ---------------------------------------------------------------------------

/// Book id -> fixed effective price. The quoted price is replaced, not adjusted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceOverrides(HashMap<String, f64>);

impl PriceOverrides {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self(prices)
    }

    pub fn get(&self, book: &str) -> Option<f64> {
        self.0.get(book).copied()
    }

    pub fn books(&self) -> HashSet<String> {
        self.0.keys().cloned().collect()
    }

    pub fn price(&self, book: &str, quoted: f64) -> f64 {
        self.get(book).unwrap_or(quoted)
    }

    fn apply(&self, bookmakers: &mut [Bookmaker]) {
        for book in bookmakers.iter_mut() {
            let Some(price) = self.get(&book.key) else {
                continue;
            };
            for outcome in book.markets.iter_mut().flat_map(|m| m.outcomes.iter_mut()) {
                outcome.price = price;
            }
        }
    }
}

/// Detection window: no posted score, not completed, not yet started.
pub fn is_pre_game(score: Option<&Score>, commence_time: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let underway = score.map_or(false, |s| s.is_underway());
    !underway && commence_time > now
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Fold per-event alternate lines into the bulk odds events.
///
/// Markets land on the matching bookmaker; a book that only quotes
/// alternates is added. Alt events with no base event are ignored.
pub fn merge_alt_lines(odds: &[Event], alt: &[Event]) -> Vec<Event> {
    let alt_by_id: HashMap<&str, &Event> = alt.iter().map(|e| (e.id.as_str(), e)).collect();

    odds.iter()
        .map(|base| {
            let mut event = base.clone();
            let Some(extra) = alt_by_id.get(event.id.as_str()) else {
                return event;
            };
            for alt_book in &extra.bookmakers {
                match event.bookmakers.iter_mut().find(|b| b.key == alt_book.key) {
                    Some(book) => {
                        for market in &alt_book.markets {
                            if book.market(&market.key).is_none() {
                                book.markets.push(market.clone());
                            }
                        }
                    }
                    None => event.bookmakers.push(alt_book.clone()),
                }
            }
            event
        })
        .collect()
}

/// Join odds and scores on event id.
///
/// Events with odds but no score get an empty score. Events with a score
/// but no odds still get a row with no quotes. Rows sort upcoming and live
/// games ahead of completed ones, then by start time.
pub fn merge_games(
    odds: &[Event],
    scores: &[Score],
    overrides: &PriceOverrides,
    now: DateTime<Utc>,
) -> Vec<GameRow> {
    let scores_by_id: HashMap<&str, &Score> = scores.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(odds.len().max(scores.len()));

    for event in odds {
        if !seen.insert(event.id.as_str()) {
            continue;
        }
        let score = scores_by_id.get(event.id.as_str()).copied();
        let mut bookmakers = event.bookmakers.clone();
        overrides.apply(&mut bookmakers);

        rows.push(GameRow {
            event_id: event.id.clone(),
            sport_key: event.sport_key.clone(),
            home_team: event.home_team.clone(),
            away_team: event.away_team.clone(),
            commence_time: event.commence_time,
            home_score: score.and_then(|s| s.home_score()).map(str::to_string),
            away_score: score.and_then(|s| s.away_score()).map(str::to_string),
            completed: score.map_or(false, |s| s.completed),
            pre_game: is_pre_game(score, event.commence_time, now),
            bookmakers,
        });
    }

    for score in scores.iter().filter(|s| !seen.contains(s.id.as_str())) {
        rows.push(GameRow {
            event_id: score.id.clone(),
            sport_key: score.sport_key.clone(),
            home_team: score.home_team.clone(),
            away_team: score.away_team.clone(),
            commence_time: score.commence_time,
            home_score: score.home_score().map(str::to_string),
            away_score: score.away_score().map(str::to_string),
            completed: score.completed,
            pre_game: is_pre_game(Some(score), score.commence_time, now),
            bookmakers: Vec::new(),
        });
    }

    rows.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then(a.commence_time.cmp(&b.commence_time))
    });
    rows
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

type PropKey = (DateTime<Utc>, String, String, String, Option<i64>);

fn line_key(point: Option<f64>) -> Option<i64> {
    point.map(|p| (p * 100.0).round() as i64)
}

/// Group per-event prop quotes into (event, player, market, line) rows,
/// pairing Over with Under. A side nobody quotes stays empty.
///
/// Events can arrive in any order and any subset; each is handled alone.
pub fn merge_props(
    events: &[Event],
    scores: &[Score],
    overrides: &PriceOverrides,
    now: DateTime<Utc>,
) -> Vec<PropRow> {
    let scores_by_id: HashMap<&str, &Score> = scores.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut rows: BTreeMap<PropKey, PropRow> = BTreeMap::new();

    for event in events {
        let score = scores_by_id.get(event.id.as_str()).copied();
        let pre_game = is_pre_game(score, event.commence_time, now);

        for book in &event.bookmakers {
            for market in &book.markets {
                for outcome in &market.outcomes {
                    let Some(player) = outcome.description.as_deref() else {
                        continue;
                    };
                    let over = match outcome.name.as_str() {
                        "Over" => true,
                        "Under" => false,
                        _ => continue,
                    };

                    let key = (
                        event.commence_time,
                        event.id.clone(),
                        player.to_string(),
                        market.key.clone(),
                        line_key(outcome.point),
                    );
                    let row = rows.entry(key).or_insert_with(|| PropRow {
                        event_id: event.id.clone(),
                        sport_key: event.sport_key.clone(),
                        home_team: event.home_team.clone(),
                        away_team: event.away_team.clone(),
                        commence_time: event.commence_time,
                        pre_game,
                        player: player.to_string(),
                        market: market.key.clone(),
                        line: outcome.point,
                        over: BTreeMap::new(),
                        under: BTreeMap::new(),
                    });

                    let side = if over { &mut row.over } else { &mut row.under };
                    side.insert(
                        book.key.clone(),
                        BookPrice {
                            title: book.title.clone(),
                            price: overrides.price(&book.key, outcome.price),
                        },
                    );
                }
            }
        }
    }

    rows.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
