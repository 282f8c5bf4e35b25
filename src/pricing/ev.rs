//! +EV detection against the no-vig consensus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consensus::{consensus, OutcomeGroup};
use super::PricingConfig;

/// A single bet whose quoted price beats the fair price by the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvBet {
    pub sport_key: String,
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub book: String,
    pub book_title: String,
    pub market: String,
    pub outcome: String,
    pub line: Option<f64>,
    pub player: Option<String>,
    pub price: f64,
    pub decimal_odds: f64,
    pub implied_probability: f64,
    pub fair_probability: f64,
    pub fair_price: Option<f64>,
    pub ev_percent: f64,
    /// Books behind the consensus for this outcome.
    pub books: usize,
    pub detected_at: DateTime<Utc>,
}

/// Expected return per unit staked, as a percentage.
pub fn ev_percent(fair_probability: f64, decimal_odds: f64) -> f64 {
    (fair_probability * decimal_odds - 1.0) * 100.0
}

pub fn find_ev(group: &OutcomeGroup, config: &PricingConfig, now: DateTime<Utc>) -> Vec<EvBet> {
    let format = config.odds_format;
    let Some(fair) = consensus(group, format, &config.dfs_books) else {
        return Vec::new();
    };

    let mut bets = Vec::new();
    for price in &fair {
        let Some(quotes) = group.outcomes.get(&price.outcome) else {
            continue;
        };
        for quote in quotes {
            if !config.allows_leg(&quote.book) || !config.price_in_range(quote.price) {
                continue;
            }
            let (Some(decimal_odds), Some(implied)) =
                (format.decimal_odds(quote.price), format.implied_probability(quote.price))
            else {
                continue;
            };
            let ev = ev_percent(price.fair_probability, decimal_odds);
            if ev < config.ev_threshold {
                continue;
            }
            bets.push(EvBet {
                sport_key: group.sport_key.clone(),
                event_id: group.event_id.clone(),
                home_team: group.home_team.clone(),
                away_team: group.away_team.clone(),
                commence_time: group.commence_time,
                book: quote.book.clone(),
                book_title: quote.title.clone(),
                market: group.market.clone(),
                outcome: price.outcome.clone(),
                line: quote.point,
                player: group.player.clone(),
                price: quote.price,
                decimal_odds,
                implied_probability: implied,
                fair_probability: price.fair_probability,
                fair_price: price.fair_price,
                ev_percent: ev,
                books: price.books,
                detected_at: now,
            });
        }
    }
    bets
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
