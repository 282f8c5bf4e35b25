//! Two-leg arbitrage detection.
//!
//! Only two-outcome groups are considered: opposite sides of one line,
//! taken at different books. A pair whose implied probabilities sum below
//! 1.0 returns the same payout whichever side wins.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::consensus::{BookQuote, OutcomeGroup};
use super::sizing::StakePlan;
use super::PricingConfig;

/// One side of a two-leg position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub book: String,
    pub book_title: String,
    pub outcome: String,
    pub price: f64,
    pub point: Option<f64>,
    pub decimal_odds: f64,
    pub implied_probability: f64,
}

impl Leg {
    pub(crate) fn from_quote(outcome: &str, quote: &BookQuote, config: &PricingConfig) -> Option<Self> {
        let format = config.odds_format;
        Some(Self {
            book: quote.book.clone(),
            book_title: quote.title.clone(),
            outcome: outcome.to_string(),
            price: quote.price,
            point: quote.point,
            decimal_odds: format.decimal_odds(quote.price)?,
            implied_probability: format.implied_probability(quote.price)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbBet {
    pub sport_key: String,
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub market: String,
    pub line: Option<f64>,
    pub player: Option<String>,
    pub leg_a: Leg,
    pub leg_b: Leg,
    pub combined_probability: f64,
    pub profit_percent: f64,
    pub stakes: StakePlan,
    pub profit: Decimal,
    pub detected_at: DateTime<Utc>,
}

pub fn find_arbs(group: &OutcomeGroup, config: &PricingConfig, now: DateTime<Utc>) -> Vec<ArbBet> {
    if group.outcomes.len() != 2 {
        return Vec::new();
    }
    let mut sides = group.outcomes.iter();
    let (Some((name_a, quotes_a)), Some((name_b, quotes_b))) = (sides.next(), sides.next()) else {
        return Vec::new();
    };

    let legs = |name: &str, quotes: &[BookQuote]| -> Vec<Leg> {
        quotes
            .iter()
            .filter(|q| config.allows_leg(&q.book))
            .filter_map(|q| Leg::from_quote(name, q, config))
            .collect()
    };
    let legs_a = legs(name_a, quotes_a);
    let legs_b = legs(name_b, quotes_b);

    let mut arbs = Vec::new();
    for a in &legs_a {
        for b in legs_b.iter().filter(|b| b.book != a.book) {
            let combined = a.implied_probability + b.implied_probability;
            if combined >= 1.0 {
                continue;
            }
            let profit_percent = (1.0 / combined - 1.0) * 100.0;
            if profit_percent < config.arb_min_profit_pct {
                continue;
            }
            let Some(stakes) = StakePlan::equal_payout(a.decimal_odds, b.decimal_odds) else {
                continue;
            };
            arbs.push(ArbBet {
                sport_key: group.sport_key.clone(),
                event_id: group.event_id.clone(),
                home_team: group.home_team.clone(),
                away_team: group.away_team.clone(),
                commence_time: group.commence_time,
                market: group.market.clone(),
                line: group.line,
                player: group.player.clone(),
                leg_a: a.clone(),
                leg_b: b.clone(),
                combined_probability: combined,
                profit_percent,
                profit: stakes.single_win_profit(),
                stakes,
                detected_at: now,
            });
        }
    }
    arbs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
