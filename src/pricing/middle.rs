//! Middle detection.
//!
//! A middle takes opposite sides of two *different* lines at two books so
//! that a result between the lines wins both bets. Totals and props pair an
//! Over at X with an Under at Y > X. Spreads pair the home side at `ph` with
//! the away side at `pa`, and the window is `ph + pa` (home -3 with away
//! +4.5 wins both when home wins by 4).

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::arb::Leg;
use super::consensus::{BookQuote, MarketKind, OutcomeGroup};
use super::density::ScoringDensity;
use super::sizing::StakePlan;
use super::PricingConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddleBet {
    pub sport_key: String,
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub market: String,
    pub kind: MarketKind,
    pub player: Option<String>,
    /// Over side, or the home side of a spread.
    pub leg_a: Leg,
    /// Under side, or the away side of a spread.
    pub leg_b: Leg,
    pub window: f64,
    pub hit_probability: f64,
    pub combined_cost: f64,
    pub stakes: StakePlan,
    pub hit_profit: Decimal,
    pub miss_profit: Decimal,
    pub ev_percent: f64,
    pub detected_at: DateTime<Utc>,
}

/// Lines of one market family for one event (and player, for props).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FamilyKey {
    event_id: String,
    kind: MarketKind,
    market: String,
    player: Option<String>,
}

struct Family<'a> {
    group: &'a OutcomeGroup,
    quotes: Vec<(&'a str, &'a BookQuote)>,
}

fn family_market(group: &OutcomeGroup) -> String {
    match group.kind {
        MarketKind::Spread => "spreads".to_string(),
        MarketKind::Total => "totals".to_string(),
        _ => group.market.clone(),
    }
}

fn centi(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Find every middle across the given groups. Main and alternate lines of
/// the same family are paired freely; different families never mix.
pub fn find_middles(
    groups: &[OutcomeGroup],
    config: &PricingConfig,
    density: &dyn ScoringDensity,
    now: DateTime<Utc>,
) -> Vec<MiddleBet> {
    let mut families: BTreeMap<FamilyKey, Family<'_>> = BTreeMap::new();
    for group in groups.iter().filter(|g| g.kind != MarketKind::Moneyline) {
        let key = FamilyKey {
            event_id: group.event_id.clone(),
            kind: group.kind,
            market: family_market(group),
            player: group.player.clone(),
        };
        let family = families.entry(key).or_insert_with(|| Family { group, quotes: Vec::new() });
        for (outcome, quotes) in &group.outcomes {
            for quote in quotes {
                let duplicate = family.quotes.iter().any(|(o, q)| {
                    *o == outcome.as_str() && q.book == quote.book && q.point == quote.point
                });
                if !duplicate {
                    family.quotes.push((outcome.as_str(), quote));
                }
            }
        }
    }

    let mut middles = Vec::new();
    for (key, family) in &families {
        let g = family.group;
        let (side_a, side_b) = match key.kind {
            MarketKind::Spread => (g.home_team.as_str(), g.away_team.as_str()),
            _ => ("Over", "Under"),
        };
        let a_quotes = family.quotes.iter().filter(|(o, _)| *o == side_a);
        for (_, qa) in a_quotes {
            for (_, qb) in family.quotes.iter().filter(|(o, _)| *o == side_b) {
                let (Some(pa), Some(pb)) = (qa.point, qb.point) else {
                    continue;
                };
                let (window, line) = match key.kind {
                    MarketKind::Spread => (centi(pa + pb), pa.abs()),
                    _ => (centi(pb - pa), (pa + pb) / 2.0),
                };
                let pair = ((side_a, *qa), (side_b, *qb));
                if let Some(m) = evaluate(g, &key.market, key.kind, pair, window, line, config, density, now) {
                    middles.push(m);
                }
            }
        }
    }
    middles
}

#[allow(clippy::too_many_arguments)]
fn evaluate(
    group: &OutcomeGroup,
    market: &str,
    kind: MarketKind,
    ((name_a, qa), (name_b, qb)): ((&str, &BookQuote), (&str, &BookQuote)),
    window: f64,
    line: f64,
    config: &PricingConfig,
    density: &dyn ScoringDensity,
    now: DateTime<Utc>,
) -> Option<MiddleBet> {
    if qa.book == qb.book || !config.allows_leg(&qa.book) || !config.allows_leg(&qb.book) {
        return None;
    }
    if window <= 0.0 || window < config.middle_min_window {
        return None;
    }

    let leg_a = Leg::from_quote(name_a, qa, config)?;
    let leg_b = Leg::from_quote(name_b, qb, config)?;
    let combined_cost = leg_a.implied_probability + leg_b.implied_probability;
    if combined_cost > config.middle_max_combined_cost {
        return None;
    }

    let hit_probability = density.hit_probability(&group.sport_key, kind, line, window);
    let stakes = StakePlan::equal_payout(leg_a.decimal_odds, leg_b.decimal_odds)?;
    let hit_profit = stakes.both_win_profit();
    let miss_profit = stakes.single_win_profit();
    let expected = hit_probability * hit_profit.to_f64()? + (1.0 - hit_probability) * miss_profit.to_f64()?;
    let ev_percent = expected / stakes.total_stake.to_f64()? * 100.0;

    Some(MiddleBet {
        sport_key: group.sport_key.clone(),
        event_id: group.event_id.clone(),
        home_team: group.home_team.clone(),
        away_team: group.away_team.clone(),
        commence_time: group.commence_time,
        market: market.to_string(),
        kind,
        player: group.player.clone(),
        leg_a,
        leg_b,
        window,
        hit_probability,
        combined_cost,
        stakes,
        hit_profit,
        miss_profit,
        ev_percent,
        detected_at: now,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
