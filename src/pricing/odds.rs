//! Price and probability conversions.
//!
//! Every conversion is order-preserving: a better price always maps to a
//! lower implied probability. Invalid prices (American odds strictly
//! between -100 and +100, decimal odds at or below 1.0) convert to `None`.

use crate::types::OddsFormat;

pub fn american_to_decimal(american: f64) -> Option<f64> {
    if american >= 100.0 {
        Some(american / 100.0 + 1.0)
    } else if american <= -100.0 {
        Some(100.0 / american.abs() + 1.0)
    } else {
        None
    }
}

pub fn american_to_probability(american: f64) -> Option<f64> {
    if american >= 100.0 {
        Some(100.0 / (american + 100.0))
    } else if american <= -100.0 {
        Some(-american / (-american + 100.0))
    } else {
        None
    }
}

pub fn decimal_to_american(decimal: f64) -> Option<f64> {
    if !decimal.is_finite() || decimal <= 1.0 {
        None
    } else if decimal >= 2.0 {
        Some((decimal - 1.0) * 100.0)
    } else {
        Some(-100.0 / (decimal - 1.0))
    }
}

pub fn probability_to_american(prob: f64) -> Option<f64> {
    if prob <= 0.0 || prob >= 1.0 || !prob.is_finite() {
        return None;
    }
    if prob >= 0.5 {
        Some(-(prob / (1.0 - prob)) * 100.0)
    } else {
        Some(((1.0 - prob) / prob) * 100.0)
    }
}

impl OddsFormat {
    /// Implied probability of a quoted price, vig included.
    pub fn implied_probability(&self, price: f64) -> Option<f64> {
        match self {
            OddsFormat::American => american_to_probability(price),
            OddsFormat::Decimal if price > 1.0 && price.is_finite() => Some(1.0 / price),
            OddsFormat::Decimal => None,
        }
    }

    /// Total return per unit staked (decimal odds) for a quoted price.
    pub fn decimal_odds(&self, price: f64) -> Option<f64> {
        match self {
            OddsFormat::American => american_to_decimal(price),
            OddsFormat::Decimal if price > 1.0 && price.is_finite() => Some(price),
            OddsFormat::Decimal => None,
        }
    }

    /// The same price in American odds.
    pub fn to_american(&self, price: f64) -> Option<f64> {
        match self {
            OddsFormat::American if price.abs() >= 100.0 => Some(price),
            OddsFormat::American => None,
            OddsFormat::Decimal => decimal_to_american(price),
        }
    }

    /// Fair price for a probability, in this format.
    pub fn price_for_probability(&self, prob: f64) -> Option<f64> {
        match self {
            OddsFormat::American => probability_to_american(prob),
            OddsFormat::Decimal if prob > 0.0 && prob < 1.0 => Some(1.0 / prob),
            OddsFormat::Decimal => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
