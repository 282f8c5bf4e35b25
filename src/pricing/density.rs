//! Scoring-density models for middle hit probability.
//!
//! A middle wins both legs when the final margin or total lands inside the
//! window between the two lines. How likely that is depends on how finely
//! the sport scores: a 2-point window in basketball is a coin flip on a few
//! possessions, in hockey it is two whole goals.
//!
//! The default model treats the final number as normally distributed around
//! the middle of the window with a per-sport, per-market standard deviation.

use serde::Deserialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::HashMap;

use super::consensus::MarketKind;

/// Maps a window on a market to the probability the result lands inside it.
pub trait ScoringDensity: Send + Sync {
    fn hit_probability(&self, sport: &str, kind: MarketKind, line: f64, window: f64) -> f64;
}

/// Per-sport standard deviations for totals and spreads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmaPair {
    pub totals: f64,
    pub spreads: f64,
}

/// Config-level override; either side may be left at the built-in value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct SigmaOverride {
    pub totals: Option<f64>,
    pub spreads: Option<f64>,
}

const DEFAULT_SIGMA: SigmaPair = SigmaPair { totals: 8.0, spreads: 8.0 };

/// Built-in σ keyed by sport-key prefix. First match wins.
const SIGMA_TABLE: &[(&str, SigmaPair)] = &[
    ("basketball_nba", SigmaPair { totals: 12.0, spreads: 12.0 }),
    ("basketball_ncaab", SigmaPair { totals: 11.0, spreads: 11.0 }),
    ("americanfootball_nfl", SigmaPair { totals: 10.0, spreads: 13.5 }),
    ("americanfootball_ncaaf", SigmaPair { totals: 14.0, spreads: 16.0 }),
    ("baseball_mlb", SigmaPair { totals: 3.3, spreads: 3.5 }),
    ("icehockey_nhl", SigmaPair { totals: 2.2, spreads: 2.3 }),
    ("soccer", SigmaPair { totals: 1.6, spreads: 1.6 }),
];

/// Player stat lines scale with the line itself.
fn prop_sigma(line: f64) -> f64 {
    (0.3 * line.abs() + 0.5).max(0.75)
}

#[derive(Debug, Clone, Default)]
pub struct NormalDensity {
    overrides: HashMap<String, SigmaOverride>,
}

impl NormalDensity {
    pub fn new(overrides: HashMap<String, SigmaOverride>) -> Self {
        Self { overrides }
    }

    pub fn sigmas(&self, sport: &str) -> SigmaPair {
        let base = SIGMA_TABLE
            .iter()
            .find(|(prefix, _)| sport.starts_with(prefix))
            .map(|(_, pair)| *pair)
            .unwrap_or(DEFAULT_SIGMA);

        match self.overrides.get(sport) {
            Some(o) => SigmaPair {
                totals: o.totals.unwrap_or(base.totals),
                spreads: o.spreads.unwrap_or(base.spreads),
            },
            None => base,
        }
    }

    fn sigma(&self, sport: &str, kind: MarketKind, line: f64) -> Option<f64> {
        match kind {
            MarketKind::Total => Some(self.sigmas(sport).totals),
            MarketKind::Spread => Some(self.sigmas(sport).spreads),
            MarketKind::PlayerProp => Some(prop_sigma(line)),
            MarketKind::Moneyline => None,
        }
    }
}

impl ScoringDensity for NormalDensity {
    fn hit_probability(&self, sport: &str, kind: MarketKind, line: f64, window: f64) -> f64 {
        if window <= 0.0 {
            return 0.0;
        }
        let Some(sigma) = self.sigma(sport, kind, line) else {
            return 0.0;
        };
        let half = window / 2.0;
        Normal::new(0.0, sigma)
            .map(|n| n.cdf(half) - n.cdf(-half))
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
