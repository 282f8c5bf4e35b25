//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default, so an empty file is a valid configuration. The
//! upstream API key is referenced by env-var name and resolved at runtime
//! into a `SecretString`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::time::Duration;

use crate::data::OddsQuery;
use crate::engine::budget::BudgetThresholds;
use crate::engine::cache::CacheTtls;
use crate::engine::merger::PriceOverrides;
use crate::engine::orchestrator::OrchestratorSettings;
use crate::engine::scheduler::RefreshIntervals;
use crate::pricing::density::{NormalDensity, SigmaOverride};
use crate::pricing::PricingConfig;
use crate::types::{OddsFormat, SharplineError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub refresh: RefreshConfig,
    pub budget: BudgetConfig,
    pub ev: EvConfig,
    pub arb: ArbConfig,
    pub middles: MiddlesConfig,
    /// Book id -> effective price, in the configured odds format.
    pub dfs_books: HashMap<String, f64>,
    pub props_markets: PropsMarkets,
    pub history: HistoryConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub regions: Vec<String>,
    pub markets: Vec<String>,
    pub sports: Vec<String>,
    /// Books allowed as opportunity legs. Empty allows every book.
    pub bookmakers: Vec<String>,
    pub odds_format: OddsFormat,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_key_env: "ODDS_API_KEY".into(),
            base_url: None,
            regions: strings(&["us", "us2", "us_ex"]),
            markets: strings(&["h2h", "spreads", "totals"]),
            sports: strings(&[
                "americanfootball_nfl",
                "basketball_nba",
                "baseball_mlb",
                "icehockey_nhl",
            ]),
            bookmakers: strings(&["fanduel", "draftkings"]),
            odds_format: OddsFormat::American,
            timeout_secs: 15,
        }
    }
}

/// Intervals are in seconds.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub odds_refresh_interval: u64,
    pub scores_refresh_interval: u64,
    pub props_refresh_interval: u64,
    pub alt_lines_refresh_interval: u64,
    pub props_max_concurrent: usize,
    pub props_enabled: bool,
    pub alt_lines_enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            odds_refresh_interval: 300,
            scores_refresh_interval: 120,
            props_refresh_interval: 300,
            alt_lines_refresh_interval: 300,
            props_max_concurrent: 5,
            props_enabled: true,
            alt_lines_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    pub low_credit_warning: u32,
    pub critical_credit_stop: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            low_credit_warning: 50,
            critical_credit_stop: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvConfig {
    pub ev_threshold: f64,
    /// Bounds in American odds whatever `feed.odds_format` is.
    pub ev_odds_min: f64,
    pub ev_odds_max: f64,
}

impl Default for EvConfig {
    fn default() -> Self {
        Self {
            ev_threshold: 2.0,
            ev_odds_min: -200.0,
            ev_odds_max: 200.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArbConfig {
    pub arb_enabled: bool,
    pub arb_min_profit_pct: f64,
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            arb_enabled: true,
            arb_min_profit_pct: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MiddlesConfig {
    pub middle_enabled: bool,
    pub middle_min_window: f64,
    pub middle_max_combined_cost: f64,
    /// Per-sport σ overrides for the hit-probability model.
    pub sigma: HashMap<String, SigmaOverride>,
}

impl Default for MiddlesConfig {
    fn default() -> Self {
        Self {
            middle_enabled: true,
            middle_min_window: 0.5,
            middle_max_combined_cost: 1.08,
            sigma: HashMap::new(),
        }
    }
}

/// Sport -> prop market codes fetched per event.
#[derive(Debug, Deserialize, Clone)]
#[serde(transparent)]
pub struct PropsMarkets(pub HashMap<String, Vec<String>>);

impl Default for PropsMarkets {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            (
                "americanfootball_nfl",
                &[
                    "player_pass_yds",
                    "player_pass_tds",
                    "player_rush_yds",
                    "player_reception_yds",
                    "player_receptions",
                    "player_anytime_td",
                ],
            ),
            (
                "basketball_nba",
                &[
                    "player_points",
                    "player_rebounds",
                    "player_assists",
                    "player_threes",
                    "player_points_rebounds_assists",
                ],
            ),
            (
                "baseball_mlb",
                &[
                    "batter_home_runs",
                    "batter_hits",
                    "batter_total_bases",
                    "pitcher_strikeouts",
                ],
            ),
            (
                "icehockey_nhl",
                &[
                    "player_points",
                    "player_goals",
                    "player_assists",
                    "player_shots_on_goal",
                ],
            ),
        ];
        Self(
            table
                .iter()
                .map(|(sport, markets)| (sport.to_string(), strings(markets)))
                .collect(),
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub database_url: String,
    /// Clear stored history once at startup.
    pub reset_on_start: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://sharpline_history.db".into(),
            reset_on_start: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn invalid(message: impl Into<String>) -> SharplineError {
    SharplineError::Config(message.into())
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SharplineError> {
        if self.feed.sports.is_empty() {
            return Err(invalid("feed.sports must name at least one sport"));
        }
        if self.feed.regions.is_empty() {
            return Err(invalid("feed.regions must not be empty"));
        }
        if self.budget.critical_credit_stop >= self.budget.low_credit_warning {
            return Err(invalid(format!(
                "budget.critical_credit_stop ({}) must be below low_credit_warning ({})",
                self.budget.critical_credit_stop, self.budget.low_credit_warning
            )));
        }
        if self.refresh.props_max_concurrent == 0 {
            return Err(invalid("refresh.props_max_concurrent must be at least 1"));
        }
        let r = &self.refresh;
        for (name, secs) in [
            ("odds_refresh_interval", r.odds_refresh_interval),
            ("scores_refresh_interval", r.scores_refresh_interval),
            ("props_refresh_interval", r.props_refresh_interval),
            ("alt_lines_refresh_interval", r.alt_lines_refresh_interval),
        ] {
            if secs == 0 {
                return Err(invalid(format!("refresh.{name} must be positive")));
            }
        }
        if self.ev.ev_odds_min > self.ev.ev_odds_max {
            return Err(invalid(format!(
                "ev.ev_odds_min ({}) is above ev_odds_max ({})",
                self.ev.ev_odds_min, self.ev.ev_odds_max
            )));
        }
        if let Some(bound) = [self.ev.ev_odds_min, self.ev.ev_odds_max]
            .into_iter()
            .find(|b| !b.is_finite() || b.abs() < 100.0)
        {
            return Err(invalid(format!(
                "ev odds bound {bound} must be American odds (at least 100 in magnitude)"
            )));
        }
        if self.middles.middle_min_window < 0.0 || self.middles.middle_max_combined_cost <= 0.0 {
            return Err(invalid("middles window and cost limits must be positive"));
        }
        if let Some((book, price)) = self.dfs_books.iter().find(|(_, p)| **p == 0.0 || !p.is_finite()) {
            return Err(invalid(format!("dfs_books.{book} has unusable price {price}")));
        }
        if self.feed.odds_format == OddsFormat::Decimal {
            if let Some((book, price)) = self.dfs_books.iter().find(|(_, p)| **p <= 1.0) {
                return Err(invalid(format!("dfs_books.{book} decimal price {price} must exceed 1.0")));
            }
        } else if let Some((book, price)) = self.dfs_books.iter().find(|(_, p)| p.abs() < 100.0) {
            return Err(invalid(format!("dfs_books.{book} American price {price} must be at least 100 in magnitude")));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    pub fn api_key(&self) -> Result<SecretString> {
        let key = Self::resolve_env(&self.feed.api_key_env)?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Environment variable {} is empty", self.feed.api_key_env);
        }
        Ok(SecretString::new(key.to_string()))
    }

    // ---- Component settings ----

    pub fn pricing(&self) -> PricingConfig {
        let bookmakers = if self.feed.bookmakers.is_empty() {
            None
        } else {
            Some(self.feed.bookmakers.iter().cloned().collect::<HashSet<_>>())
        };
        PricingConfig {
            odds_format: self.feed.odds_format,
            bookmakers,
            dfs_books: self.dfs_books.keys().cloned().collect(),
            ev_threshold: self.ev.ev_threshold,
            ev_odds_min: Some(self.ev.ev_odds_min),
            ev_odds_max: Some(self.ev.ev_odds_max),
            arb_enabled: self.arb.arb_enabled,
            arb_min_profit_pct: self.arb.arb_min_profit_pct,
            middle_enabled: self.middles.middle_enabled,
            middle_min_window: self.middles.middle_min_window,
            middle_max_combined_cost: self.middles.middle_max_combined_cost,
        }
    }

    pub fn density(&self) -> NormalDensity {
        NormalDensity::new(self.middles.sigma.clone())
    }

    pub fn orchestrator(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            query: OddsQuery {
                regions: self.feed.regions.clone(),
                markets: self.feed.markets.clone(),
                odds_format: self.feed.odds_format,
            },
            props_markets: self.props_markets.0.clone(),
            props_enabled: self.refresh.props_enabled,
            alt_lines_enabled: self.refresh.alt_lines_enabled,
            max_concurrent: self.refresh.props_max_concurrent,
        }
    }

    pub fn intervals(&self) -> RefreshIntervals {
        let r = &self.refresh;
        RefreshIntervals {
            odds: Duration::from_secs(r.odds_refresh_interval),
            scores: Duration::from_secs(r.scores_refresh_interval),
            props: Duration::from_secs(r.props_refresh_interval),
            alt_lines: Duration::from_secs(r.alt_lines_refresh_interval),
        }
    }

    /// Cached data expires just before the next scheduled refresh.
    pub fn cache_ttls(&self) -> CacheTtls {
        self.intervals().cache_ttls()
    }

    pub fn budget_thresholds(&self) -> BudgetThresholds {
        BudgetThresholds {
            low: self.budget.low_credit_warning,
            critical: self.budget.critical_credit_stop,
        }
    }

    pub fn price_overrides(&self) -> PriceOverrides {
        PriceOverrides::new(self.dfs_books.clone())
    }
}
