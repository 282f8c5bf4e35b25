//! Shared types for SHARPLINE.
//!
//! These types form the data model used across all modules. Feed records
//! (`Event`, `Score`, `Sport`) deserialize straight from the upstream JSON;
//! merged rows (`GameRow`, `PropRow`) are what the pricing engine and the
//! query surface consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Sports and events
// ---------------------------------------------------------------------------

/// A league or competition offered by the quote source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sport {
    pub key: String,
    #[serde(default)]
    pub group: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub has_outrights: bool,
}

fn default_true() -> bool {
    true
}

/// One book's price for one outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeQuote {
    /// Team name, "Over"/"Under", or "Draw".
    pub name: String,
    /// Price in the odds format the feed was queried with.
    pub price: f64,
    /// Line (spread or total). `None` for moneylines.
    #[serde(default)]
    pub point: Option<f64>,
    /// Player name for prop markets.
    #[serde(default)]
    pub description: Option<String>,
}

/// A book's quotes for one market (h2h, spreads, totals, a prop code...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketQuotes {
    pub key: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcomes: Vec<OutcomeQuote>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmaker {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub markets: Vec<MarketQuotes>,
}

impl Bookmaker {
    pub fn market(&self, key: &str) -> Option<&MarketQuotes> {
        self.markets.iter().find(|m| m.key == key)
    }
}

/// One scheduled game, with whatever book quotes were requested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub sport_key: String,
    #[serde(default)]
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

impl Event {
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.commence_time <= now
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {} ({})",
            self.sport_key,
            self.away_team,
            self.home_team,
            self.commence_time.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreValue {
    pub name: String,
    #[serde(default)]
    pub score: Option<String>,
}

/// Live or final score for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Score {
    pub id: String,
    pub sport_key: String,
    #[serde(default)]
    pub sport_title: String,
    pub commence_time: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scores: Option<Vec<ScoreValue>>,
}

impl Score {
    fn team_score(&self, team: &str) -> Option<&str> {
        self.scores
            .as_ref()?
            .iter()
            .find(|s| s.name == team)
            .and_then(|s| s.score.as_deref())
    }

    pub fn home_score(&self) -> Option<&str> {
        self.team_score(&self.home_team)
    }

    pub fn away_score(&self) -> Option<&str> {
        self.team_score(&self.away_team)
    }

    /// A posted score or a completed flag means the game is under way.
    pub fn is_underway(&self) -> bool {
        self.completed || self.home_score().is_some() || self.away_score().is_some()
    }
}

// ---------------------------------------------------------------------------
// Merged rows
// ---------------------------------------------------------------------------

/// Canonical merged view of one event: score plus every book's quotes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRow {
    pub event_id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub home_score: Option<String>,
    pub away_score: Option<String>,
    pub completed: bool,
    /// Detection runs only while this is set. Display is unaffected.
    pub pre_game: bool,
    pub bookmakers: Vec<Bookmaker>,
}

/// A book's price on one side of a prop line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookPrice {
    pub title: String,
    pub price: f64,
}

/// Canonical merged view of one player-prop line.
///
/// Keyed by (event, player, market, line). A side nobody quotes is an
/// empty map, never a missing row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropRow {
    pub event_id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub pre_game: bool,
    pub player: String,
    pub market: String,
    pub line: Option<f64>,
    pub over: BTreeMap<String, BookPrice>,
    pub under: BTreeMap<String, BookPrice>,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The independently refreshed classes of upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Odds,
    Scores,
    Props,
    AltLines,
}

impl DataKind {
    pub const ALL: &'static [DataKind] = &[
        DataKind::Odds,
        DataKind::Scores,
        DataKind::Props,
        DataKind::AltLines,
    ];

    /// Kinds fetched one call per event. Each refresh costs many credits.
    pub fn is_per_event(&self) -> bool {
        matches!(self, DataKind::Props | DataKind::AltLines)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Odds => write!(f, "odds"),
            DataKind::Scores => write!(f, "scores"),
            DataKind::Props => write!(f, "props"),
            DataKind::AltLines => write!(f, "alt_lines"),
        }
    }
}

/// Price notation used by the feed and by configured price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsFormat {
    #[default]
    American,
    Decimal,
}

impl OddsFormat {
    /// Query-string value understood by the upstream API.
    pub fn as_param(&self) -> &'static str {
        match self {
            OddsFormat::American => "american",
            OddsFormat::Decimal => "decimal",
        }
    }
}

impl fmt::Display for OddsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl std::str::FromStr for OddsFormat {
    type Err = SharplineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "american" | "us" => Ok(OddsFormat::American),
            "decimal" | "eu" => Ok(OddsFormat::Decimal),
            other => Err(SharplineError::Config(format!("unknown odds format: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SHARPLINE.
#[derive(Debug, thiserror::Error)]
pub enum SharplineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Feed error: {0}")]
    Feed(#[from] crate::data::FeedError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
