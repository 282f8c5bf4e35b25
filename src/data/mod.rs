//! Quote source abstraction.
//!
//! Defines the `QuoteSource` trait the fetch orchestrator pulls from, the
//! metered response wrapper that carries the remaining-credit count, and
//! the typed failures an upstream call can produce.

pub mod odds_api;

use async_trait::async_trait;

use crate::types::{Event, OddsFormat, Score, Sport};

/// Credit usage reported alongside a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreditReport {
    pub remaining: Option<u32>,
    pub used: Option<u32>,
}

impl CreditReport {
    pub fn new(remaining: u32, used: u32) -> Self {
        Self {
            remaining: Some(remaining),
            used: Some(used),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.used.is_none()
    }
}

/// A response payload plus the credit counters the call reported.
#[derive(Debug, Clone)]
pub struct Metered<T> {
    pub data: T,
    pub credits: CreditReport,
}

impl<T> Metered<T> {
    pub fn new(data: T, credits: CreditReport) -> Self {
        Self { data, credits }
    }

    /// A response from an endpoint that reports no credit usage.
    pub fn free(data: T) -> Self {
        Self {
            data,
            credits: CreditReport::default(),
        }
    }
}

/// Parameters for an odds request.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuery {
    pub regions: Vec<String>,
    pub markets: Vec<String>,
    pub odds_format: OddsFormat,
}

impl OddsQuery {
    pub fn with_markets(&self, markets: &[String]) -> Self {
        Self {
            markets: markets.to_vec(),
            ..self.clone()
        }
    }
}

/// Upstream failures. None of these are fatal to the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Abstraction over the metered odds/scores provider.
///
/// Every call that costs credits reports the provider's remaining count;
/// the free endpoints (`sports`, `events`) may report nothing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// All sports the provider knows about.
    async fn sports(&self) -> Result<Metered<Vec<Sport>>, FeedError>;

    /// Upcoming and live events for a sport, without quotes.
    async fn events(&self, sport: &str) -> Result<Metered<Vec<Event>>, FeedError>;

    /// Live and recently completed scores for a sport.
    async fn scores(&self, sport: &str) -> Result<Metered<Vec<Score>>, FeedError>;

    /// Bulk odds for every event of a sport.
    async fn odds(&self, sport: &str, query: &OddsQuery) -> Result<Metered<Vec<Event>>, FeedError>;

    /// Odds for a single event. Required for non-featured markets.
    async fn event_odds(
        &self,
        sport: &str,
        event_id: &str,
        query: &OddsQuery,
    ) -> Result<Metered<Event>, FeedError>;

    /// Player props for a single event.
    async fn event_props(
        &self,
        sport: &str,
        event_id: &str,
        query: &OddsQuery,
    ) -> Result<Metered<Event>, FeedError> {
        self.event_odds(sport, event_id, query).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
