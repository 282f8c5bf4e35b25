//! The Odds API (v4) integration.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Base URL: https://api.the-odds-api.com/v4
//! Auth: `apiKey` query parameter.
//! Metering: every response carries `x-requests-remaining` and
//! `x-requests-used`. The sports and events endpoints are free; odds and
//! scores cost credits per region/market.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{CreditReport, FeedError, Metered, OddsQuery, QuoteSource};
use crate::types::{Event, Score, Sport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.the-odds-api.com/v4";

const REMAINING_HEADER: &str = "x-requests-remaining";
const USED_HEADER: &str = "x-requests-used";

/// How far back the scores endpoint looks for completed games.
const SCORES_DAYS_FROM: u32 = 1;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OddsApiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl OddsApiClient {
    pub fn new(api_key: SecretString, base_url: Option<String>, timeout: Duration) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SHARPLINE/0.1.0")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
        })
    }

    /// Authenticated GET returning the decoded body and credit counters.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Metered<T>, FeedError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(&[("apiKey", self.api_key.expose_secret().as_str())])
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        let credits = parse_credits(resp.headers());

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FeedError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        let data = serde_json::from_slice::<T>(&body)
            .map_err(|e| FeedError::Malformed(format!("{path}: {e}")))?;

        debug!(
            path,
            remaining = ?credits.remaining,
            used = ?credits.used,
            "Odds API response"
        );

        Ok(Metered::new(data, credits))
    }

    fn odds_params(query: &OddsQuery) -> Vec<(&'static str, String)> {
        vec![
            ("regions", query.regions.join(",")),
            ("markets", query.markets.join(",")),
            ("oddsFormat", query.odds_format.as_param().to_string()),
            ("dateFormat", "iso".to_string()),
        ]
    }
}

/// Read the metering headers. Missing or unparseable values are `None`.
pub fn parse_credits(headers: &HeaderMap) -> CreditReport {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .map(|v| v.max(0.0) as u32)
    };
    CreditReport {
        remaining: read(REMAINING_HEADER),
        used: read(USED_HEADER),
    }
}

#[async_trait]
impl QuoteSource for OddsApiClient {
    async fn sports(&self) -> Result<Metered<Vec<Sport>>, FeedError> {
        self.get("/sports", &[]).await
    }

    async fn events(&self, sport: &str) -> Result<Metered<Vec<Event>>, FeedError> {
        self.get(&format!("/sports/{sport}/events"), &[]).await
    }

    async fn scores(&self, sport: &str) -> Result<Metered<Vec<Score>>, FeedError> {
        self.get(
            &format!("/sports/{sport}/scores"),
            &[("daysFrom", SCORES_DAYS_FROM.to_string())],
        )
        .await
    }

    async fn odds(&self, sport: &str, query: &OddsQuery) -> Result<Metered<Vec<Event>>, FeedError> {
        self.get(&format!("/sports/{sport}/odds"), &Self::odds_params(query))
            .await
    }

    async fn event_odds(
        &self,
        sport: &str,
        event_id: &str,
        query: &OddsQuery,
    ) -> Result<Metered<Event>, FeedError> {
        self.get(
            &format!("/sports/{sport}/events/{event_id}/odds"),
            &Self::odds_params(query),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
