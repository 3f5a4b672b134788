//! REST client for the upstream fixture provider (API-Football v3).
//!
//! The provider exposes path-based endpoints (`/fixtures`, `/leagues`)
//! behind a header API key and wraps every payload in a common envelope:
//!   { get, parameters, errors, results, paging, response }
//! Rate-limit and plan-restriction failures arrive as a non-empty
//! `errors` field with HTTP 200, so HTTP success must not be treated as
//! semantic success. No retries happen at this layer; retry policy
//! belongs to the sync engine, which knows the cost of re-querying.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{ProdeError, Result};

pub const KEY_HEADER: &str = "x-rapidapi-key";
pub const HOST_HEADER: &str = "x-rapidapi-host";

/// Provider response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub errors: serde_json::Value,
    #[serde(default)]
    pub results: i64,
    #[serde(default = "Vec::new")]
    pub response: Vec<T>,
}

/// Flatten the envelope's `errors` field, which the provider ships
/// either as an object ({"rateLimit": "..."}), or as an array.
pub fn envelope_error_messages(errors: &serde_json::Value) -> Vec<String> {
    match errors {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value.as_str() {
                Some(text) => format!("{key}: {text}"),
                None => format!("{key}: {value}"),
            })
            .collect(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item.as_str() {
                Some(text) => text.to_string(),
                None => item.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// One fixture as represented by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct ApiFixture {
    pub fixture: FixtureInfo,
    pub league: LeagueInfo,
    pub teams: TeamPair,
    pub goals: GoalPair,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureInfo {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub status: FixtureStatusInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureStatusInfo {
    pub short: String,
    #[serde(default)]
    pub long: Option<String>,
    #[serde(default)]
    pub elapsed: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueInfo {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub season: Option<i32>,
    #[serde(default)]
    pub round: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamPair {
    pub home: TeamInfo,
    pub away: TeamInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalPair {
    pub home: Option<i32>,
    pub away: Option<i32>,
}

/// One hit of the league search endpoint, used by administrative
/// tournament configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueHit {
    pub league: LeagueSummary,
    #[serde(default)]
    pub country: Option<CountrySummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueSummary {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountrySummary {
    pub name: String,
}

/// Source of day-scoped fixture data. Seam for testing the sync engine
/// without network traffic.
#[async_trait]
pub trait FixtureProvider: Send + Sync {
    async fn fixtures_by_date(&self, date: NaiveDate) -> Result<Vec<ApiFixture>>;
}

/// HTTP client for the fixture provider
#[derive(Clone)]
pub struct ApiFootballClient {
    http: reqwest::Client,
    base_url: String,
    host: String,
    api_key: Option<String>,
}

impl ApiFootballClient {
    pub fn new(cfg: &ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            host: cfg.host.clone(),
            api_key: cfg.key.clone().filter(|k| !k.trim().is_empty()),
        }
    }

    /// Authenticated GET returning the envelope's `response` array.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        // Credential check happens before any network traffic.
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProdeError::Configuration("fixture provider API key is not configured".to_string())
        })?;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "querying fixture provider");

        let response = self
            .http
            .get(&url)
            .query(params)
            .header(KEY_HEADER, api_key)
            .header(HOST_HEADER, &self.host)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProdeError::Transport(format!(
                "{path} returned HTTP {status}"
            )));
        }

        let envelope: Envelope<T> = response.json().await?;

        let errors = envelope_error_messages(&envelope.errors);
        if !errors.is_empty() {
            return Err(ProdeError::ProviderLogic(errors.join("; ")));
        }

        Ok(envelope.response)
    }

    /// Fetch one fixture by its provider id.
    pub async fn fixture_by_id(&self, fixture_id: i64) -> Result<Option<ApiFixture>> {
        let fixtures: Vec<ApiFixture> = self
            .get("/fixtures", &[("id", fixture_id.to_string())])
            .await?;
        Ok(fixtures.into_iter().next())
    }

    /// Search leagues by name, for mapping tournaments to league ids.
    pub async fn search_leagues(&self, query: &str) -> Result<Vec<LeagueHit>> {
        self.get("/leagues", &[("search", query.to_string())]).await
    }
}

#[async_trait]
impl FixtureProvider for ApiFootballClient {
    /// One date-scoped call; the restricted plan cannot query a future
    /// season by league, so the sync engine walks dates instead.
    async fn fixtures_by_date(&self, date: NaiveDate) -> Result<Vec<ApiFixture>> {
        self.get("/fixtures", &[("date", date.format("%Y-%m-%d").to_string())])
            .await
    }
}
