use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::FeedConfig;
use crate::feed::{FeedEnvelope, FeedError, FeedFixture, FixtureFeed};
use crate::metrics::MetricsCollector;
use crate::types::{LeagueId, MatchId};

/// Fixtures feed client for the API-Football v3 HTTP API.
pub struct ApiFootballClient {
    client: reqwest::Client,
    base_url: String,
    season: i32,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    metrics: MetricsCollector,
}

impl ApiFootballClient {
    pub fn new(config: &FeedConfig, metrics: MetricsCollector) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-rapidapi-host",
            HeaderValue::from_str(&config.api_host).map_err(|e| FeedError::Rejected(e.to_string()))?,
        );
        headers.insert(
            "x-rapidapi-key",
            HeaderValue::from_str(&config.api_key).map_err(|e| FeedError::Rejected(e.to_string()))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second)
                .ok_or(FeedError::InvalidRateLimit(config.requests_per_second))?,
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            season: config.season,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            metrics,
        })
    }

    async fn get_fixtures(&self, query: &[(&str, String)]) -> Result<Vec<FeedFixture>, FeedError> {
        let wait_start = Instant::now();
        self.rate_limiter.until_ready().await;
        self.metrics.record_rate_limit_wait(wait_start.elapsed());

        let url = format!("{}/fixtures", self.base_url);
        debug!("GET {} {:?}", url, query);

        let tracker = self.metrics.record_request_start();
        let result = self.send(&url, query).await;
        tracker.finish(result.is_ok());

        if let Err(e) = &result {
            error!("Feed request {:?} failed: {}", query, e);
            self.metrics.record_error(e.to_string());
        }
        result
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<FeedFixture>, FeedError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(FeedError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(FeedError::from_reqwest)?;
        let envelope: FeedEnvelope = serde_json::from_str(&body)?;
        if let Some(message) = envelope.error_message() {
            return Err(FeedError::Rejected(message));
        }
        Ok(envelope.response)
    }
}

#[async_trait]
impl FixtureFeed for ApiFootballClient {
    async fn fixtures_for_league(
        &self,
        league_id: LeagueId,
        date: NaiveDate,
    ) -> Result<Vec<FeedFixture>, FeedError> {
        let day = date.format("%Y-%m-%d").to_string();
        self.get_fixtures(&[
            ("league", league_id.to_string()),
            ("season", self.season.to_string()),
            ("from", day.clone()),
            ("to", day),
        ])
        .await
    }

    async fn live_fixtures(&self, league_ids: &[LeagueId]) -> Result<Vec<FeedFixture>, FeedError> {
        if league_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = league_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-");
        self.get_fixtures(&[("live", ids)]).await
    }

    async fn fixture(&self, match_id: MatchId) -> Result<Option<FeedFixture>, FeedError> {
        let mut fixtures = self.get_fixtures(&[("id", match_id.to_string())]).await?;
        if fixtures.is_empty() {
            return Ok(None);
        }
        Ok(Some(fixtures.swap_remove(0)))
    }
}
