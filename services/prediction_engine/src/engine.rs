use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info};

use crate::api_football::ApiFootballClient;
use crate::config::EngineConfig;
use crate::events::{finish_expired_events, EventService};
use crate::feed::FixtureFeed;
use crate::ingestion::{self, IngestionReport};
use crate::match_feed::{self, DayFeeds, DEFAULT_FEED_LEAGUES, FEED_WINDOW_DAYS};
use crate::metrics::{JobRun, MetricsCollector};
use crate::pg_store::PgStore;
use crate::predictions::PredictionService;
use crate::push::{LogPushDispatcher, ParsePushDispatcher, PushDispatcher};
use crate::ranking::{self, Leaderboard};
use crate::refresh::{self, RefreshReport};
use crate::store::{ObjectStore, StoreError};
use crate::types::{EventId, LeagueId, MatchId, UserId};

/// Failures reported to the caller of an engine operation. Nothing is
/// written when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("User {0} does not exist")]
    MissingUser(UserId),
    #[error("Event {0} not found")]
    EventNotFound(EventId),
    #[error("No event with invite code {0}")]
    InviteCodeNotFound(String),
    #[error("Match {match_id} no longer accepts predictions (status {status})")]
    PredictionsClosed { match_id: MatchId, status: String },
    #[error("{kind} {id} referenced by the request does not exist")]
    MissingRelation { kind: &'static str, id: i64 },
    #[error("User {user_id} already has a prediction for match {match_id}")]
    DuplicatePrediction { user_id: UserId, match_id: MatchId },
    #[error("Event {0} is global; membership is implicit")]
    ImplicitMembership(EventId),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Leagues shown in the day feeds when the user has not picked any.
    pub default_feed_leagues: usize,
    /// Days either side of today loaded for the day feeds.
    pub feed_window_days: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_feed_leagues: DEFAULT_FEED_LEAGUES,
            feed_window_days: FEED_WINDOW_DAYS,
        }
    }
}

/// Host-facing entry points. Collaborators are injected at construction.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn ObjectStore>,
    feed: Arc<dyn FixtureFeed>,
    push: Arc<dyn PushDispatcher>,
    settings: EngineSettings,
    metrics: MetricsCollector,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        feed: Arc<dyn FixtureFeed>,
        push: Arc<dyn PushDispatcher>,
        settings: EngineSettings,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            store,
            feed,
            push,
            settings,
            metrics,
        }
    }

    /// Wires the Postgres store, the API-Football client and the configured
    /// push dispatcher.
    pub async fn from_config(config: &EngineConfig, metrics: MetricsCollector) -> anyhow::Result<Self> {
        let store = PgStore::connect(config)
            .await
            .context("Failed to connect to the database")?;
        let feed = ApiFootballClient::new(&config.feed, metrics.clone())
            .context("Failed to create the fixtures feed client")?;
        let push: Arc<dyn PushDispatcher> = match &config.push.server_url {
            Some(url) => Arc::new(
                ParsePushDispatcher::new(url, &config.push).context("Failed to create the push client")?,
            ),
            None => {
                info!("No push server configured, notifications will only be logged");
                Arc::new(LogPushDispatcher)
            }
        };
        Ok(Self::new(
            Arc::new(store),
            Arc::new(feed),
            push,
            EngineSettings::default(),
            metrics,
        ))
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn record<T, E: Display>(
        &self,
        job: &str,
        result: Result<T, E>,
        counts: impl Fn(&T) -> (usize, usize),
    ) -> Option<T> {
        let mut run = JobRun::new(job);
        let value = match result {
            Ok(value) => {
                let (processed, failed) = counts(&value);
                run.complete(processed as u64, failed as u64);
                Some(value)
            }
            Err(e) => {
                error!("Job {} failed: {}", job, e);
                run.fail(&e.to_string());
                None
            }
        };
        self.metrics.record_job_run(run);
        value
    }

    pub async fn run_fixture_ingestion(&self, now: DateTime<Utc>) -> IngestionReport {
        let result = ingestion::run_fixture_ingestion(self.store.as_ref(), self.feed.as_ref(), now).await;
        self.record("fixture-ingestion", result, |r| (r.matches_saved, r.leagues_failed))
            .unwrap_or_default()
    }

    pub async fn run_live_refresh(&self) -> RefreshReport {
        let result =
            refresh::run_live_refresh(self.store.as_ref(), self.feed.as_ref(), self.push.as_ref()).await;
        self.record("live-refresh", result, |r| (r.matches_updated, r.fetch_failed + r.scoring_failed))
            .unwrap_or_default()
    }

    pub async fn run_result_refresh(&self, now: DateTime<Utc>) -> RefreshReport {
        let result =
            refresh::run_result_refresh(self.store.as_ref(), self.feed.as_ref(), self.push.as_ref(), now)
                .await;
        self.record("result-refresh", result, |r| (r.matches_updated, r.fetch_failed + r.scoring_failed))
            .unwrap_or_default()
    }

    /// Marks events whose end has passed as finished. Returns how many were
    /// updated.
    pub async fn run_event_housekeeping(&self, now: DateTime<Utc>) -> usize {
        let result = finish_expired_events(self.store.as_ref(), now).await;
        self.record("event-housekeeping", result, |count| (*count, 0))
            .unwrap_or_default()
    }

    pub async fn compute_event_leaderboard(&self, event_id: EventId) -> Result<Leaderboard, EngineError> {
        ranking::compute_event_leaderboard(self.store.as_ref(), event_id).await
    }

    pub fn events(&self) -> EventService {
        EventService::new(self.store())
    }

    pub fn predictions(&self) -> PredictionService {
        PredictionService::new(self.store())
    }

    pub async fn day_feeds(
        &self,
        user_id: UserId,
        selected_leagues: Option<&[LeagueId]>,
        today: NaiveDate,
    ) -> Result<DayFeeds, EngineError> {
        match_feed::build_day_feeds(self.store.as_ref(), &self.settings, user_id, selected_leagues, today).await
    }
}
