#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bounty_prediction_engine::feed::{FeedError, FeedFixture, FixtureFeed};
use bounty_prediction_engine::memory_store::MemoryStore;
use bounty_prediction_engine::metrics::MetricsCollector;
use bounty_prediction_engine::push::{PushDispatcher, PushError};
use bounty_prediction_engine::types::{League, LeagueId, Match, MatchId, Team, User, UserId};
use bounty_prediction_engine::{Engine, EngineSettings};

pub fn feed_fixture(
    id: MatchId,
    kick_off: DateTime<Utc>,
    status: &str,
    elapsed: Option<u32>,
    goals: (Option<u32>, Option<u32>),
) -> FeedFixture {
    serde_json::from_value(json!({
        "fixture": {
            "id": id,
            "timestamp": kick_off.timestamp(),
            "date": kick_off.to_rfc3339(),
            "status": {"short": status, "long": null, "elapsed": elapsed}
        },
        "teams": {
            "home": {"name": "Arsenal", "logo": null},
            "away": {"name": "Chelsea", "logo": null}
        },
        "goals": {"home": goals.0, "away": goals.1}
    }))
    .unwrap()
}

pub fn stored_match(id: MatchId, league_id: LeagueId, kick_off: DateTime<Utc>, status: &str) -> Match {
    Match {
        match_id: id,
        league_id,
        start_time: kick_off,
        date: kick_off.date_naive(),
        status_short: status.to_string(),
        status_long: None,
        elapsed: None,
        home_team: Team {
            name: "Arsenal".to_string(),
            logo_url: None,
        },
        away_team: Team {
            name: "Chelsea".to_string(),
            logo_url: None,
        },
        home_score: None,
        away_score: None,
    }
}

pub fn league(id: LeagueId, priority: i32, active: bool) -> League {
    League {
        league_id: id,
        name: format!("League {}", id),
        logo_url: None,
        active,
        priority,
        country: None,
    }
}

pub fn user(id: UserId, name: &str) -> User {
    User {
        id,
        username: name.to_string(),
    }
}

/// Feed that answers from canned responses and records what was asked.
#[derive(Default)]
pub struct ScriptedFeed {
    pub by_league: Mutex<HashMap<LeagueId, Result<Vec<FeedFixture>, u16>>>,
    pub live: Mutex<Vec<FeedFixture>>,
    pub by_id: Mutex<HashMap<MatchId, FeedFixture>>,
    pub live_requests: Mutex<Vec<Vec<LeagueId>>>,
    pub fixture_requests: Mutex<Vec<MatchId>>,
}

impl ScriptedFeed {
    pub fn league_fixtures(&self, league_id: LeagueId, fixtures: Vec<FeedFixture>) {
        self.by_league.lock().unwrap().insert(league_id, Ok(fixtures));
    }

    pub fn league_failure(&self, league_id: LeagueId, status: u16) {
        self.by_league.lock().unwrap().insert(league_id, Err(status));
    }

    pub fn set_live(&self, fixtures: Vec<FeedFixture>) {
        *self.live.lock().unwrap() = fixtures;
    }

    pub fn set_fixture(&self, fixture: FeedFixture) {
        self.by_id.lock().unwrap().insert(fixture.match_id(), fixture);
    }
}

#[async_trait]
impl FixtureFeed for ScriptedFeed {
    async fn fixtures_for_league(
        &self,
        league_id: LeagueId,
        _date: NaiveDate,
    ) -> Result<Vec<FeedFixture>, FeedError> {
        match self.by_league.lock().unwrap().get(&league_id) {
            Some(Ok(fixtures)) => Ok(fixtures.clone()),
            Some(Err(status)) => Err(FeedError::Status(*status)),
            None => Ok(Vec::new()),
        }
    }

    async fn live_fixtures(&self, league_ids: &[LeagueId]) -> Result<Vec<FeedFixture>, FeedError> {
        self.live_requests.lock().unwrap().push(league_ids.to_vec());
        Ok(self.live.lock().unwrap().clone())
    }

    async fn fixture(&self, match_id: MatchId) -> Result<Option<FeedFixture>, FeedError> {
        self.fixture_requests.lock().unwrap().push(match_id);
        Ok(self.by_id.lock().unwrap().get(&match_id).cloned())
    }
}

#[derive(Default)]
pub struct RecordingPush {
    alerts: Mutex<Vec<(UserId, String)>>,
}

impl RecordingPush {
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushDispatcher for RecordingPush {
    async fn send(&self, user_id: UserId, alert: &str) -> Result<(), PushError> {
        self.alerts.lock().unwrap().push((user_id, alert.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub feed: Arc<ScriptedFeed>,
    pub push: Arc<RecordingPush>,
    pub engine: Engine,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let feed = Arc::new(ScriptedFeed::default());
    let push = Arc::new(RecordingPush::default());
    let engine = Engine::new(
        store.clone(),
        feed.clone(),
        push.clone(),
        EngineSettings::default(),
        MetricsCollector::new(),
    );
    Harness {
        store,
        feed,
        push,
        engine,
    }
}
