use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::types::{LeagueId, Match, MatchId, Team};

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Feed returned status {0}")]
    Status(u16),
    #[error("Malformed feed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Feed rejected the request: {0}")]
    Rejected(String),
    #[error("Invalid requests_per_second value: {0}")]
    InvalidRateLimit(u32),
}

impl FeedError {
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Http(error)
        }
    }
}

/// Third-party fixtures source.
#[async_trait]
pub trait FixtureFeed: Send + Sync {
    async fn fixtures_for_league(
        &self,
        league_id: LeagueId,
        date: NaiveDate,
    ) -> Result<Vec<FeedFixture>, FeedError>;

    /// Fixtures currently in play for any of `league_ids`, in a single request.
    async fn live_fixtures(&self, league_ids: &[LeagueId]) -> Result<Vec<FeedFixture>, FeedError>;

    async fn fixture(&self, match_id: MatchId) -> Result<Option<FeedFixture>, FeedError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedEnvelope {
    #[serde(default)]
    pub errors: serde_json::Value,
    #[serde(default)]
    pub response: Vec<FeedFixture>,
}

impl FeedEnvelope {
    /// The feed reports request problems in `errors` as either a list or a
    /// map, with a 200 status.
    pub fn error_message(&self) -> Option<String> {
        match &self.errors {
            serde_json::Value::Array(items) if !items.is_empty() => Some(self.errors.to_string()),
            serde_json::Value::Object(map) if !map.is_empty() => Some(self.errors.to_string()),
            serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedFixture {
    pub fixture: FixtureInfo,
    pub teams: FixtureTeams,
    pub goals: FixtureGoals,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureInfo {
    pub id: MatchId,
    /// Kick-off as unix seconds.
    pub timestamp: i64,
    pub date: Option<DateTime<chrono::FixedOffset>>,
    pub status: FixtureStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureStatus {
    pub short: String,
    pub long: Option<String>,
    pub elapsed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FixtureTeams {
    pub home: FeedTeam,
    pub away: FeedTeam,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedTeam {
    pub name: String,
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FixtureGoals {
    pub home: Option<u32>,
    pub away: Option<u32>,
}

impl FeedFixture {
    pub fn match_id(&self) -> MatchId {
        self.fixture.id
    }

    pub fn status_short(&self) -> &str {
        &self.fixture.status.short
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.fixture.timestamp, 0)
            .or_else(|| self.fixture.date.map(|d| d.with_timezone(&Utc)))
    }

    /// Builds a new match record for `league_id`. `None` when the fixture has
    /// no usable kick-off time.
    pub fn into_match(self, league_id: LeagueId) -> Option<Match> {
        let start_time = self.start_time()?;
        Some(Match {
            match_id: self.fixture.id,
            league_id,
            start_time,
            date: start_time.date_naive(),
            status_short: self.fixture.status.short,
            status_long: self.fixture.status.long,
            elapsed: self.fixture.status.elapsed,
            home_team: Team {
                name: self.teams.home.name,
                logo_url: self.teams.home.logo,
            },
            away_team: Team {
                name: self.teams.away.name,
                logo_url: self.teams.away.logo,
            },
            home_score: self.goals.home,
            away_score: self.goals.away,
        })
    }

    /// Copies the mutable fields (status, elapsed and goals) onto a stored match.
    pub fn apply_to(&self, fixture: &mut Match) {
        fixture.status_short = self.fixture.status.short.clone();
        fixture.status_long = self.fixture.status.long.clone();
        fixture.elapsed = self.fixture.status.elapsed;
        fixture.home_score = self.goals.home;
        fixture.away_score = self.goals.away;
    }
}
