use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::lifecycle::{classify, LifecycleState};

pub type LeagueId = i64;
pub type MatchId = i64;
pub type UserId = i64;
pub type EventId = i64;
pub type PredictionId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct League {
    pub league_id: LeagueId,
    pub name: String,
    pub logo_url: Option<String>,
    pub active: bool,
    pub priority: i32,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub name: String,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub match_id: MatchId,
    pub league_id: LeagueId,
    pub start_time: DateTime<Utc>,
    /// UTC calendar date of the kick-off.
    pub date: NaiveDate,
    pub status_short: String,
    pub status_long: Option<String>,
    pub elapsed: Option<u32>,
    pub home_team: Team,
    pub away_team: Team,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

impl Match {
    pub fn lifecycle(&self) -> LifecycleState {
        classify(&self.status_short)
    }

    pub fn accepts_predictions(&self) -> bool {
        self.lifecycle().accepts_predictions()
    }

    pub fn final_score(&self) -> Option<FinalScore> {
        match (self.home_score, self.away_score) {
            (Some(home), Some(away)) => Some(FinalScore { home, away }),
            _ => None,
        }
    }

    /// Feed ordering: lifecycle state first, then earlier kick-off first.
    pub fn display_cmp(&self, other: &Match) -> Ordering {
        self.lifecycle()
            .cmp(&other.lifecycle())
            .then_with(|| self.start_time.cmp(&other.start_time))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home: u32,
    pub away: u32,
}

impl FinalScore {
    pub fn outcome(&self) -> Outcome {
        match self.home.cmp(&self.away) {
            Ordering::Greater => Outcome::Home,
            Ordering::Equal => Outcome::Draw,
            Ordering::Less => Outcome::Away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "HOME",
            Outcome::Draw => "DRAW",
            Outcome::Away => "AWAY",
        }
    }

    pub fn parse(value: &str) -> Option<Outcome> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HOME" => Some(Outcome::Home),
            "DRAW" => Some(Outcome::Draw),
            "AWAY" => Some(Outcome::Away),
            _ => None,
        }
    }
}

/// Exact-score guess attached to a prediction. Either both goals are picked
/// or none are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorePick {
    #[default]
    None,
    Exact { home: u32, away: u32 },
}

impl ScorePick {
    /// Builds a pick from two independently stored columns. A half-filled
    /// pair is treated as no pick at all.
    pub fn from_parts(home: Option<u32>, away: Option<u32>) -> ScorePick {
        match (home, away) {
            (Some(home), Some(away)) => ScorePick::Exact { home, away },
            _ => ScorePick::None,
        }
    }

    pub fn parts(&self) -> (Option<u32>, Option<u32>) {
        match *self {
            ScorePick::None => (None, None),
            ScorePick::Exact { home, away } => (Some(home), Some(away)),
        }
    }

    pub fn matches(&self, result: FinalScore) -> bool {
        matches!(*self, ScorePick::Exact { home, away } if home == result.home && away == result.away)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: PredictionId,
    pub match_id: MatchId,
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub outcome: Outcome,
    pub score_pick: ScorePick,
    pub points: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrediction {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub league_id: LeagueId,
    pub outcome: Outcome,
    pub score_pick: ScorePick,
    pub created_at: DateTime<Utc>,
}

/// A prediction returned together with the objects it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrediction {
    pub prediction: Prediction,
    pub user: User,
    pub fixture: Match,
    pub league: League,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Global,
    Open,
    Private,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Global => "GLOBAL",
            EventType::Open => "OPEN",
            EventType::Private => "PRIVATE",
        }
    }

    pub fn parse(value: &str) -> Option<EventType> {
        match value {
            "GLOBAL" => Some(EventType::Global),
            "OPEN" => Some(EventType::Open),
            "PRIVATE" => Some(EventType::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_type: EventType,
    pub invite_code: Option<String>,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_type: EventType,
}
