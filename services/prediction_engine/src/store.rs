use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{
    Event, EventId, League, LeagueId, Match, MatchId, NewEvent, NewPrediction, Prediction,
    PredictionId, ResolvedPrediction, User, UserId,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Contained-in filter with {len} keys exceeds the store limit of {limit}")]
    ContainedInLimitExceeded { len: usize, limit: usize },
    #[error("Duplicate {0}")]
    Duplicate(String),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Filter for the predictions that count towards an event leaderboard.
///
/// `league_ids` and `user_ids` are contained-in filters and must each stay
/// within the store's limit. `user_ids = None` means any user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPredictionQuery {
    pub league_ids: Vec<LeagueId>,
    pub user_ids: Option<Vec<UserId>>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Persistence seam for every object the engine reads or writes.
///
/// Methods taking a slice of ids are contained-in queries. Implementations
/// reject slices longer than [`ObjectStore::contained_in_limit`]; callers go
/// through [`crate::batch`] to stay within it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn contained_in_limit(&self) -> usize;

    /// Leagues with `active = true`, highest priority first.
    async fn active_leagues(&self) -> Result<Vec<League>, StoreError>;
    async fn all_leagues(&self) -> Result<Vec<League>, StoreError>;
    async fn event_leagues(&self, event_id: EventId) -> Result<Vec<League>, StoreError>;

    /// Upserts by external match id.
    async fn save_matches(&self, matches: &[Match]) -> Result<(), StoreError>;
    /// Inserts new matches. For stored ones only the schedule and teams are
    /// updated, plus the status while the stored match has not started.
    async fn save_scheduled_matches(&self, matches: &[Match]) -> Result<(), StoreError>;
    async fn match_by_id(&self, match_id: MatchId) -> Result<Option<Match>, StoreError>;
    async fn matches_by_ids(&self, match_ids: &[MatchId]) -> Result<Vec<Match>, StoreError>;
    /// Matches that kicked off before `started_before` and whose status is
    /// not one of `excluded_statuses`.
    async fn matches_awaiting_result(
        &self,
        started_before: DateTime<Utc>,
        excluded_statuses: &[&str],
    ) -> Result<Vec<Match>, StoreError>;
    async fn matches_for_leagues(
        &self,
        league_ids: &[LeagueId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Match>, StoreError>;

    async fn predictions_for_match(&self, match_id: MatchId) -> Result<Vec<Prediction>, StoreError>;
    async fn predictions_for_user_matches(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>, StoreError>;
    async fn prediction_for_user_match(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<Option<Prediction>, StoreError>;
    async fn insert_prediction(&self, prediction: NewPrediction) -> Result<Prediction, StoreError>;
    async fn update_prediction(&self, prediction: &Prediction) -> Result<(), StoreError>;
    async fn save_prediction_points(&self, points: &[(PredictionId, u32)]) -> Result<(), StoreError>;
    async fn event_predictions(
        &self,
        query: &EventPredictionQuery,
    ) -> Result<Vec<ResolvedPrediction>, StoreError>;

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    async fn event(&self, event_id: EventId) -> Result<Option<Event>, StoreError>;
    async fn event_by_invite_code(&self, code: &str) -> Result<Option<Event>, StoreError>;
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;
    /// Sets the invite code unless one is already present. Returns whether
    /// the code was written.
    async fn assign_invite_code(&self, event_id: EventId, code: &str) -> Result<bool, StoreError>;
    async fn event_members(&self, event_id: EventId) -> Result<Vec<User>, StoreError>;
    async fn add_event_members(&self, event_id: EventId, user_ids: &[UserId]) -> Result<(), StoreError>;
    async fn remove_event_members(&self, event_id: EventId, user_ids: &[UserId]) -> Result<(), StoreError>;
    async fn add_event_leagues(&self, event_id: EventId, league_ids: &[LeagueId]) -> Result<(), StoreError>;
    /// Non-global events the user is a member of.
    async fn events_for_member(&self, user_id: UserId) -> Result<Vec<Event>, StoreError>;
    async fn global_events(&self) -> Result<Vec<Event>, StoreError>;
    async fn expired_unfinished_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError>;
    async fn mark_events_finished(&self, event_ids: &[EventId]) -> Result<(), StoreError>;
}

pub(crate) fn check_contained_in(len: usize, limit: usize) -> Result<(), StoreError> {
    if len > limit {
        return Err(StoreError::ContainedInLimitExceeded { len, limit });
    }
    Ok(())
}
