use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::batch::DEFAULT_CONTAINED_IN_LIMIT;
use crate::lifecycle::NOT_STARTED_CODES;
use crate::store::{check_contained_in, EventPredictionQuery, ObjectStore, StoreError};
use crate::types::{
    Event, EventId, EventType, League, LeagueId, Match, MatchId, NewEvent, NewPrediction,
    Prediction, PredictionId, ResolvedPrediction, User, UserId,
};

#[derive(Default)]
struct State {
    leagues: BTreeMap<LeagueId, League>,
    users: BTreeMap<UserId, User>,
    matches: BTreeMap<MatchId, Match>,
    predictions: BTreeMap<PredictionId, Prediction>,
    events: BTreeMap<EventId, Event>,
    event_members: BTreeMap<EventId, BTreeSet<UserId>>,
    event_leagues: BTreeMap<EventId, BTreeSet<LeagueId>>,
    next_prediction_id: PredictionId,
    next_event_id: EventId,
    failing_match_leagues: HashSet<LeagueId>,
    fail_point_saves: bool,
}

impl State {
    fn check_match_writes(&self, matches: &[Match]) -> Result<(), StoreError> {
        match matches
            .iter()
            .find(|m| self.failing_match_leagues.contains(&m.league_id))
        {
            Some(failing) => Err(StoreError::CorruptRow(format!(
                "rejected write for league {}",
                failing.league_id
            ))),
            None => Ok(()),
        }
    }
}

/// In-process [`ObjectStore`] with the same contained-in limit as the real
/// backend. Keeps a count of contained-in queries and can be told to fail
/// specific writes.
pub struct MemoryStore {
    state: Mutex<State>,
    limit: usize,
    contained_in_queries: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINED_IN_LIMIT)
    }
}

impl MemoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(State {
                next_prediction_id: 1,
                next_event_id: 1,
                ..State::default()
            }),
            limit,
            contained_in_queries: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn contained_in(&self, len: usize) -> Result<(), StoreError> {
        self.contained_in_queries.fetch_add(1, Ordering::SeqCst);
        check_contained_in(len, self.limit)
    }

    pub fn contained_in_queries(&self) -> usize {
        self.contained_in_queries.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.contained_in_queries.store(0, Ordering::SeqCst);
    }

    pub fn insert_league(&self, league: League) {
        self.lock().leagues.insert(league.league_id, league);
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    pub fn insert_match(&self, fixture: Match) {
        self.lock().matches.insert(fixture.match_id, fixture);
    }

    /// Stores an event as-is, keeping its id.
    pub fn insert_event_with_id(&self, event: Event) {
        let mut state = self.lock();
        state.next_event_id = state.next_event_id.max(event.id + 1);
        state.events.insert(event.id, event);
    }

    pub fn fail_match_saves_for_league(&self, league_id: LeagueId) {
        self.lock().failing_match_leagues.insert(league_id);
    }

    pub fn fail_point_saves(&self, fail: bool) {
        self.lock().fail_point_saves = fail;
    }

    pub fn stored_match(&self, match_id: MatchId) -> Option<Match> {
        self.lock().matches.get(&match_id).cloned()
    }

    pub fn stored_matches(&self) -> Vec<Match> {
        self.lock().matches.values().cloned().collect()
    }

    pub fn stored_predictions(&self) -> Vec<Prediction> {
        self.lock().predictions.values().cloned().collect()
    }

    pub fn stored_event(&self, event_id: EventId) -> Option<Event> {
        self.lock().events.get(&event_id).cloned()
    }

    pub fn member_ids(&self, event_id: EventId) -> Vec<UserId> {
        self.lock()
            .event_members
            .get(&event_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn league_ids_for_event(&self, event_id: EventId) -> Vec<LeagueId> {
        self.lock()
            .event_leagues
            .get(&event_id)
            .map(|leagues| leagues.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn sorted_by_priority(mut leagues: Vec<League>) -> Vec<League> {
    leagues.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.league_id.cmp(&b.league_id)));
    leagues
}

fn require<T: Clone, K: Ord + ToString>(
    map: &BTreeMap<K, T>,
    key: K,
    kind: &'static str,
) -> Result<T, StoreError> {
    map.get(&key).cloned().ok_or_else(|| StoreError::NotFound {
        kind,
        id: key.to_string(),
    })
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn contained_in_limit(&self) -> usize {
        self.limit
    }

    async fn active_leagues(&self) -> Result<Vec<League>, StoreError> {
        let leagues = self.lock().leagues.values().filter(|l| l.active).cloned().collect();
        Ok(sorted_by_priority(leagues))
    }

    async fn all_leagues(&self) -> Result<Vec<League>, StoreError> {
        Ok(sorted_by_priority(self.lock().leagues.values().cloned().collect()))
    }

    async fn event_leagues(&self, event_id: EventId) -> Result<Vec<League>, StoreError> {
        let state = self.lock();
        let leagues = state
            .event_leagues
            .get(&event_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.leagues.get(id).cloned())
            .collect();
        Ok(leagues)
    }

    async fn save_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check_match_writes(matches)?;
        for fixture in matches {
            state.matches.insert(fixture.match_id, fixture.clone());
        }
        Ok(())
    }

    async fn save_scheduled_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check_match_writes(matches)?;
        for fixture in matches {
            match state.matches.entry(fixture.match_id) {
                Entry::Occupied(mut entry) => {
                    let stored = entry.get_mut();
                    if NOT_STARTED_CODES.contains(&stored.status_short.as_str()) {
                        stored.status_short = fixture.status_short.clone();
                        stored.status_long = fixture.status_long.clone();
                    }
                    stored.start_time = fixture.start_time;
                    stored.date = fixture.date;
                    stored.home_team = fixture.home_team.clone();
                    stored.away_team = fixture.away_team.clone();
                }
                Entry::Vacant(entry) => {
                    entry.insert(fixture.clone());
                }
            }
        }
        Ok(())
    }

    async fn match_by_id(&self, match_id: MatchId) -> Result<Option<Match>, StoreError> {
        Ok(self.lock().matches.get(&match_id).cloned())
    }

    async fn matches_by_ids(&self, match_ids: &[MatchId]) -> Result<Vec<Match>, StoreError> {
        self.contained_in(match_ids.len())?;
        let state = self.lock();
        Ok(match_ids
            .iter()
            .filter_map(|id| state.matches.get(id).cloned())
            .collect())
    }

    async fn matches_awaiting_result(
        &self,
        started_before: DateTime<Utc>,
        excluded_statuses: &[&str],
    ) -> Result<Vec<Match>, StoreError> {
        Ok(self
            .lock()
            .matches
            .values()
            .filter(|m| m.start_time < started_before)
            .filter(|m| !excluded_statuses.contains(&m.status_short.as_str()))
            .cloned()
            .collect())
    }

    async fn matches_for_leagues(
        &self,
        league_ids: &[LeagueId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Match>, StoreError> {
        self.contained_in(league_ids.len())?;
        Ok(self
            .lock()
            .matches
            .values()
            .filter(|m| league_ids.contains(&m.league_id) && m.date >= from && m.date <= to)
            .cloned()
            .collect())
    }

    async fn predictions_for_match(&self, match_id: MatchId) -> Result<Vec<Prediction>, StoreError> {
        Ok(self
            .lock()
            .predictions
            .values()
            .filter(|p| p.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn predictions_for_user_matches(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>, StoreError> {
        self.contained_in(match_ids.len())?;
        Ok(self
            .lock()
            .predictions
            .values()
            .filter(|p| p.user_id == user_id && match_ids.contains(&p.match_id))
            .cloned()
            .collect())
    }

    async fn prediction_for_user_match(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<Option<Prediction>, StoreError> {
        Ok(self
            .lock()
            .predictions
            .values()
            .find(|p| p.user_id == user_id && p.match_id == match_id)
            .cloned())
    }

    async fn insert_prediction(&self, prediction: NewPrediction) -> Result<Prediction, StoreError> {
        let mut state = self.lock();
        if state
            .predictions
            .values()
            .any(|p| p.user_id == prediction.user_id && p.match_id == prediction.match_id)
        {
            return Err(StoreError::Duplicate(format!(
                "prediction for user {} and match {}",
                prediction.user_id, prediction.match_id
            )));
        }
        let id = state.next_prediction_id;
        state.next_prediction_id += 1;
        let stored = Prediction {
            id,
            match_id: prediction.match_id,
            user_id: prediction.user_id,
            league_id: prediction.league_id,
            outcome: prediction.outcome,
            score_pick: prediction.score_pick,
            points: None,
            created_at: prediction.created_at,
        };
        state.predictions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        let mut state = self.lock();
        match state.predictions.get_mut(&prediction.id) {
            Some(existing) => {
                *existing = prediction.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "prediction",
                id: prediction.id.to_string(),
            }),
        }
    }

    async fn save_prediction_points(&self, points: &[(PredictionId, u32)]) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_point_saves {
            return Err(StoreError::CorruptRow("point save rejected".to_string()));
        }
        for (id, value) in points {
            if let Some(prediction) = state.predictions.get_mut(id) {
                prediction.points = Some(*value);
            }
        }
        Ok(())
    }

    async fn event_predictions(
        &self,
        query: &EventPredictionQuery,
    ) -> Result<Vec<ResolvedPrediction>, StoreError> {
        self.contained_in(query.league_ids.len())?;
        if let Some(user_ids) = &query.user_ids {
            check_contained_in(user_ids.len(), self.limit)?;
        }

        let state = self.lock();
        let mut resolved = Vec::new();
        for prediction in state.predictions.values() {
            if !query.league_ids.contains(&prediction.league_id)
                || prediction.created_at < query.start
                || prediction.created_at > query.end
            {
                continue;
            }
            if let Some(user_ids) = &query.user_ids {
                if !user_ids.contains(&prediction.user_id) {
                    continue;
                }
            }
            resolved.push(ResolvedPrediction {
                prediction: prediction.clone(),
                user: require(&state.users, prediction.user_id, "user")?,
                fixture: require(&state.matches, prediction.match_id, "match")?,
                league: require(&state.leagues, prediction.league_id, "league")?,
            });
        }
        Ok(resolved)
    }

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.get(&user_id).cloned())
    }

    async fn event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.lock().events.get(&event_id).cloned())
    }

    async fn event_by_invite_code(&self, code: &str) -> Result<Option<Event>, StoreError> {
        Ok(self
            .lock()
            .events
            .values()
            .find(|e| e.invite_code.as_deref() == Some(code))
            .cloned())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let mut state = self.lock();
        let id = state.next_event_id;
        state.next_event_id += 1;
        let stored = Event {
            id,
            name: event.name,
            start_time: event.start_time,
            end_time: event.end_time,
            event_type: event.event_type,
            invite_code: None,
            finished: false,
        };
        state.events.insert(id, stored.clone());
        Ok(stored)
    }

    async fn assign_invite_code(&self, event_id: EventId, code: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let event = state.events.get_mut(&event_id).ok_or_else(|| StoreError::NotFound {
            kind: "event",
            id: event_id.to_string(),
        })?;
        if event.invite_code.is_some() {
            return Ok(false);
        }
        event.invite_code = Some(code.to_string());
        Ok(true)
    }

    async fn event_members(&self, event_id: EventId) -> Result<Vec<User>, StoreError> {
        let state = self.lock();
        Ok(state
            .event_members
            .get(&event_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn add_event_members(&self, event_id: EventId, user_ids: &[UserId]) -> Result<(), StoreError> {
        self.lock()
            .event_members
            .entry(event_id)
            .or_default()
            .extend(user_ids.iter().copied());
        Ok(())
    }

    async fn remove_event_members(&self, event_id: EventId, user_ids: &[UserId]) -> Result<(), StoreError> {
        if let Some(members) = self.lock().event_members.get_mut(&event_id) {
            for id in user_ids {
                members.remove(id);
            }
        }
        Ok(())
    }

    async fn add_event_leagues(&self, event_id: EventId, league_ids: &[LeagueId]) -> Result<(), StoreError> {
        self.lock()
            .event_leagues
            .entry(event_id)
            .or_default()
            .extend(league_ids.iter().copied());
        Ok(())
    }

    async fn events_for_member(&self, user_id: UserId) -> Result<Vec<Event>, StoreError> {
        let state = self.lock();
        Ok(state
            .events
            .values()
            .filter(|e| e.event_type != EventType::Global)
            .filter(|e| {
                state
                    .event_members
                    .get(&e.id)
                    .is_some_and(|members| members.contains(&user_id))
            })
            .cloned()
            .collect())
    }

    async fn global_events(&self) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .lock()
            .events
            .values()
            .filter(|e| e.event_type == EventType::Global)
            .cloned()
            .collect())
    }

    async fn expired_unfinished_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .lock()
            .events
            .values()
            .filter(|e| !e.finished && e.end_time < now)
            .cloned()
            .collect())
    }

    async fn mark_events_finished(&self, event_ids: &[EventId]) -> Result<(), StoreError> {
        let mut state = self.lock();
        for id in event_ids {
            if let Some(event) = state.events.get_mut(id) {
                event.finished = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Outcome, ScorePick, Team};
    use chrono::TimeZone;

    fn league(id: LeagueId, priority: i32, active: bool) -> League {
        League {
            league_id: id,
            name: format!("League {}", id),
            logo_url: None,
            active,
            priority,
            country: None,
        }
    }

    fn fixture(id: MatchId, league_id: LeagueId) -> Match {
        let start_time = Utc.with_ymd_and_hms(2024, 9, 1, 15, 0, 0).unwrap();
        Match {
            match_id: id,
            league_id,
            start_time,
            date: start_time.date_naive(),
            status_short: "NS".to_string(),
            status_long: None,
            elapsed: None,
            home_team: Team { name: "Home".to_string(), logo_url: None },
            away_team: Team { name: "Away".to_string(), logo_url: None },
            home_score: None,
            away_score: None,
        }
    }

    #[tokio::test]
    async fn test_active_leagues_sorted_by_priority() {
        let store = MemoryStore::default();
        store.insert_league(league(1, 5, true));
        store.insert_league(league(2, 9, true));
        store.insert_league(league(3, 20, false));

        let ids: Vec<_> = store.active_leagues().await.unwrap().iter().map(|l| l.league_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_contained_in_limit_is_enforced() {
        let store = MemoryStore::new(3);
        let err = store.matches_by_ids(&[1, 2, 3, 4]).await.unwrap_err();
        assert!(matches!(err, StoreError::ContainedInLimitExceeded { len: 4, limit: 3 }));
        assert!(store.matches_by_ids(&[1, 2, 3]).await.unwrap().is_empty());
        assert_eq!(store.contained_in_queries(), 2);
    }

    #[tokio::test]
    async fn test_save_matches_upserts_by_id() {
        let store = MemoryStore::default();
        let mut first = fixture(10, 39);
        store.save_matches(&[first.clone()]).await.unwrap();
        first.status_short = "FT".to_string();
        store.save_matches(&[first]).await.unwrap();

        assert_eq!(store.stored_matches().len(), 1);
        assert_eq!(store.stored_match(10).unwrap().status_short, "FT");
    }

    #[tokio::test]
    async fn test_scheduled_save_keeps_live_state() {
        let store = MemoryStore::default();
        let mut live = fixture(10, 39);
        live.status_short = "2H".to_string();
        live.elapsed = Some(70);
        live.home_score = Some(1);
        live.away_score = Some(0);
        store.insert_match(live.clone());

        let mut listed = fixture(10, 39);
        listed.status_short = "NS".to_string();
        listed.start_time = live.start_time + chrono::Duration::minutes(15);
        listed.home_team.name = "Renamed".to_string();
        store.save_scheduled_matches(&[listed.clone(), fixture(11, 39)]).await.unwrap();

        let stored = store.stored_match(10).unwrap();
        assert_eq!(stored.status_short, "2H");
        assert_eq!(stored.elapsed, Some(70));
        assert_eq!((stored.home_score, stored.away_score), (Some(1), Some(0)));
        assert_eq!(stored.start_time, listed.start_time);
        assert_eq!(stored.home_team.name, "Renamed");
        assert!(store.stored_match(11).is_some());
    }

    #[tokio::test]
    async fn test_duplicate_prediction_is_rejected() {
        let store = MemoryStore::default();
        let new = NewPrediction {
            match_id: 10,
            user_id: 1,
            league_id: 39,
            outcome: Outcome::Home,
            score_pick: ScorePick::None,
            created_at: Utc::now(),
        };
        store.insert_prediction(new.clone()).await.unwrap();
        assert!(matches!(store.insert_prediction(new).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_invite_code_assigned_once() {
        let store = MemoryStore::default();
        let event = store
            .insert_event(NewEvent {
                name: "Friends".to_string(),
                start_time: Utc::now(),
                end_time: Utc::now(),
                event_type: EventType::Open,
            })
            .await
            .unwrap();

        assert!(store.assign_invite_code(event.id, "ABC123").await.unwrap());
        assert!(!store.assign_invite_code(event.id, "ZZZ999").await.unwrap());
        assert_eq!(store.stored_event(event.id).unwrap().invite_code.as_deref(), Some("ABC123"));
    }
}
