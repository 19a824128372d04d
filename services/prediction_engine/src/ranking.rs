use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::batch::{query_in_chunk_pairs, query_in_chunks};
use crate::engine::EngineError;
use crate::lifecycle::LifecycleState;
use crate::store::{EventPredictionQuery, ObjectStore};
use crate::types::{Event, EventId, EventType, League, ResolvedPrediction, User, UserId};

/// Who appears on an event leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMembershipPolicy {
    /// Anyone with at least one qualifying prediction.
    Implicit,
    /// Exactly these users, with or without predictions.
    Explicit(Vec<User>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub user: User,
    pub predictions: Vec<ResolvedPrediction>,
    pub points: u32,
}

impl RankEntry {
    fn new(user: User) -> Self {
        Self {
            user,
            predictions: Vec::new(),
            points: 0,
        }
    }

    /// Predictions of this entry that `viewer` may look at, latest kick-off
    /// first. Other users only see picks for matches that have started.
    pub fn visible_predictions(&self, viewer: UserId) -> Vec<&ResolvedPrediction> {
        let mut visible: Vec<&ResolvedPrediction> = self
            .predictions
            .iter()
            .filter(|p| viewer == self.user.id || p.fixture.lifecycle() != LifecycleState::NotStarted)
            .collect();
        visible.sort_by(|a, b| b.fixture.start_time.cmp(&a.fixture.start_time));
        visible
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub event: Event,
    pub entries: Vec<RankEntry>,
    pub leagues: Vec<League>,
}

/// Groups predictions per user, sums their points and ranks the entries by
/// points descending, then user id ascending.
pub fn aggregate(policy: &EventMembershipPolicy, predictions: Vec<ResolvedPrediction>) -> Vec<RankEntry> {
    let mut entries: BTreeMap<UserId, RankEntry> = BTreeMap::new();
    if let EventMembershipPolicy::Explicit(members) = policy {
        for member in members {
            entries.insert(member.id, RankEntry::new(member.clone()));
        }
    }
    let implicit = *policy == EventMembershipPolicy::Implicit;

    for prediction in predictions {
        if !implicit && !entries.contains_key(&prediction.user.id) {
            continue;
        }
        let entry = entries
            .entry(prediction.user.id)
            .or_insert_with(|| RankEntry::new(prediction.user.clone()));
        entry.points += prediction.prediction.points.unwrap_or(0);
        entry.predictions.push(prediction);
    }

    let mut ranked: Vec<RankEntry> = entries.into_values().collect();
    ranked.sort_by(|a, b| b.points.cmp(&a.points).then(a.user.id.cmp(&b.user.id)));
    ranked
}

pub fn sort_leagues_by_priority(leagues: &mut [League]) {
    leagues.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.league_id.cmp(&b.league_id)));
}

/// Builds the leaderboard of an event from the predictions made inside its
/// time window for its leagues. Read-only.
pub async fn compute_event_leaderboard(
    store: &dyn ObjectStore,
    event_id: EventId,
) -> Result<Leaderboard, EngineError> {
    let event = store
        .event(event_id)
        .await?
        .ok_or(EngineError::EventNotFound(event_id))?;

    let mut leagues = store.event_leagues(event_id).await?;
    sort_leagues_by_priority(&mut leagues);
    let league_ids: Vec<_> = leagues.iter().map(|l| l.league_id).collect();

    let policy = match event.event_type {
        EventType::Global => EventMembershipPolicy::Implicit,
        EventType::Open | EventType::Private => {
            EventMembershipPolicy::Explicit(store.event_members(event_id).await?)
        }
    };

    let limit = store.contained_in_limit();
    let (start, end) = (event.start_time, event.end_time);
    let predictions = match &policy {
        EventMembershipPolicy::Implicit => {
            query_in_chunks(&league_ids, limit, move |chunk| async move {
                let query = EventPredictionQuery {
                    league_ids: chunk,
                    user_ids: None,
                    start,
                    end,
                };
                store.event_predictions(&query).await
            })
            .await?
        }
        EventMembershipPolicy::Explicit(members) => {
            let user_ids: Vec<UserId> = members.iter().map(|u| u.id).collect();
            query_in_chunk_pairs(&league_ids, &user_ids, limit, move |leagues, users| async move {
                let query = EventPredictionQuery {
                    league_ids: leagues,
                    user_ids: Some(users),
                    start,
                    end,
                };
                store.event_predictions(&query).await
            })
            .await?
        }
    };
    debug!("Event {} has {} qualifying predictions", event_id, predictions.len());

    Ok(Leaderboard {
        entries: aggregate(&policy, predictions),
        event,
        leagues,
    })
}
