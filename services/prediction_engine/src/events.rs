use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::EngineError;
use crate::store::{ObjectStore, StoreError};
use crate::types::{Event, EventId, EventType, LeagueId, NewEvent, UserId};

pub const INVITE_CODE_LENGTH: usize = 6;
const INVITE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const INVITE_CODE_SPACE: u64 = 36u64.pow(INVITE_CODE_LENGTH as u32);
// Coprime with 36, so the affine map below is a permutation of the code space.
const INVITE_MULTIPLIER: u64 = 1_580_030_173;
const INVITE_OFFSET: u64 = 1_234_567_890;

/// Deterministic 6 character invite code for an event. Ids below 36^6 map
/// to distinct codes.
pub fn invite_code_for(event_id: EventId) -> String {
    let id = (event_id as i128).rem_euclid(INVITE_CODE_SPACE as i128) as u64;
    let mut value = (id * INVITE_MULTIPLIER + INVITE_OFFSET) % INVITE_CODE_SPACE;

    let mut code = String::with_capacity(INVITE_CODE_LENGTH);
    for _ in 0..INVITE_CODE_LENGTH {
        code.push(INVITE_ALPHABET[(value % 36) as usize] as char);
        value /= 36;
    }
    code
}

pub fn normalize_invite_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Sets `finished` on every unfinished event whose end has passed.
pub async fn finish_expired_events(store: &dyn ObjectStore, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let expired = store.expired_unfinished_events(now).await?;
    if expired.is_empty() {
        debug!("No events to finish");
        return Ok(0);
    }
    let ids: Vec<EventId> = expired.iter().map(|e| e.id).collect();
    store.mark_events_finished(&ids).await?;
    info!("Finished {} events", ids.len());
    Ok(ids.len())
}

/// Creation and membership of user events.
pub struct EventService {
    store: Arc<dyn ObjectStore>,
}

impl EventService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    async fn require_user(&self, user_id: UserId) -> Result<(), EngineError> {
        match self.store.user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::MissingUser(user_id)),
        }
    }

    /// Creates an open event with the creator as its first member.
    pub async fn create_event(
        &self,
        creator: UserId,
        name: &str,
        league_ids: &[LeagueId],
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Event, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidEvent("name is empty".to_string()));
        }
        if end_time < start_time {
            return Err(EngineError::InvalidEvent("end is before start".to_string()));
        }
        if league_ids.is_empty() {
            return Err(EngineError::InvalidEvent("no leagues selected".to_string()));
        }
        self.require_user(creator).await?;

        let known: Vec<LeagueId> = self.store.all_leagues().await?.iter().map(|l| l.league_id).collect();
        if let Some(missing) = league_ids.iter().find(|id| !known.contains(id)) {
            return Err(EngineError::MissingRelation {
                kind: "league",
                id: *missing,
            });
        }

        let mut event = self
            .store
            .insert_event(NewEvent {
                name: name.to_string(),
                start_time,
                end_time,
                event_type: EventType::Open,
            })
            .await?;
        event.invite_code = Some(self.ensure_invite_code(event.id).await?);
        self.store.add_event_members(event.id, &[creator]).await?;
        self.store.add_event_leagues(event.id, league_ids).await?;

        info!("User {} created event {} ({})", creator, event.id, event.name);
        Ok(event)
    }

    /// Returns the event's invite code, assigning it first if the event has
    /// none. An existing code is never replaced.
    pub async fn ensure_invite_code(&self, event_id: EventId) -> Result<String, EngineError> {
        let event = self
            .store
            .event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?;
        if let Some(code) = event.invite_code {
            return Ok(code);
        }

        let code = invite_code_for(event_id);
        if self.store.assign_invite_code(event_id, &code).await? {
            return Ok(code);
        }
        // Another writer got there first.
        self.store
            .event(event_id)
            .await?
            .and_then(|e| e.invite_code)
            .ok_or(EngineError::EventNotFound(event_id))
    }

    pub async fn join_event(&self, code: &str, user_id: UserId) -> Result<Event, EngineError> {
        let code = normalize_invite_code(code);
        let event = self
            .store
            .event_by_invite_code(&code)
            .await?
            .ok_or_else(|| EngineError::InviteCodeNotFound(code.clone()))?;
        if event.event_type == EventType::Global {
            return Err(EngineError::ImplicitMembership(event.id));
        }
        self.require_user(user_id).await?;

        self.store.add_event_members(event.id, &[user_id]).await?;
        info!("User {} joined event {}", user_id, event.id);
        Ok(event)
    }

    pub async fn leave_event(&self, event_id: EventId, user_id: UserId) -> Result<(), EngineError> {
        let event = self
            .store
            .event(event_id)
            .await?
            .ok_or(EngineError::EventNotFound(event_id))?;
        if event.event_type == EventType::Global {
            return Err(EngineError::ImplicitMembership(event_id));
        }
        self.store.remove_event_members(event_id, &[user_id]).await?;
        info!("User {} left event {}", user_id, event_id);
        Ok(())
    }

    /// The user's own events plus every global event, latest end first.
    pub async fn events_for_user(&self, user_id: UserId) -> Result<Vec<Event>, EngineError> {
        let mut events = self.store.events_for_member(user_id).await?;
        events.extend(self.store.global_events().await?);
        events.sort_by(|a, b| b.end_time.cmp(&a.end_time).then(a.id.cmp(&b.id)));
        Ok(events)
    }
}
