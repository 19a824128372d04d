use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::batch::query_in_chunks;
use crate::engine::EngineError;
use crate::store::{ObjectStore, StoreError};
use crate::types::{MatchId, NewPrediction, Outcome, Prediction, ScorePick, UserId};

pub struct PredictionService {
    store: Arc<dyn ObjectStore>,
}

impl PredictionService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Creates the user's prediction for a match, or replaces the picks of
    /// the one they already have. Only matches that have not started accept
    /// predictions, judged by both the stored status and the kick-off time.
    pub async fn submit_prediction(
        &self,
        user_id: UserId,
        match_id: MatchId,
        outcome: Outcome,
        score_pick: ScorePick,
        now: DateTime<Utc>,
    ) -> Result<Prediction, EngineError> {
        if self.store.user(user_id).await?.is_none() {
            return Err(EngineError::MissingUser(user_id));
        }
        let fixture = self
            .store
            .match_by_id(match_id)
            .await?
            .ok_or(EngineError::MissingRelation {
                kind: "match",
                id: match_id,
            })?;
        if !fixture.accepts_predictions() || now >= fixture.start_time {
            return Err(EngineError::PredictionsClosed {
                match_id,
                status: fixture.status_short,
            });
        }

        if let Some(mut existing) = self.store.prediction_for_user_match(user_id, match_id).await? {
            existing.outcome = outcome;
            existing.score_pick = score_pick;
            self.store.update_prediction(&existing).await?;
            debug!("User {} updated prediction {} for match {}", user_id, existing.id, match_id);
            return Ok(existing);
        }

        let created = self
            .store
            .insert_prediction(NewPrediction {
                match_id,
                user_id,
                league_id: fixture.league_id,
                outcome,
                score_pick,
                created_at: now,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => EngineError::DuplicatePrediction { user_id, match_id },
                other => EngineError::Store(other),
            })?;
        debug!("User {} predicted match {}", user_id, match_id);
        Ok(created)
    }

    pub async fn predictions_for_matches(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>, EngineError> {
        let store = self.store.as_ref();
        let predictions = query_in_chunks(match_ids, store.contained_in_limit(), move |chunk| async move {
            store.predictions_for_user_matches(user_id, &chunk).await
        })
        .await?;
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::types::{Match, Team, User};
    use chrono::TimeZone;

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new(20));
        store.insert_user(User {
            id: 1,
            username: "alice".to_string(),
        });
        for id in 1..=45 {
            let start_time = Utc.with_ymd_and_hms(2024, 8, 17, 15, 0, 0).unwrap();
            store.insert_match(Match {
                match_id: id,
                league_id: 39,
                start_time,
                date: start_time.date_naive(),
                status_short: (if id == 45 { "1H" } else { "NS" }).to_string(),
                status_long: None,
                elapsed: None,
                home_team: Team { name: "Home".to_string(), logo_url: None },
                away_team: Team { name: "Away".to_string(), logo_url: None },
                home_score: None,
                away_score: None,
            });
        }
        store
    }

    #[tokio::test]
    async fn test_submit_creates_then_updates() {
        let store = seeded_store();
        let service = PredictionService::new(store.clone());
        let now = Utc.with_ymd_and_hms(2024, 8, 16, 12, 0, 0).unwrap();

        let first = service
            .submit_prediction(1, 3, Outcome::Home, ScorePick::None, now)
            .await
            .unwrap();
        assert_eq!(first.league_id, 39);
        assert_eq!(first.created_at, now);

        let later = now + chrono::Duration::hours(2);
        let second = service
            .submit_prediction(1, 3, Outcome::Draw, ScorePick::Exact { home: 1, away: 1 }, later)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, now);

        let stored = store.stored_predictions();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].outcome, Outcome::Draw);
        assert_eq!(stored[0].score_pick, ScorePick::Exact { home: 1, away: 1 });
    }

    #[tokio::test]
    async fn test_started_match_rejects_predictions() {
        let store = seeded_store();
        let service = PredictionService::new(store.clone());
        let result = service
            .submit_prediction(1, 45, Outcome::Away, ScorePick::None, Utc::now())
            .await;
        assert!(matches!(result, Err(EngineError::PredictionsClosed { match_id: 45, .. })));
        assert!(store.stored_predictions().is_empty());
    }

    #[tokio::test]
    async fn test_kick_off_closes_predictions_before_status_changes() {
        let store = seeded_store();
        let service = PredictionService::new(store.clone());
        let kick_off = Utc.with_ymd_and_hms(2024, 8, 17, 15, 0, 0).unwrap();
        service
            .submit_prediction(1, 4, Outcome::Home, ScorePick::None, kick_off - chrono::Duration::minutes(1))
            .await
            .unwrap();

        for now in [kick_off, kick_off + chrono::Duration::minutes(30)] {
            let result = service
                .submit_prediction(1, 4, Outcome::Away, ScorePick::None, now)
                .await;
            assert!(matches!(
                result,
                Err(EngineError::PredictionsClosed { match_id: 4, ref status }) if status == "NS"
            ));
            assert!(matches!(
                service.submit_prediction(1, 5, Outcome::Draw, ScorePick::None, now).await,
                Err(EngineError::PredictionsClosed { match_id: 5, .. })
            ));
        }

        let stored = store.stored_predictions();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].outcome, Outcome::Home);
    }

    #[tokio::test]
    async fn test_missing_user_and_match() {
        let store = seeded_store();
        let service = PredictionService::new(store);
        assert!(matches!(
            service.submit_prediction(2, 3, Outcome::Home, ScorePick::None, Utc::now()).await,
            Err(EngineError::MissingUser(2))
        ));
        assert!(matches!(
            service.submit_prediction(1, 999, Outcome::Home, ScorePick::None, Utc::now()).await,
            Err(EngineError::MissingRelation { kind: "match", id: 999 })
        ));
    }

    #[tokio::test]
    async fn test_predictions_for_matches_is_batched() {
        let store = seeded_store();
        let service = PredictionService::new(store.clone());
        let now = Utc.with_ymd_and_hms(2024, 8, 16, 12, 0, 0).unwrap();
        for match_id in [2, 21, 40] {
            service
                .submit_prediction(1, match_id, Outcome::Home, ScorePick::None, now)
                .await
                .unwrap();
        }

        store.reset_query_count();
        let ids: Vec<MatchId> = (1..=44).collect();
        let mut found: Vec<_> = service
            .predictions_for_matches(1, &ids)
            .await
            .unwrap()
            .iter()
            .map(|p| p.match_id)
            .collect();
        found.sort();
        assert_eq!(found, vec![2, 21, 40]);
        assert_eq!(store.contained_in_queries(), 3);
    }
}
