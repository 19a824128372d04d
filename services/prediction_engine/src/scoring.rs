use serde::Serialize;
use tracing::{debug, info, warn};

use crate::lifecycle::LifecycleState;
use crate::push::PushDispatcher;
use crate::store::{ObjectStore, StoreError};
use crate::types::{FinalScore, Match, MatchId, Outcome, Prediction, PredictionId, ScorePick, UserId};

pub const OUTCOME_POINTS: u32 = 1;
pub const EXACT_SCORE_BONUS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Match {match_id} is not finished (status {status})")]
    NotFinished { match_id: MatchId, status: String },
    #[error("Match {0} has no final score")]
    MissingFinalScore(MatchId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Points for a single prediction against a final score, in `0..=4`.
pub fn score_prediction(result: FinalScore, outcome: Outcome, pick: ScorePick) -> u32 {
    let mut points = 0;
    if outcome == result.outcome() {
        points += OUTCOME_POINTS;
    }
    if pick.matches(result) {
        points += EXACT_SCORE_BONUS;
    }
    points
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PointAward {
    pub prediction_id: PredictionId,
    pub user_id: UserId,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationIntent {
    pub user_id: UserId,
    pub home_team: String,
    pub away_team: String,
    pub points: u32,
}

impl NotificationIntent {
    pub fn alert(&self) -> String {
        format!(
            "You earned {} points from the match between {} - {}",
            self.points, self.home_team, self.away_team
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringOutcome {
    pub awards: Vec<PointAward>,
    pub notifications: Vec<NotificationIntent>,
}

/// Scores every prediction of a finished match. Pure; nothing is persisted.
pub fn score_match(fixture: &Match, predictions: &[Prediction]) -> Result<ScoringOutcome, ScoringError> {
    if fixture.lifecycle() != LifecycleState::Finished {
        return Err(ScoringError::NotFinished {
            match_id: fixture.match_id,
            status: fixture.status_short.clone(),
        });
    }
    let result = fixture
        .final_score()
        .ok_or(ScoringError::MissingFinalScore(fixture.match_id))?;

    let mut outcome = ScoringOutcome::default();
    for prediction in predictions.iter().filter(|p| p.match_id == fixture.match_id) {
        let points = score_prediction(result, prediction.outcome, prediction.score_pick);
        outcome.awards.push(PointAward {
            prediction_id: prediction.id,
            user_id: prediction.user_id,
            points,
        });
        if points > 0 {
            outcome.notifications.push(NotificationIntent {
                user_id: prediction.user_id,
                home_team: fixture.home_team.name.clone(),
                away_team: fixture.away_team.name.clone(),
                points,
            });
        }
    }
    Ok(outcome)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringReport {
    pub match_id: MatchId,
    pub predictions_scored: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

/// Sends each intent once. Failures are logged and counted, never returned.
pub async fn dispatch_notifications(
    push: &dyn PushDispatcher,
    notifications: &[NotificationIntent],
) -> (usize, usize) {
    let mut sent = 0;
    let mut failed = 0;
    for intent in notifications {
        match push.send(intent.user_id, &intent.alert()).await {
            Ok(()) => sent += 1,
            Err(e) => {
                warn!("Failed to notify user {}: {}", intent.user_id, e);
                failed += 1;
            }
        }
    }
    (sent, failed)
}

/// Loads the predictions of a finished match, persists their points in one
/// bulk write and then notifies every user who earned points.
pub async fn score_and_notify(
    store: &dyn ObjectStore,
    push: &dyn PushDispatcher,
    fixture: &Match,
) -> Result<ScoringReport, ScoringError> {
    let predictions = store.predictions_for_match(fixture.match_id).await?;
    let outcome = score_match(fixture, &predictions)?;

    let points: Vec<(PredictionId, u32)> = outcome
        .awards
        .iter()
        .map(|award| (award.prediction_id, award.points))
        .collect();
    store.save_prediction_points(&points).await?;
    debug!("Saved points for {} predictions of match {}", points.len(), fixture.match_id);

    let (sent, failed) = dispatch_notifications(push, &outcome.notifications).await;
    info!(
        "Scored match {} ({} - {}): {} predictions, {} notifications sent, {} failed",
        fixture.match_id,
        fixture.home_team.name,
        fixture.away_team.name,
        points.len(),
        sent,
        failed
    );

    Ok(ScoringReport {
        match_id: fixture.match_id,
        predictions_scored: points.len(),
        notifications_sent: sent,
        notifications_failed: failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Team;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn finished(home: u32, away: u32) -> Match {
        let start_time = Utc.with_ymd_and_hms(2024, 8, 17, 14, 0, 0).unwrap();
        Match {
            match_id: 7,
            league_id: 39,
            start_time,
            date: start_time.date_naive(),
            status_short: "FT".to_string(),
            status_long: Some("Match Finished".to_string()),
            elapsed: Some(90),
            home_team: Team { name: "Arsenal".to_string(), logo_url: None },
            away_team: Team { name: "Wolves".to_string(), logo_url: None },
            home_score: Some(home),
            away_score: Some(away),
        }
    }

    fn prediction(id: i64, user_id: i64, outcome: Outcome, score_pick: ScorePick) -> Prediction {
        Prediction {
            id,
            match_id: 7,
            user_id,
            league_id: 39,
            outcome,
            score_pick,
            points: None,
            created_at: Utc::now(),
        }
    }

    fn result(home: u32, away: u32) -> FinalScore {
        FinalScore { home, away }
    }

    #[test]
    fn test_exact_score_and_outcome() {
        let pick = ScorePick::Exact { home: 2, away: 0 };
        assert_eq!(score_prediction(result(2, 0), Outcome::Home, pick), 4);
    }

    #[test]
    fn test_outcome_only() {
        let pick = ScorePick::Exact { home: 3, away: 0 };
        assert_eq!(score_prediction(result(2, 0), Outcome::Home, pick), 1);
        assert_eq!(score_prediction(result(2, 0), Outcome::Home, ScorePick::None), 1);
    }

    #[test]
    fn test_wrong_outcome() {
        assert_eq!(score_prediction(result(1, 1), Outcome::Away, ScorePick::None), 0);
        assert_eq!(score_prediction(result(1, 1), Outcome::Draw, ScorePick::None), 1);
    }

    #[test]
    fn test_exact_score_with_wrong_outcome_pick() {
        let pick = ScorePick::Exact { home: 1, away: 1 };
        assert_eq!(score_prediction(result(1, 1), Outcome::Home, pick), 3);
    }

    #[test]
    fn test_half_filled_pick_never_earns_bonus() {
        let pick = ScorePick::from_parts(Some(2), None);
        assert_eq!(score_prediction(result(2, 0), Outcome::Home, pick), 1);
    }

    #[test]
    fn test_points_stay_in_range() {
        for home in 0..5 {
            for away in 0..5 {
                for outcome in [Outcome::Home, Outcome::Draw, Outcome::Away] {
                    let pick = ScorePick::Exact { home: away, away: home };
                    let points = score_prediction(result(home, away), outcome, pick);
                    assert!(points <= OUTCOME_POINTS + EXACT_SCORE_BONUS);
                }
            }
        }
    }

    #[test]
    fn test_score_match_builds_awards_and_notifications() {
        let fixture = finished(2, 0);
        let predictions = vec![
            prediction(1, 100, Outcome::Home, ScorePick::Exact { home: 2, away: 0 }),
            prediction(2, 200, Outcome::Away, ScorePick::None),
            prediction(3, 300, Outcome::Home, ScorePick::Exact { home: 3, away: 1 }),
        ];

        let outcome = score_match(&fixture, &predictions).unwrap();
        let points: Vec<_> = outcome.awards.iter().map(|a| (a.prediction_id, a.points)).collect();
        assert_eq!(points, vec![(1, 4), (2, 0), (3, 1)]);

        let notified: Vec<_> = outcome.notifications.iter().map(|n| (n.user_id, n.points)).collect();
        assert_eq!(notified, vec![(100, 4), (300, 1)]);
        assert_eq!(
            outcome.notifications[0].alert(),
            "You earned 4 points from the match between Arsenal - Wolves"
        );
    }

    #[test]
    fn test_score_match_is_idempotent() {
        let fixture = finished(1, 1);
        let predictions = vec![prediction(1, 100, Outcome::Draw, ScorePick::Exact { home: 1, away: 1 })];
        assert_eq!(
            score_match(&fixture, &predictions).unwrap(),
            score_match(&fixture, &predictions).unwrap()
        );
    }

    #[test]
    fn test_score_match_requires_finished_match_with_score() {
        let mut live = finished(1, 0);
        live.status_short = "2H".to_string();
        assert!(matches!(score_match(&live, &[]), Err(ScoringError::NotFinished { .. })));

        let mut no_score = finished(1, 0);
        no_score.away_score = None;
        assert!(matches!(score_match(&no_score, &[]), Err(ScoringError::MissingFinalScore(7))));
    }
}
