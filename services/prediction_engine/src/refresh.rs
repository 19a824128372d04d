use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::batch::query_in_chunks;
use crate::feed::FixtureFeed;
use crate::lifecycle::{LifecycleState, TERMINAL_CODES};
use crate::push::PushDispatcher;
use crate::scoring::score_and_notify;
use crate::store::{ObjectStore, StoreError};
use crate::types::{Match, MatchId};

/// A started match is due for a result check once this many minutes have
/// been played...
pub const STALE_ELAPSED_MINUTES: u32 = 85;
/// ...or this many whole hours have passed since kick-off.
pub const STALE_AFTER_HOURS: i64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub candidates: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub matches_updated: usize,
    pub matches_scored: usize,
    pub scoring_failed: usize,
    pub predictions_scored: usize,
    pub notifications_sent: usize,
}

impl RefreshReport {
    fn record_scoring(&mut self, predictions: usize, notifications: usize) {
        self.matches_scored += 1;
        self.predictions_scored += predictions;
        self.notifications_sent += notifications;
    }
}

pub fn is_due_for_result(fixture: &Match, now: DateTime<Utc>) -> bool {
    if fixture.start_time >= now {
        return false;
    }
    let played_out = fixture.elapsed.is_some_and(|e| e >= STALE_ELAPSED_MINUTES);
    played_out || (now - fixture.start_time).num_hours() >= STALE_AFTER_HOURS
}

/// Returns false when scoring failed. The caller then keeps the stored
/// status so the match stays a result-refresh candidate.
async fn score_into(
    report: &mut RefreshReport,
    store: &dyn ObjectStore,
    push: &dyn PushDispatcher,
    fixture: &Match,
) -> bool {
    match score_and_notify(store, push, fixture).await {
        Ok(scored) => {
            report.record_scoring(scored.predictions_scored, scored.notifications_sent);
            true
        }
        Err(e) => {
            error!("Failed to score match {}: {}", fixture.match_id, e);
            report.scoring_failed += 1;
            false
        }
    }
}

/// Pulls all live fixtures in one feed request and copies their status,
/// elapsed time and goals onto the stored matches. Matches that reach a
/// finished state here are scored before they are saved; one that fails to
/// score keeps its stored state and is picked up by the result refresh.
pub async fn run_live_refresh(
    store: &dyn ObjectStore,
    feed: &dyn FixtureFeed,
    push: &dyn PushDispatcher,
) -> Result<RefreshReport, StoreError> {
    let leagues = store.all_leagues().await?;
    let league_ids: Vec<_> = leagues.iter().map(|l| l.league_id).collect();
    let mut report = RefreshReport::default();

    let live = match feed.live_fixtures(&league_ids).await {
        Ok(live) => live,
        Err(e) => {
            error!("Failed to fetch live fixtures for {} leagues: {}", league_ids.len(), e);
            report.fetch_failed += 1;
            return Ok(report);
        }
    };
    report.fetched = live.len();
    if live.is_empty() {
        info!("No live matches to update");
        return Ok(report);
    }

    let ids: Vec<MatchId> = live.iter().map(|f| f.match_id()).collect();
    let stored = query_in_chunks(&ids, store.contained_in_limit(), move |chunk| async move {
        store.matches_by_ids(&chunk).await
    })
    .await?;
    report.candidates = stored.len();

    let updates: HashMap<MatchId, _> = live.iter().map(|f| (f.match_id(), f)).collect();
    let mut updated = Vec::with_capacity(stored.len());
    for mut fixture in stored {
        let Some(update) = updates.get(&fixture.match_id) else {
            continue;
        };
        let was_finished = fixture.lifecycle() == LifecycleState::Finished;
        update.apply_to(&mut fixture);
        if !was_finished
            && fixture.lifecycle() == LifecycleState::Finished
            && !score_into(&mut report, store, push, &fixture).await
        {
            continue;
        }
        updated.push(fixture);
    }
    debug!("{} of {} live fixtures are stored", updated.len(), live.len());

    if let Err(e) = store.save_matches(&updated).await {
        error!("Failed to save {} live matches: {}", updated.len(), e);
        return Ok(report);
    }
    report.matches_updated = updated.len();

    info!(
        "Live refresh: updated {} matches, scored {}",
        report.matches_updated, report.matches_scored
    );
    Ok(report)
}

/// Fetches every started, unresolved match that should be over by now, one
/// feed request per match, and scores the ones that come back finished.
pub async fn run_result_refresh(
    store: &dyn ObjectStore,
    feed: &dyn FixtureFeed,
    push: &dyn PushDispatcher,
    now: DateTime<Utc>,
) -> Result<RefreshReport, StoreError> {
    let due: Vec<Match> = store
        .matches_awaiting_result(now, TERMINAL_CODES)
        .await?
        .into_iter()
        .filter(|m| is_due_for_result(m, now))
        .collect();

    let mut report = RefreshReport {
        candidates: due.len(),
        ..RefreshReport::default()
    };
    if due.is_empty() {
        info!("No matches awaiting a result");
        return Ok(report);
    }

    let mut updated = Vec::with_capacity(due.len());
    for mut fixture in due {
        let update = match feed.fixture(fixture.match_id).await {
            Ok(Some(update)) => update,
            Ok(None) => {
                warn!("Feed has no fixture {}", fixture.match_id);
                report.fetch_failed += 1;
                continue;
            }
            Err(e) => {
                error!("Failed to fetch fixture {}: {}", fixture.match_id, e);
                report.fetch_failed += 1;
                continue;
            }
        };
        report.fetched += 1;
        update.apply_to(&mut fixture);

        if fixture.lifecycle() == LifecycleState::Finished
            && !score_into(&mut report, store, push, &fixture).await
        {
            continue;
        }
        updated.push(fixture);
    }

    match store.save_matches(&updated).await {
        Ok(()) => report.matches_updated = updated.len(),
        Err(e) => error!("Failed to save {} refreshed matches: {}", updated.len(), e),
    }

    info!(
        "Result refresh: {} due, {} fetched, {} failed, {} scored",
        report.candidates, report.fetched, report.fetch_failed, report.matches_scored
    );
    Ok(report)
}
