use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::feed::{FeedFixture, FixtureFeed};
use crate::lifecycle::is_discarded_code;
use crate::store::{ObjectStore, StoreError};
use crate::types::{LeagueId, Match};

/// Fixtures are pulled this many days ahead of the run date.
pub const INGESTION_DAYS_AHEAD: i64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub target_date: Option<NaiveDate>,
    pub leagues: usize,
    pub leagues_failed: usize,
    pub fixtures_fetched: usize,
    pub fixtures_discarded: usize,
    pub matches_saved: usize,
}

pub fn target_date(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::days(INGESTION_DAYS_AHEAD)).date_naive()
}

/// Maps feed fixtures to matches of `league_id`, dropping postponed, cancelled
/// and abandoned fixtures. Returns the matches and the number dropped.
pub fn fixtures_to_matches(league_id: LeagueId, fixtures: Vec<FeedFixture>) -> (Vec<Match>, usize) {
    let mut discarded = 0;
    let mut matches = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        if is_discarded_code(fixture.status_short()) {
            debug!("Dropping fixture {} with status {}", fixture.match_id(), fixture.status_short());
            discarded += 1;
            continue;
        }
        let match_id = fixture.match_id();
        match fixture.into_match(league_id) {
            Some(m) => matches.push(m),
            None => {
                warn!("Dropping fixture {} without a valid kick-off time", match_id);
                discarded += 1;
            }
        }
    }
    (matches, discarded)
}

/// Pulls the fixtures of every active league for the day after tomorrow and
/// stores them. Per-league failures are logged and skipped; only failing to
/// list the leagues aborts the run.
pub async fn run_fixture_ingestion(
    store: &dyn ObjectStore,
    feed: &dyn FixtureFeed,
    now: DateTime<Utc>,
) -> Result<IngestionReport, StoreError> {
    let leagues = store.active_leagues().await?;
    let date = target_date(now);
    info!("Fetching fixtures for {} leagues on {}", leagues.len(), date);

    let mut report = IngestionReport {
        target_date: Some(date),
        leagues: leagues.len(),
        ..IngestionReport::default()
    };

    for league in &leagues {
        let fixtures = match feed.fixtures_for_league(league.league_id, date).await {
            Ok(fixtures) => fixtures,
            Err(e) => {
                error!("Failed to fetch fixtures for league {} ({}): {}", league.league_id, league.name, e);
                report.leagues_failed += 1;
                continue;
            }
        };
        report.fixtures_fetched += fixtures.len();

        let (matches, discarded) = fixtures_to_matches(league.league_id, fixtures);
        report.fixtures_discarded += discarded;
        if matches.is_empty() {
            continue;
        }

        match store.save_scheduled_matches(&matches).await {
            Ok(()) => {
                debug!("Saved {} matches for league {}", matches.len(), league.league_id);
                report.matches_saved += matches.len();
            }
            Err(e) => {
                error!("Failed to save {} matches for league {}: {}", matches.len(), league.league_id, e);
                report.leagues_failed += 1;
            }
        }
    }

    info!(
        "Fixture ingestion for {}: saved {} matches, discarded {}, {} of {} leagues failed",
        date, report.matches_saved, report.fixtures_discarded, report.leagues_failed, report.leagues
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn feed_fixture(id: i64, status: &str) -> FeedFixture {
        serde_json::from_value(serde_json::json!({
            "fixture": {
                "id": id,
                "timestamp": 1723993200,
                "status": {"short": status, "long": null, "elapsed": null}
            },
            "teams": {
                "home": {"name": "Chelsea", "logo": null},
                "away": {"name": "Man City", "logo": null}
            },
            "goals": {"home": null, "away": null}
        }))
        .unwrap()
    }

    #[test]
    fn test_target_date_is_two_days_ahead_in_utc() {
        let late_evening = Utc.with_ymd_and_hms(2024, 8, 16, 23, 30, 0).unwrap();
        assert_eq!(target_date(late_evening), NaiveDate::from_ymd_opt(2024, 8, 18).unwrap());
        let new_year = Utc.with_ymd_and_hms(2024, 12, 30, 0, 0, 0).unwrap();
        assert_eq!(target_date(new_year), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_discarded_statuses_are_dropped() {
        let fixtures = vec![
            feed_fixture(1, "NS"),
            feed_fixture(2, "PST"),
            feed_fixture(3, "CANC"),
            feed_fixture(4, "ABD"),
            feed_fixture(5, "TBD"),
        ];
        let (matches, discarded) = fixtures_to_matches(39, fixtures);
        let ids: Vec<_> = matches.iter().map(|m| m.match_id).collect();
        assert_eq!(ids, vec![1, 5]);
        assert_eq!(discarded, 3);
        assert!(matches.iter().all(|m| m.league_id == 39));
    }
}
