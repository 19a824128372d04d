use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::batch::query_in_chunks;
use crate::engine::{EngineError, EngineSettings};
use crate::store::ObjectStore;
use crate::types::{League, LeagueId, Match, MatchId, Prediction, UserId};

pub const DEFAULT_FEED_LEAGUES: usize = 10;
pub const FEED_WINDOW_DAYS: i64 = 2;

/// A match as shown in a day feed, with its league and the viewer's pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchCard {
    pub fixture: Match,
    pub league: League,
    pub prediction: Option<Prediction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayFeeds {
    pub yesterday: Vec<MatchCard>,
    pub today: Vec<MatchCard>,
    pub tomorrow: Vec<MatchCard>,
}

fn feed_leagues(all: Vec<League>, selected: Option<&[LeagueId]>, default_count: usize) -> Vec<League> {
    match selected {
        Some(ids) if !ids.is_empty() => all.into_iter().filter(|l| ids.contains(&l.league_id)).collect(),
        _ => all.into_iter().filter(|l| l.active).take(default_count).collect(),
    }
}

/// Splits cards into yesterday, today and tomorrow by UTC match date. Each
/// day is ordered by lifecycle state, then kick-off.
pub fn split_into_days(cards: Vec<MatchCard>, today: NaiveDate) -> DayFeeds {
    let mut feeds = DayFeeds::default();
    for card in cards {
        let offset = (card.fixture.date - today).num_days();
        match offset {
            -1 => feeds.yesterday.push(card),
            0 => feeds.today.push(card),
            1 => feeds.tomorrow.push(card),
            _ => {}
        }
    }
    for day in [&mut feeds.yesterday, &mut feeds.today, &mut feeds.tomorrow] {
        day.sort_by(|a, b| a.fixture.display_cmp(&b.fixture));
    }
    feeds
}

/// Loads the matches around `today` for the user's leagues together with the
/// user's predictions for them.
pub async fn build_day_feeds(
    store: &dyn ObjectStore,
    settings: &EngineSettings,
    user_id: UserId,
    selected_leagues: Option<&[LeagueId]>,
    today: NaiveDate,
) -> Result<DayFeeds, EngineError> {
    let leagues = feed_leagues(store.all_leagues().await?, selected_leagues, settings.default_feed_leagues);
    let league_ids: Vec<LeagueId> = leagues.iter().map(|l| l.league_id).collect();
    let limit = store.contained_in_limit();

    let from = today - Duration::days(settings.feed_window_days);
    let to = today + Duration::days(settings.feed_window_days);
    let matches = query_in_chunks(&league_ids, limit, move |chunk| async move {
        store.matches_for_leagues(&chunk, from, to).await
    })
    .await?;

    let match_ids: Vec<MatchId> = matches.iter().map(|m| m.match_id).collect();
    let predictions = query_in_chunks(&match_ids, limit, move |chunk| async move {
        store.predictions_for_user_matches(user_id, &chunk).await
    })
    .await?;

    let leagues_by_id: HashMap<LeagueId, League> = leagues.into_iter().map(|l| (l.league_id, l)).collect();
    let mut predictions_by_match: HashMap<MatchId, Prediction> =
        predictions.into_iter().map(|p| (p.match_id, p)).collect();

    let cards = matches
        .into_iter()
        .filter_map(|fixture| {
            let league = leagues_by_id.get(&fixture.league_id)?.clone();
            Some(MatchCard {
                prediction: predictions_by_match.remove(&fixture.match_id),
                fixture,
                league,
            })
        })
        .collect();
    Ok(split_into_days(cards, today))
}
