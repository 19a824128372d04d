use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    postgres::{PgArguments, PgPoolOptions},
    Pool, Postgres,
};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::lifecycle::NOT_STARTED_CODES;
use crate::store::{check_contained_in, EventPredictionQuery, ObjectStore, StoreError};
use crate::types::{
    Event, EventId, EventType, League, LeagueId, Match, MatchId, NewEvent, NewPrediction, Outcome,
    Prediction, PredictionId, ResolvedPrediction, ScorePick, Team, User, UserId,
};

const SCHEMA: &str = include_str!("../schema.sql");

const MATCH_COLUMNS: &str = r#"
    match_id, league_id, start_time, match_date, status_short, status_long, elapsed,
    home_team_name, home_team_logo, away_team_name, away_team_logo, home_score, away_score
"#;

const PREDICTION_COLUMNS: &str = r#"
    id, match_id, user_id, league_id, outcome, home_score_pick, away_score_pick, points, created_at
"#;

const EVENT_COLUMNS: &str = "id, name, start_time, end_time, event_type, invite_code, finished";

const UPSERT_MATCH: &str = r#"
    INSERT INTO matches (
        match_id, league_id, start_time, match_date, status_short, status_long, elapsed,
        home_team_name, home_team_logo, away_team_name, away_team_logo, home_score, away_score
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (match_id) DO UPDATE SET
        start_time = EXCLUDED.start_time,
        match_date = EXCLUDED.match_date,
        status_short = EXCLUDED.status_short,
        status_long = EXCLUDED.status_long,
        elapsed = EXCLUDED.elapsed,
        home_team_name = EXCLUDED.home_team_name,
        home_team_logo = EXCLUDED.home_team_logo,
        away_team_name = EXCLUDED.away_team_name,
        away_team_logo = EXCLUDED.away_team_logo,
        home_score = EXCLUDED.home_score,
        away_score = EXCLUDED.away_score
"#;

// Schedule and teams always follow the feed. Status only moves while the
// stored row has not started ($14); elapsed and scores are left alone.
const UPSERT_SCHEDULED_MATCH: &str = r#"
    INSERT INTO matches (
        match_id, league_id, start_time, match_date, status_short, status_long, elapsed,
        home_team_name, home_team_logo, away_team_name, away_team_logo, home_score, away_score
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (match_id) DO UPDATE SET
        start_time = EXCLUDED.start_time,
        match_date = EXCLUDED.match_date,
        home_team_name = EXCLUDED.home_team_name,
        home_team_logo = EXCLUDED.home_team_logo,
        away_team_name = EXCLUDED.away_team_name,
        away_team_logo = EXCLUDED.away_team_logo,
        status_short = CASE WHEN matches.status_short = ANY($14)
            THEN EXCLUDED.status_short ELSE matches.status_short END,
        status_long = CASE WHEN matches.status_short = ANY($14)
            THEN EXCLUDED.status_long ELSE matches.status_long END
"#;

#[derive(Debug, sqlx::FromRow)]
struct LeagueRow {
    league_id: i64,
    name: String,
    logo_url: Option<String>,
    active: bool,
    priority: i32,
    country: Option<String>,
}

impl From<LeagueRow> for League {
    fn from(row: LeagueRow) -> Self {
        League {
            league_id: row.league_id,
            name: row.name,
            logo_url: row.logo_url,
            active: row.active,
            priority: row.priority,
            country: row.country,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    match_id: i64,
    league_id: i64,
    start_time: DateTime<Utc>,
    match_date: NaiveDate,
    status_short: String,
    status_long: Option<String>,
    elapsed: Option<i32>,
    home_team_name: String,
    home_team_logo: Option<String>,
    away_team_name: String,
    away_team_logo: Option<String>,
    home_score: Option<i32>,
    away_score: Option<i32>,
}

fn non_negative(value: Option<i32>, column: &str) -> Result<Option<u32>, StoreError> {
    value
        .map(|v| u32::try_from(v).map_err(|_| StoreError::CorruptRow(format!("negative {}: {}", column, v))))
        .transpose()
}

fn to_db(value: Option<u32>) -> Option<i32> {
    value.map(|v| v.min(i32::MAX as u32) as i32)
}

fn bind_match<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    fixture: &'q Match,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    query
        .bind(fixture.match_id)
        .bind(fixture.league_id)
        .bind(fixture.start_time)
        .bind(fixture.date)
        .bind(&fixture.status_short)
        .bind(&fixture.status_long)
        .bind(to_db(fixture.elapsed))
        .bind(&fixture.home_team.name)
        .bind(&fixture.home_team.logo_url)
        .bind(&fixture.away_team.name)
        .bind(&fixture.away_team.logo_url)
        .bind(to_db(fixture.home_score))
        .bind(to_db(fixture.away_score))
}

impl TryFrom<MatchRow> for Match {
    type Error = StoreError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        Ok(Match {
            match_id: row.match_id,
            league_id: row.league_id,
            start_time: row.start_time,
            date: row.match_date,
            status_short: row.status_short,
            status_long: row.status_long,
            elapsed: non_negative(row.elapsed, "elapsed")?,
            home_team: Team {
                name: row.home_team_name,
                logo_url: row.home_team_logo,
            },
            away_team: Team {
                name: row.away_team_name,
                logo_url: row.away_team_logo,
            },
            home_score: non_negative(row.home_score, "home_score")?,
            away_score: non_negative(row.away_score, "away_score")?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    match_id: i64,
    user_id: i64,
    league_id: i64,
    outcome: String,
    home_score_pick: Option<i32>,
    away_score_pick: Option<i32>,
    points: Option<i32>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for Prediction {
    type Error = StoreError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        let outcome = Outcome::parse(&row.outcome)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown outcome: {}", row.outcome)))?;
        Ok(Prediction {
            id: row.id,
            match_id: row.match_id,
            user_id: row.user_id,
            league_id: row.league_id,
            outcome,
            score_pick: ScorePick::from_parts(
                non_negative(row.home_score_pick, "home_score_pick")?,
                non_negative(row.away_score_pick, "away_score_pick")?,
            ),
            points: non_negative(row.points, "points")?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    event_type: String,
    invite_code: Option<String>,
    finished: bool,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type = EventType::parse(&row.event_type)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown event type: {}", row.event_type)))?;
        Ok(Event {
            id: row.id,
            name: row.name,
            start_time: row.start_time,
            end_time: row.end_time,
            event_type,
            invite_code: row.invite_code,
            finished: row.finished,
        })
    }
}

/// Flat row of a prediction joined with its user, match and league.
#[derive(Debug, sqlx::FromRow)]
struct ResolvedRow {
    #[sqlx(flatten)]
    prediction: PredictionRow,
    username: String,
    m_start_time: DateTime<Utc>,
    m_match_date: NaiveDate,
    m_status_short: String,
    m_status_long: Option<String>,
    m_elapsed: Option<i32>,
    m_home_team_name: String,
    m_home_team_logo: Option<String>,
    m_away_team_name: String,
    m_away_team_logo: Option<String>,
    m_home_score: Option<i32>,
    m_away_score: Option<i32>,
    l_name: String,
    l_logo_url: Option<String>,
    l_active: bool,
    l_priority: i32,
    l_country: Option<String>,
}

impl TryFrom<ResolvedRow> for ResolvedPrediction {
    type Error = StoreError;

    fn try_from(row: ResolvedRow) -> Result<Self, Self::Error> {
        let prediction = Prediction::try_from(row.prediction)?;
        let fixture = Match::try_from(MatchRow {
            match_id: prediction.match_id,
            league_id: prediction.league_id,
            start_time: row.m_start_time,
            match_date: row.m_match_date,
            status_short: row.m_status_short,
            status_long: row.m_status_long,
            elapsed: row.m_elapsed,
            home_team_name: row.m_home_team_name,
            home_team_logo: row.m_home_team_logo,
            away_team_name: row.m_away_team_name,
            away_team_logo: row.m_away_team_logo,
            home_score: row.m_home_score,
            away_score: row.m_away_score,
        })?;
        Ok(ResolvedPrediction {
            user: User {
                id: prediction.user_id,
                username: row.username,
            },
            league: League {
                league_id: prediction.league_id,
                name: row.l_name,
                logo_url: row.l_logo_url,
                active: row.l_active,
                priority: row.l_priority,
                country: row.l_country,
            },
            fixture,
            prediction,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// [`ObjectStore`] backed by Postgres.
pub struct PgStore {
    pool: Pool<Postgres>,
    limit: usize,
}

impl PgStore {
    pub async fn connect(config: &EngineConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;
        info!("Connected to database with {} max connections", config.database.max_connections);
        Ok(Self::from_pool(pool, config.store.contained_in_limit))
    }

    pub fn from_pool(pool: Pool<Postgres>, limit: usize) -> Self {
        Self { pool, limit }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    async fn fetch_events(&self, sql: &str, bind: Option<i64>) -> Result<Vec<Event>, StoreError> {
        let mut query = sqlx::query_as::<_, EventRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        convert_all(query.fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl ObjectStore for PgStore {
    fn contained_in_limit(&self) -> usize {
        self.limit
    }

    async fn active_leagues(&self) -> Result<Vec<League>, StoreError> {
        let rows = sqlx::query_as::<_, LeagueRow>(
            "SELECT * FROM leagues WHERE active = TRUE ORDER BY priority DESC, league_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(League::from).collect())
    }

    async fn all_leagues(&self) -> Result<Vec<League>, StoreError> {
        let rows = sqlx::query_as::<_, LeagueRow>("SELECT * FROM leagues ORDER BY priority DESC, league_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(League::from).collect())
    }

    async fn event_leagues(&self, event_id: EventId) -> Result<Vec<League>, StoreError> {
        let rows = sqlx::query_as::<_, LeagueRow>(
            r#"
            SELECT l.*
            FROM leagues l
            JOIN event_leagues el ON el.league_id = l.league_id
            WHERE el.event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(League::from).collect())
    }

    async fn save_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        if matches.is_empty() {
            return Ok(());
        }
        let tx_start = Instant::now();
        let mut tx = self.pool.begin().await?;
        for fixture in matches {
            bind_match(sqlx::query(UPSERT_MATCH), fixture)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("Saved {} matches in {} ms", matches.len(), tx_start.elapsed().as_millis());
        Ok(())
    }

    async fn save_scheduled_matches(&self, matches: &[Match]) -> Result<(), StoreError> {
        if matches.is_empty() {
            return Ok(());
        }
        let not_started: Vec<String> = NOT_STARTED_CODES.iter().map(|s| s.to_string()).collect();
        let tx_start = Instant::now();
        let mut tx = self.pool.begin().await?;
        for fixture in matches {
            bind_match(sqlx::query(UPSERT_SCHEDULED_MATCH), fixture)
                .bind(&not_started)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(
            "Saved {} scheduled matches in {} ms",
            matches.len(),
            tx_start.elapsed().as_millis()
        );
        Ok(())
    }

    async fn match_by_id(&self, match_id: MatchId) -> Result<Option<Match>, StoreError> {
        let sql = format!("SELECT {} FROM matches WHERE match_id = $1", MATCH_COLUMNS);
        let row = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Match::try_from).transpose()
    }

    async fn matches_by_ids(&self, match_ids: &[MatchId]) -> Result<Vec<Match>, StoreError> {
        check_contained_in(match_ids.len(), self.limit)?;
        let sql = format!("SELECT {} FROM matches WHERE match_id = ANY($1)", MATCH_COLUMNS);
        let rows = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(match_ids)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn matches_awaiting_result(
        &self,
        started_before: DateTime<Utc>,
        excluded_statuses: &[&str],
    ) -> Result<Vec<Match>, StoreError> {
        let sql = format!(
            "SELECT {} FROM matches WHERE start_time < $1 AND NOT (status_short = ANY($2)) ORDER BY start_time",
            MATCH_COLUMNS
        );
        let excluded: Vec<String> = excluded_statuses.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(started_before)
            .bind(&excluded)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn matches_for_leagues(
        &self,
        league_ids: &[LeagueId],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Match>, StoreError> {
        check_contained_in(league_ids.len(), self.limit)?;
        let sql = format!(
            "SELECT {} FROM matches WHERE league_id = ANY($1) AND match_date BETWEEN $2 AND $3",
            MATCH_COLUMNS
        );
        let rows = sqlx::query_as::<_, MatchRow>(&sql)
            .bind(league_ids)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn predictions_for_match(&self, match_id: MatchId) -> Result<Vec<Prediction>, StoreError> {
        let sql = format!("SELECT {} FROM predictions WHERE match_id = $1", PREDICTION_COLUMNS);
        let rows = sqlx::query_as::<_, PredictionRow>(&sql)
            .bind(match_id)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn predictions_for_user_matches(
        &self,
        user_id: UserId,
        match_ids: &[MatchId],
    ) -> Result<Vec<Prediction>, StoreError> {
        check_contained_in(match_ids.len(), self.limit)?;
        let sql = format!(
            "SELECT {} FROM predictions WHERE user_id = $1 AND match_id = ANY($2)",
            PREDICTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, PredictionRow>(&sql)
            .bind(user_id)
            .bind(match_ids)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn prediction_for_user_match(
        &self,
        user_id: UserId,
        match_id: MatchId,
    ) -> Result<Option<Prediction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM predictions WHERE user_id = $1 AND match_id = $2",
            PREDICTION_COLUMNS
        );
        let row = sqlx::query_as::<_, PredictionRow>(&sql)
            .bind(user_id)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Prediction::try_from).transpose()
    }

    async fn insert_prediction(&self, prediction: NewPrediction) -> Result<Prediction, StoreError> {
        let (home_pick, away_pick) = prediction.score_pick.parts();
        let sql = format!(
            r#"
            INSERT INTO predictions (match_id, user_id, league_id, outcome, home_score_pick, away_score_pick, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PREDICTION_COLUMNS
        );
        let row = sqlx::query_as::<_, PredictionRow>(&sql)
            .bind(prediction.match_id)
            .bind(prediction.user_id)
            .bind(prediction.league_id)
            .bind(prediction.outcome.as_str())
            .bind(to_db(home_pick))
            .bind(to_db(away_pick))
            .bind(prediction.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(format!(
                    "prediction for user {} and match {}",
                    prediction.user_id, prediction.match_id
                )),
                other => StoreError::Database(other),
            })?;
        Prediction::try_from(row)
    }

    async fn update_prediction(&self, prediction: &Prediction) -> Result<(), StoreError> {
        let (home_pick, away_pick) = prediction.score_pick.parts();
        let result = sqlx::query(
            r#"
            UPDATE predictions
            SET outcome = $2, home_score_pick = $3, away_score_pick = $4, points = $5
            WHERE id = $1
            "#,
        )
        .bind(prediction.id)
        .bind(prediction.outcome.as_str())
        .bind(to_db(home_pick))
        .bind(to_db(away_pick))
        .bind(to_db(prediction.points))
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "prediction",
                id: prediction.id.to_string(),
            });
        }
        Ok(())
    }

    async fn save_prediction_points(&self, points: &[(PredictionId, u32)]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (id, value) in points {
            sqlx::query("UPDATE predictions SET points = $1 WHERE id = $2")
                .bind(to_db(Some(*value)))
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn event_predictions(
        &self,
        query: &EventPredictionQuery,
    ) -> Result<Vec<ResolvedPrediction>, StoreError> {
        check_contained_in(query.league_ids.len(), self.limit)?;
        if let Some(user_ids) = &query.user_ids {
            check_contained_in(user_ids.len(), self.limit)?;
        }
        let rows = sqlx::query_as::<_, ResolvedRow>(
            r#"
            SELECT
                p.id, p.match_id, p.user_id, p.league_id, p.outcome,
                p.home_score_pick, p.away_score_pick, p.points, p.created_at,
                u.username,
                m.start_time AS m_start_time, m.match_date AS m_match_date,
                m.status_short AS m_status_short, m.status_long AS m_status_long,
                m.elapsed AS m_elapsed,
                m.home_team_name AS m_home_team_name, m.home_team_logo AS m_home_team_logo,
                m.away_team_name AS m_away_team_name, m.away_team_logo AS m_away_team_logo,
                m.home_score AS m_home_score, m.away_score AS m_away_score,
                l.name AS l_name, l.logo_url AS l_logo_url, l.active AS l_active,
                l.priority AS l_priority, l.country AS l_country
            FROM predictions p
            JOIN users u ON u.id = p.user_id
            JOIN matches m ON m.match_id = p.match_id
            JOIN leagues l ON l.league_id = p.league_id
            WHERE p.league_id = ANY($1)
              AND p.created_at >= $2
              AND p.created_at <= $3
              AND ($4::BIGINT[] IS NULL OR p.user_id = ANY($4))
            "#,
        )
        .bind(&query.league_ids)
        .bind(query.start)
        .bind(query.end)
        .bind(query.user_ids.as_deref())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, username FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        Ok(self.fetch_events(&sql, Some(event_id)).await?.into_iter().next())
    }

    async fn event_by_invite_code(&self, code: &str) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {} FROM events WHERE invite_code = $1", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Event::try_from).transpose()
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO events (name, start_time, end_time, event_type, finished)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(&event.name)
            .bind(event.start_time)
            .bind(event.end_time)
            .bind(event.event_type.as_str())
            .fetch_one(&self.pool)
            .await?;
        Event::try_from(row)
    }

    async fn assign_invite_code(&self, event_id: EventId, code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE events SET invite_code = $2 WHERE id = $1 AND invite_code IS NULL")
            .bind(event_id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn event_members(&self, event_id: EventId) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username
            FROM users u
            JOIN event_users eu ON eu.user_id = u.id
            WHERE eu.event_id = $1
            ORDER BY u.id
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn add_event_members(&self, event_id: EventId, user_ids: &[UserId]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO event_users (event_id, user_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(user_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_event_members(&self, event_id: EventId, user_ids: &[UserId]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM event_users WHERE event_id = $1 AND user_id = ANY($2)")
            .bind(event_id)
            .bind(user_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_event_leagues(&self, event_id: EventId, league_ids: &[LeagueId]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO event_leagues (event_id, league_id)
            SELECT $1, UNNEST($2::BIGINT[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(league_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn events_for_member(&self, user_id: UserId) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM events e
            WHERE e.event_type <> 'GLOBAL'
              AND EXISTS (SELECT 1 FROM event_users eu WHERE eu.event_id = e.id AND eu.user_id = $1)
            "#,
            EVENT_COLUMNS
        );
        self.fetch_events(&sql, Some(user_id)).await
    }

    async fn global_events(&self) -> Result<Vec<Event>, StoreError> {
        let sql = format!("SELECT {} FROM events WHERE event_type = 'GLOBAL'", EVENT_COLUMNS);
        self.fetch_events(&sql, None).await
    }

    async fn expired_unfinished_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        let sql = format!(
            "SELECT {} FROM events WHERE finished = FALSE AND end_time < $1",
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn mark_events_finished(&self, event_ids: &[EventId]) -> Result<(), StoreError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE events SET finished = TRUE WHERE id = ANY($1)")
            .bind(event_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
