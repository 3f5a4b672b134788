use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    LeaderboardEntry, Match, MatchStatus, MatchUpsert, Outcome, Prediction, Slip, Tournament,
};
use crate::error::Result;
use crate::services::{SettlementStore, SyncStore};

/// PostgreSQL storage adapter. Owns durability for tournaments,
/// matches, slips and predictions.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap connectivity probe for the health endpoint
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Tournaments ====================

    pub async fn tournament(&self, id: Uuid) -> Result<Option<Tournament>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, league_id, season, is_active, last_synced_at
            FROM tournaments WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| tournament_from_row(&r)))
    }

    pub async fn active_tournaments(&self) -> Result<Vec<Tournament>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, league_id, season, is_active, last_synced_at
            FROM tournaments
            WHERE is_active = TRUE
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(tournament_from_row).collect())
    }

    /// Stamp the last successful sync for a set of tournaments. Only the
    /// sync engine calls this.
    pub async fn mark_tournaments_synced(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query("UPDATE tournaments SET last_synced_at = $2 WHERE id = ANY($1)")
            .bind(ids)
            .bind(at)
            .execute(&self.pool)
            .await?;

        debug!("Stamped last_synced_at for {} tournaments", ids.len());
        Ok(())
    }

    // ==================== Matches ====================

    /// Idempotent merge keyed by the provider fixture id: an existing
    /// row is updated in place, never duplicated. The lock flag and the
    /// slip assignment are owned elsewhere and left untouched.
    pub async fn upsert_match(&self, record: &MatchUpsert) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO matches (
                tournament_id, external_id, home_team, away_team, kickoff,
                status, home_goals, away_goals, result, round, season
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (external_id) DO UPDATE SET
                tournament_id = EXCLUDED.tournament_id,
                home_team = EXCLUDED.home_team,
                away_team = EXCLUDED.away_team,
                kickoff = EXCLUDED.kickoff,
                status = EXCLUDED.status,
                home_goals = EXCLUDED.home_goals,
                away_goals = EXCLUDED.away_goals,
                result = EXCLUDED.result,
                round = EXCLUDED.round,
                season = EXCLUDED.season,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(record.tournament_id)
        .bind(record.external_id)
        .bind(&record.home_team)
        .bind(&record.away_team)
        .bind(record.kickoff)
        .bind(record.status.as_str())
        .bind(record.home_goals)
        .bind(record.away_goals)
        .bind(record.result.map(|o| o.as_str()))
        .bind(&record.round)
        .bind(record.season)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn match_by_id(&self, id: i64) -> Result<Option<Match>> {
        let row = sqlx::query(
            r#"
            SELECT id, tournament_id, external_id, home_team, away_team, kickoff,
                   status, home_goals, away_goals, result, round, season, slip_id, locked
            FROM matches WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| match_from_row(&r)))
    }

    pub async fn matches_for_slip(&self, slip_id: Uuid) -> Result<Vec<Match>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tournament_id, external_id, home_team, away_team, kickoff,
                   status, home_goals, away_goals, result, round, season, slip_id, locked
            FROM matches
            WHERE slip_id = $1
            ORDER BY kickoff ASC
            "#,
        )
        .bind(slip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(match_from_row).collect())
    }

    /// Number of matches of a tournament kicking off inside a window.
    /// Drives the adaptive cache TTL.
    pub async fn count_matches_between(
        &self,
        tournament_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM matches
            WHERE tournament_id = $1 AND kickoff >= $2 AND kickoff < $3
            "#,
        )
        .bind(tournament_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }

    /// Batch flip of the stored lock flag for matches about to start.
    /// One-way: nothing here ever clears the flag.
    pub async fn lock_matches_starting_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE matches SET locked = TRUE
            WHERE kickoff < $1 AND locked = FALSE
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Administrative result entry. The settlement engine treats these
    /// rows exactly like API-derived ones.
    pub async fn set_match_result(
        &self,
        id: i64,
        home_goals: i32,
        away_goals: i32,
        status: MatchStatus,
        result: Option<Outcome>,
    ) -> Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE matches
            SET home_goals = $2, away_goals = $3, status = $4, result = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(home_goals)
        .bind(away_goals)
        .bind(status.as_str())
        .bind(result.map(|o| o.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    /// Administrative manual lock flag.
    pub async fn set_manual_lock(&self, id: i64, locked: bool) -> Result<u64> {
        let res = sqlx::query("UPDATE matches SET locked = $2 WHERE id = $1")
            .bind(id)
            .bind(locked)
            .execute(&self.pool)
            .await?;

        Ok(res.rows_affected())
    }

    // ==================== Slips ====================

    pub async fn slip(&self, id: Uuid) -> Result<Option<Slip>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, closes_at, entry_cost, position
            FROM slips WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Slip {
            id: r.get("id"),
            name: r.get("name"),
            closes_at: r.get("closes_at"),
            entry_cost: r.get("entry_cost"),
            position: r.get("position"),
        }))
    }

    // ==================== Predictions ====================

    /// Insert or overwrite the (user, slip) pick set. The unique pair
    /// constraint makes re-submission an update, never a second row.
    pub async fn upsert_prediction(
        &self,
        user_id: Uuid,
        slip_id: Uuid,
        picks: &HashMap<i64, Outcome>,
        at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO predictions (id, user_id, slip_id, picks, submitted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, slip_id) DO UPDATE SET
                picks = EXCLUDED.picks,
                submitted_at = EXCLUDED.submitted_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(slip_id)
        .bind(Json(picks))
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    pub async fn predictions_for_slip(&self, slip_id: Uuid) -> Result<Vec<Prediction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, slip_id, picks, points, submitted_at
            FROM predictions
            WHERE slip_id = $1
            ORDER BY submitted_at ASC
            "#,
        )
        .bind(slip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Prediction {
                id: r.get("id"),
                user_id: r.get("user_id"),
                slip_id: r.get("slip_id"),
                picks: r.get::<Json<HashMap<i64, Outcome>>, _>("picks").0,
                points: r.get("points"),
                submitted_at: r.get("submitted_at"),
            })
            .collect())
    }

    /// Write the settled score for one prediction row. Only the
    /// settlement engine calls this.
    pub async fn set_prediction_points(&self, id: Uuid, points: i32) -> Result<()> {
        sqlx::query("UPDATE predictions SET points = $2 WHERE id = $1")
            .bind(id)
            .bind(points)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Ranking aggregation: settled points summed per user, optionally
    /// filtered to one slip. Ties order by earliest first submission.
    pub async fn leaderboard(&self, slip_id: Option<Uuid>) -> Result<Vec<LeaderboardEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id,
                   COALESCE(SUM(points), 0) AS total_points,
                   MIN(submitted_at) AS first_submitted_at
            FROM predictions
            WHERE points IS NOT NULL
              AND ($1::uuid IS NULL OR slip_id = $1)
            GROUP BY user_id
            ORDER BY total_points DESC, first_submitted_at ASC
            "#,
        )
        .bind(slip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| LeaderboardEntry {
                user_id: r.get("user_id"),
                total_points: r.get("total_points"),
                first_submitted_at: r.get("first_submitted_at"),
            })
            .collect())
    }
}

fn tournament_from_row(row: &PgRow) -> Tournament {
    Tournament {
        id: row.get("id"),
        name: row.get("name"),
        league_id: row.get("league_id"),
        season: row.get("season"),
        is_active: row.get("is_active"),
        last_synced_at: row.get("last_synced_at"),
    }
}

fn match_from_row(row: &PgRow) -> Match {
    let status: String = row.get("status");
    let result: Option<String> = row.get("result");

    Match {
        id: Some(row.get("id")),
        tournament_id: row.get("tournament_id"),
        external_id: row.get("external_id"),
        home_team: row.get("home_team"),
        away_team: row.get("away_team"),
        kickoff: row.get("kickoff"),
        status: MatchStatus::from_str(&status).unwrap_or(MatchStatus::NotStarted),
        home_goals: row.get("home_goals"),
        away_goals: row.get("away_goals"),
        result: result.and_then(|s| Outcome::from_str(&s).ok()),
        round: row.get("round"),
        season: row.get("season"),
        slip_id: row.get("slip_id"),
        locked: row.get("locked"),
    }
}

#[async_trait]
impl SyncStore for PostgresStore {
    async fn tournament(&self, id: Uuid) -> Result<Option<Tournament>> {
        PostgresStore::tournament(self, id).await
    }

    async fn active_tournaments(&self) -> Result<Vec<Tournament>> {
        PostgresStore::active_tournaments(self).await
    }

    async fn count_matches_between(
        &self,
        tournament_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        PostgresStore::count_matches_between(self, tournament_id, from, to).await
    }

    async fn upsert_match(&self, record: &MatchUpsert) -> Result<i64> {
        PostgresStore::upsert_match(self, record).await
    }

    async fn mark_tournaments_synced(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()> {
        PostgresStore::mark_tournaments_synced(self, ids, at).await
    }
}

#[async_trait]
impl SettlementStore for PostgresStore {
    async fn slip(&self, id: Uuid) -> Result<Option<Slip>> {
        PostgresStore::slip(self, id).await
    }

    async fn matches_for_slip(&self, slip_id: Uuid) -> Result<Vec<Match>> {
        PostgresStore::matches_for_slip(self, slip_id).await
    }

    async fn predictions_for_slip(&self, slip_id: Uuid) -> Result<Vec<Prediction>> {
        PostgresStore::predictions_for_slip(self, slip_id).await
    }

    async fn set_prediction_points(&self, id: Uuid, points: i32) -> Result<()> {
        PostgresStore::set_prediction_points(self, id, points).await
    }
}
