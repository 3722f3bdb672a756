//! PostgreSQL-backed [`MatchStore`]

use std::time::Duration;

use log::LevelFilter;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;

use super::model::{
    Commentary, Match, MatchId, MatchLifecycle, MatchStatus, NewCommentary, NewMatch, Score,
};
use super::store::{MatchStore, StoreError, StoreFuture};

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout: u64,
}

impl DatabaseConfig {
    pub fn default_postgres(url: &str) -> Self {
        DatabaseConfig {
            url: url.to_string(),
            max_connections: 10,
            min_connections: 1,
            idle_timeout: 600,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub async fn create_pool(&self) -> Result<PgPool, sqlx::Error> {
        let connect_options = self
            .url
            .parse::<PgConnectOptions>()?
            .log_statements(LevelFilter::Debug);
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections.min(self.max_connections))
            .idle_timeout(Some(Duration::from_secs(self.idle_timeout)))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
    }
}

const SCHEMA: &[&str] = &[
    r#"DO $$ BEGIN
        CREATE TYPE match_status AS ENUM ('scheduled', 'live', 'finished');
    EXCEPTION WHEN duplicate_object THEN NULL;
    END $$"#,
    r#"CREATE TABLE IF NOT EXISTS matches (
        id BIGSERIAL PRIMARY KEY,
        sport TEXT NOT NULL,
        home_team TEXT NOT NULL,
        away_team TEXT NOT NULL,
        status match_status NOT NULL DEFAULT 'scheduled',
        start_time TIMESTAMPTZ,
        end_time TIMESTAMPTZ,
        home_score INTEGER NOT NULL DEFAULT 0,
        away_score INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS commentary (
        id BIGSERIAL PRIMARY KEY,
        match_id BIGINT NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
        minute INTEGER,
        sequence INTEGER,
        period TEXT,
        event_type TEXT,
        actor TEXT,
        team TEXT,
        message TEXT,
        metadata JSONB,
        tags TEXT[],
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    "CREATE INDEX IF NOT EXISTS commentary_match_id_idx ON commentary (match_id, created_at DESC)",
];

const MATCH_COLUMNS: &str = "id, sport, home_team, away_team, status, start_time, end_time, \
     home_score, away_score, created_at";

const COMMENTARY_COLUMNS: &str = "id, match_id, minute, sequence, period, event_type, actor, \
     team, message, metadata, tags, created_at";

/// Store backed by a sqlx Postgres pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = config.create_pool().await?;
        Ok(Self::new(pool))
    }

    /// Create the enum type and tables if they are missing
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        log::info!("database schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl MatchStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn list_matches(&self, limit: usize) -> StoreFuture<'_, Vec<Match>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {MATCH_COLUMNS} FROM matches ORDER BY created_at DESC, id DESC LIMIT $1"
            );
            let rows = sqlx::query_as::<_, Match>(&sql)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        })
    }

    fn create_match(&self, new: NewMatch, status: MatchStatus) -> StoreFuture<'_, Match> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO matches \
                 (sport, home_team, away_team, status, start_time, end_time, home_score, away_score) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {MATCH_COLUMNS}"
            );
            let row = sqlx::query_as::<_, Match>(&sql)
                .bind(new.sport)
                .bind(new.home_team)
                .bind(new.away_team)
                .bind(status)
                .bind(new.start_time)
                .bind(new.end_time)
                .bind(new.home_score)
                .bind(new.away_score)
                .fetch_one(&self.pool)
                .await?;
            Ok(row)
        })
    }

    fn read_match_lifecycle_fields(
        &self,
        id: MatchId,
    ) -> StoreFuture<'_, Option<MatchLifecycle>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, MatchLifecycle>(
                "SELECT id, status, start_time, end_time FROM matches WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        })
    }

    fn write_match_status(&self, id: MatchId, status: MatchStatus) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE matches SET status = $1 WHERE id = $2")
                .bind(status)
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::MatchNotFound(id));
            }
            Ok(())
        })
    }

    fn update_score(&self, id: MatchId, score: Score) -> StoreFuture<'_, Option<Match>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE matches SET home_score = $1, away_score = $2 WHERE id = $3 \
                 RETURNING {MATCH_COLUMNS}"
            );
            let row = sqlx::query_as::<_, Match>(&sql)
                .bind(score.home_score)
                .bind(score.away_score)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        })
    }

    fn list_commentary(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> StoreFuture<'_, Vec<Commentary>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {COMMENTARY_COLUMNS} FROM commentary WHERE match_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT $2"
            );
            let rows = sqlx::query_as::<_, Commentary>(&sql)
                .bind(match_id)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        })
    }

    fn create_commentary(
        &self,
        match_id: MatchId,
        new: NewCommentary,
    ) -> StoreFuture<'_, Commentary> {
        Box::pin(async move {
            let sql = format!(
                "INSERT INTO commentary \
                 (match_id, minute, sequence, period, event_type, actor, team, message, metadata, tags) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {COMMENTARY_COLUMNS}"
            );
            let result = sqlx::query_as::<_, Commentary>(&sql)
                .bind(match_id)
                .bind(new.minute)
                .bind(new.sequence)
                .bind(new.period)
                .bind(new.event_type)
                .bind(new.actor)
                .bind(new.team)
                .bind(new.message)
                .bind(new.metadata.map(Value::Object))
                .bind(new.tags)
                .fetch_one(&self.pool)
                .await;

            match result {
                Ok(row) => Ok(row),
                Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                    Err(StoreError::MatchNotFound(match_id))
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}
