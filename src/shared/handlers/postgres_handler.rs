use crate::shared::util::config;

use sqlx::postgres::PgPool;

/// Owns the schema. Every service calls `init` on startup, so tables are
/// created by whichever process comes up first.
#[derive(Clone)]
pub struct PostgresHandler {
    pool: PgPool
}

impl PostgresHandler {
    pub async fn new() -> Result<PostgresHandler, sqlx::Error> {
        Ok(PostgresHandler { pool: config::get_pool().await? })
    }

    pub fn from_pool(pool: PgPool) -> PostgresHandler {
        PostgresHandler { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl PostgresHandler {
    // Called on first launch for setup
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        // Gateway logins
        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            twitch_user_id text NOT NULL UNIQUE,
            login text NOT NULL,
            display_name text NOT NULL,
            avatar_url text,
            created_at timestamptz NOT NULL,
            updated_at timestamptz NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS web_sessions (
            session_id text PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id),
            access_token text NOT NULL,
            refresh_token text,
            scopes jsonb,
            created_at timestamptz NOT NULL,
            last_activity_at timestamptz NOT NULL,
            expires_at timestamptz NOT NULL
        );"#).execute(&self.pool).await?;

        // Analysis sessions
        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id BIGSERIAL PRIMARY KEY,
            session_uuid text NOT NULL UNIQUE,
            user_id BIGINT NOT NULL REFERENCES users(id),
            status text NOT NULL CHECK(status IN ('active', 'saved', 'deleted')),
            created_at timestamptz NOT NULL,
            expires_at timestamptz,
            updated_at timestamptz NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS sessions_one_active_idx ON sessions(user_id) WHERE status = 'active';")
            .execute(&self.pool).await?;

        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS captures (
            id BIGSERIAL PRIMARY KEY,
            session_id BIGINT NOT NULL REFERENCES sessions(id),
            broadcaster_id text NOT NULL,
            broadcaster_login text NOT NULL,
            captured_at timestamptz NOT NULL,
            chatters_count integer NOT NULL,
            new_users_count integer NOT NULL DEFAULT 0
        );"#).execute(&self.pool).await?;

        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS capture_chatters (
            capture_id BIGINT NOT NULL REFERENCES captures(id) ON DELETE CASCADE,
            twitch_user_id text NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS capture_chatters_user_idx ON capture_chatters(twitch_user_id);")
            .execute(&self.pool).await?;

        // Enriched identities + rename log
        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS twitch_users (
            twitch_user_id text PRIMARY KEY,
            login text NOT NULL,
            display_name text NOT NULL,
            created_at timestamptz,
            broadcaster_type text NOT NULL DEFAULT '',
            type text NOT NULL DEFAULT '',
            view_count BIGINT NOT NULL DEFAULT 0,
            last_fetched_at timestamptz NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS twitch_user_names (
            id BIGSERIAL PRIMARY KEY,
            twitch_user_id text NOT NULL,
            old_login text NOT NULL,
            new_login text NOT NULL,
            old_display_name text NOT NULL,
            new_display_name text NOT NULL,
            detected_at timestamptz NOT NULL
        );"#).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS twitch_user_names_user_idx ON twitch_user_names(twitch_user_id);")
            .execute(&self.pool).await?;

        // Work queue
        sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id BIGSERIAL PRIMARY KEY,
            type text NOT NULL,
            payload jsonb NOT NULL,
            status text NOT NULL CHECK(status IN ('pending', 'running', 'done', 'failed')),
            created_at timestamptz NOT NULL,
            started_at timestamptz,
            finished_at timestamptz,
            error_message text
        );"#).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS jobs_pending_idx ON jobs(created_at, id) WHERE status = 'pending';")
            .execute(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1;").execute(&self.pool).await?;
        Ok(())
    }
}
