use crate::gateway::types::{AccountHistory, ExportAccount, NameChange, SavedSession, TwitchTokenResponse};
use crate::shared::types::account::{CurrentUser, HelixUser, TwitchUserId};
use crate::shared::types::job::NewJob;
use crate::shared::util::config;

use chrono::{Duration, Utc};
use log::info;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};
use uuid::Uuid;

/// Random hex id used for web sessions and analysis sessions
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

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
}

// Users + web sessions
impl PostgresHandler {
    /// Returns the internal user id
    pub async fn upsert_user(&self, user: &HelixUser) -> Result<i64, sqlx::Error> {
        let now = Utc::now();
        let row = sqlx::query(r#"
            INSERT INTO users (twitch_user_id, login, display_name, avatar_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (twitch_user_id) DO UPDATE SET
                login = EXCLUDED.login,
                display_name = EXCLUDED.display_name,
                avatar_url = EXCLUDED.avatar_url,
                updated_at = EXCLUDED.updated_at
            RETURNING id;"#)
            .bind(&user.id)
            .bind(&user.login)
            .bind(&user.display_name)
            .bind(&user.profile_image_url)
            .bind(now)
            .fetch_one(&self.pool).await?;
        Ok(row.get("id"))
    }

    pub async fn create_web_session(&self, user_id: i64, token: &TwitchTokenResponse, valid_for: Duration)
            -> Result<String, sqlx::Error> {
        let session_id = new_session_id();
        let now = Utc::now();
        sqlx::query(r#"
            INSERT INTO web_sessions (session_id, user_id, access_token, refresh_token, scopes, created_at, last_activity_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7);"#)
            .bind(&session_id)
            .bind(user_id)
            .bind(&token.access_token)
            .bind(&token.refresh_token)
            .bind(serde_json::json!(token.scope))
            .bind(now)
            .bind(now + valid_for)
            .execute(&self.pool).await?;
        Ok(session_id)
    }

    /// Resolves an unexpired web session and marks it as active now
    pub async fn load_current_user(&self, web_session_id: &str) -> Result<Option<CurrentUser>, sqlx::Error> {
        let user = sqlx::query(r#"
            UPDATE web_sessions s SET last_activity_at = NOW()
            FROM users u
            WHERE s.user_id = u.id AND s.session_id = $1 AND s.expires_at > NOW()
            RETURNING u.id, u.twitch_user_id, u.login, u.display_name, s.session_id, s.access_token;"#)
            .bind(web_session_id)
            .map(|row: PgRow| CurrentUser {
                id: row.get("id"),
                twitch_user_id: row.get("twitch_user_id"),
                login: row.get("login"),
                display_name: row.get("display_name"),
                web_session_id: row.get("session_id"),
                access_token: row.get("access_token")
            })
            .fetch_optional(&self.pool).await?;
        Ok(user)
    }

    pub async fn delete_web_session(&self, web_session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM web_sessions WHERE session_id = $1;")
            .bind(web_session_id)
            .execute(&self.pool).await?;
        Ok(())
    }
}

// Analysis sessions
impl PostgresHandler {
    pub async fn active_session(&self, user_id: i64) -> Result<Option<(i64, String)>, sqlx::Error> {
        sqlx::query("SELECT id, session_uuid FROM sessions WHERE user_id = $1 AND status = 'active' LIMIT 1;")
            .bind(user_id)
            .map(|row: PgRow| (row.get("id"), row.get("session_uuid")))
            .fetch_optional(&self.pool).await
    }

    pub async fn has_active_session(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.active_session(user_id).await?.is_some())
    }

    /// At most one active session per user is enforced by a partial unique
    /// index, so a racing insert just falls through to the select
    pub async fn get_or_create_active_session(&self, user_id: i64, valid_for: Duration)
            -> Result<(i64, String), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(r#"
            INSERT INTO sessions (session_uuid, user_id, status, created_at, expires_at, updated_at)
            VALUES ($1, $2, 'active', $3, $4, $3)
            ON CONFLICT (user_id) WHERE status = 'active' DO NOTHING;"#)
            .bind(new_session_id())
            .bind(user_id)
            .bind(now)
            .bind(now + valid_for)
            .execute(&self.pool).await?;

        self.active_session(user_id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn enqueue_job(&self, job: &NewJob) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(r#"INSERT INTO jobs (type, payload, status, created_at)
            VALUES ($1, $2, 'pending', $3) RETURNING id;"#)
            .bind(job.job_type.as_str())
            .bind(&job.payload)
            .bind(Utc::now())
            .fetch_one(&self.pool).await?;
        Ok(row.get("id"))
    }

    /// active -> saved. Returns the saved session id, if there was one.
    pub async fn save_active_session(&self, user_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query(r#"UPDATE sessions SET status = 'saved', updated_at = $1
            WHERE user_id = $2 AND status = 'active' RETURNING id;"#)
            .bind(Utc::now())
            .bind(user_id)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Drops the captures of the active session and marks it deleted
    pub async fn purge_active_session(&self, user_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(r#"UPDATE sessions SET status = 'deleted', updated_at = $1
            WHERE user_id = $2 AND status = 'active' RETURNING id;"#)
            .bind(Utc::now())
            .bind(user_id)
            .fetch_optional(&mut *tx).await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let session_id: i64 = row.get("id");

        // capture_chatters go with their captures
        sqlx::query("DELETE FROM captures WHERE session_id = $1;")
            .bind(session_id)
            .execute(&mut *tx).await?;
        tx.commit().await?;

        info!("session {} purged by user {}", session_id, user_id);
        Ok(Some(session_id))
    }

    /// Deletes one of the user's saved sessions with its data. `false` if
    /// no such saved session exists.
    pub async fn delete_saved_session(&self, user_id: i64, session_uuid: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(r#"SELECT id FROM sessions
            WHERE user_id = $1 AND session_uuid = $2 AND status = 'saved' FOR UPDATE;"#)
            .bind(user_id)
            .bind(session_uuid)
            .fetch_optional(&mut *tx).await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };
        let session_id: i64 = row.get("id");

        sqlx::query("DELETE FROM captures WHERE session_id = $1;")
            .bind(session_id)
            .execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sessions WHERE id = $1;")
            .bind(session_id)
            .execute(&mut *tx).await?;
        tx.commit().await?;

        info!("saved session {} deleted by user {}", session_id, user_id);
        Ok(true)
    }

    pub async fn saved_sessions(&self, user_id: i64) -> Result<Vec<SavedSession>, sqlx::Error> {
        sqlx::query(r#"SELECT id, session_uuid, status, created_at, updated_at FROM sessions
            WHERE user_id = $1 AND status = 'saved'
            ORDER BY updated_at DESC;"#)
            .bind(user_id)
            .map(|row: PgRow| SavedSession {
                id: row.get("id"),
                session_uuid: row.get("session_uuid"),
                status: row.get("status"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at")
            })
            .fetch_all(&self.pool).await
    }

    pub async fn owns_saved_session(&self, user_id: i64, session_uuid: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM sessions WHERE user_id = $1 AND session_uuid = $2 AND status = 'saved';")
            .bind(user_id)
            .bind(session_uuid)
            .fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }
}

// Export + account history
impl PostgresHandler {
    /// Chatters not enriched yet are exported with blank names
    pub async fn export_accounts(&self, session_uuid: &str) -> Result<Vec<ExportAccount>, sqlx::Error> {
        sqlx::query(r#"
            SELECT
                cc.twitch_user_id,
                COALESCE(tu.login, '') AS login,
                COALESCE(tu.display_name, '') AS display_name,
                tu.created_at,
                COUNT(DISTINCT cc.capture_id) AS seen_count,
                MIN(c.captured_at) AS first_seen,
                MAX(c.captured_at) AS last_seen
            FROM capture_chatters cc
            JOIN captures c ON cc.capture_id = c.id
            JOIN sessions s ON c.session_id = s.id
            LEFT JOIN twitch_users tu ON tu.twitch_user_id = cc.twitch_user_id
            WHERE s.session_uuid = $1
            GROUP BY cc.twitch_user_id, tu.login, tu.display_name, tu.created_at
            ORDER BY seen_count DESC, login ASC;"#)
            .bind(session_uuid)
            .map(|row: PgRow| ExportAccount {
                twitch_user_id: row.get("twitch_user_id"),
                login: row.get("login"),
                display_name: row.get("display_name"),
                created_at: row.get("created_at"),
                seen_count: row.get("seen_count"),
                first_seen: row.get("first_seen"),
                last_seen: row.get("last_seen")
            })
            .fetch_all(&self.pool).await
    }

    pub async fn account_history(&self, twitch_user_id: &TwitchUserId) -> Result<Option<AccountHistory>, sqlx::Error> {
        let account = sqlx::query("SELECT login, display_name, created_at FROM twitch_users WHERE twitch_user_id = $1;")
            .bind(twitch_user_id)
            .fetch_optional(&self.pool).await?;
        let Some(account) = account else { return Ok(None) };

        let history = sqlx::query(r#"
            SELECT detected_at, old_login, new_login, old_display_name, new_display_name
            FROM twitch_user_names
            WHERE twitch_user_id = $1
            ORDER BY detected_at DESC, id DESC;"#)
            .bind(twitch_user_id)
            .map(|row: PgRow| NameChange {
                changed_at: row.get("detected_at"),
                old_login: row.get("old_login"),
                new_login: row.get("new_login"),
                old_display_name: row.get("old_display_name"),
                new_display_name: row.get("new_display_name")
            })
            .fetch_all(&self.pool).await?;

        Ok(Some(AccountHistory {
            twitch_user_id: twitch_user_id.to_string(),
            login: account.get("login"),
            display_name: account.get("display_name"),
            created_at: account.get("created_at"),
            history
        }))
    }
}
