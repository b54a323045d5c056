use crate::shared::types::account::HelixUser;
use crate::shared::types::job::{FetchChattersPayload, Job, JobStatus, NewJob};
use crate::shared::util::config;
use crate::worker::types::{RenameRecord, StoredNames, STALE_JOB_MESSAGE};
use crate::worker::util::handler::{CaptureStore, JobQueue};

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use serde_json::Value;
use std::time::Duration;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

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

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("type")?,
        payload: row.try_get::<Value, &str>("payload")?,
        status: status.parse::<JobStatus>().map_err(|s| sqlx::Error::Decode(format!("unknown job status {}", s).into()))?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        error_message: row.try_get("error_message")?
    })
}

#[async_trait]
impl JobQueue for PostgresHandler {
    async fn claim_job(&self) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Rows another worker is claiming right now are skipped, not waited on
        let row = sqlx::query(r#"
            SELECT * FROM jobs
            WHERE status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED;"#)
            .fetch_optional(&mut *tx).await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let mut job = job_from_row(&row)?;

        let now = Utc::now();
        sqlx::query("UPDATE jobs SET status = 'running', started_at = $1 WHERE id = $2;")
            .bind(now).bind(job.id)
            .execute(&mut *tx).await?;

        // Commit before the job body runs so the lock only covers the claim
        tx.commit().await?;

        job.status = JobStatus::Running;
        job.started_at = Some(now);
        Ok(Some(job))
    }

    async fn complete_job(&self, job_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query(r#"UPDATE jobs SET status = 'done', finished_at = $1, error_message = NULL
            WHERE id = $2 AND status = 'running';"#)
            .bind(Utc::now()).bind(job_id)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: i64, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(r#"UPDATE jobs SET status = 'failed', finished_at = $1, error_message = $2
            WHERE id = $3 AND status = 'running';"#)
            .bind(Utc::now()).bind(error).bind(job_id)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn enqueue_job(&self, job: &NewJob) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(r#"INSERT INTO jobs (type, payload, status, created_at)
            VALUES ($1, $2, 'pending', $3) RETURNING id;"#)
            .bind(job.job_type.as_str()).bind(&job.payload).bind(Utc::now())
            .fetch_one(&self.pool).await?;
        Ok(row.get::<i64, &str>("id"))
    }

    async fn fail_stale_jobs(&self, older_than: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(r#"UPDATE jobs SET status = 'failed', finished_at = $1, error_message = $2
            WHERE status = 'running' AND started_at < $1 - make_interval(secs => $3);"#)
            .bind(Utc::now())
            .bind(STALE_JOB_MESSAGE)
            .bind(older_than.as_secs_f64())
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CaptureStore for PostgresHandler {
    async fn access_token_for_session(&self, session_id: i64) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query(r#"
            SELECT ws.access_token
            FROM web_sessions ws
            JOIN sessions s ON s.user_id = ws.user_id
            WHERE s.id = $1 AND ws.expires_at > NOW()
            ORDER BY ws.last_activity_at DESC
            LIMIT 1;"#)
            .bind(session_id)
            .fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get::<String, &str>("access_token")))
    }

    async fn store_capture(&self, payload: &FetchChattersPayload, chatters: &[String], follow_up: Option<&NewJob>)
            -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let capture_id: i64 = sqlx::query(r#"
            INSERT INTO captures (session_id, broadcaster_id, broadcaster_login, captured_at, chatters_count, new_users_count)
            VALUES ($1, $2, $3, $4, $5, 0) RETURNING id;"#)
            .bind(payload.session_id)
            .bind(&payload.broadcaster_id)
            .bind(&payload.broadcaster_login)
            .bind(now)
            .bind(chatters.len() as i32)
            .fetch_one(&mut *tx).await?
            .get("id");

        if !chatters.is_empty() {
            sqlx::query(r#"INSERT INTO capture_chatters (capture_id, twitch_user_id)
                SELECT $1, unnest($2::text[]);"#)
                .bind(capture_id).bind(chatters)
                .execute(&mut *tx).await?;
        }

        if let Some(job) = follow_up {
            sqlx::query(r#"INSERT INTO jobs (type, payload, status, created_at)
                VALUES ($1, $2, 'pending', $3);"#)
                .bind(job.job_type.as_str()).bind(&job.payload).bind(now)
                .execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!("stored capture {} for session {} with {} chatters", capture_id, payload.session_id, chatters.len());
        Ok(capture_id)
    }

    async fn upsert_twitch_users(&self, users: &[HelixUser]) -> Result<Vec<RenameRecord>, sqlx::Error> {
        let mut renames = Vec::new();
        if users.is_empty() {
            return Ok(renames);
        }
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for user in users {
            let previous = sqlx::query("SELECT login, display_name FROM twitch_users WHERE twitch_user_id = $1 FOR UPDATE;")
                .bind(&user.id)
                .map(|row: PgRow| StoredNames {
                    login: row.get::<String, &str>("login"),
                    display_name: row.get::<String, &str>("display_name")
                })
                .fetch_optional(&mut *tx).await?;

            if let Some(rename) = RenameRecord::detect(previous.as_ref(), user) {
                sqlx::query(r#"INSERT INTO twitch_user_names
                    (twitch_user_id, old_login, new_login, old_display_name, new_display_name, detected_at)
                    VALUES ($1, $2, $3, $4, $5, $6);"#)
                    .bind(&rename.twitch_user_id)
                    .bind(&rename.old_login).bind(&rename.new_login)
                    .bind(&rename.old_display_name).bind(&rename.new_display_name)
                    .bind(now)
                    .execute(&mut *tx).await?;
                info!("user {} renamed: login {} -> {}, display name {} -> {}",
                    rename.twitch_user_id, rename.old_login, rename.new_login,
                    rename.old_display_name, rename.new_display_name);
                renames.push(rename);
            }

            sqlx::query(r#"
                INSERT INTO twitch_users (twitch_user_id, login, display_name, created_at, broadcaster_type, type, view_count, last_fetched_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (twitch_user_id) DO UPDATE SET
                    login = EXCLUDED.login,
                    display_name = EXCLUDED.display_name,
                    created_at = EXCLUDED.created_at,
                    broadcaster_type = EXCLUDED.broadcaster_type,
                    type = EXCLUDED.type,
                    view_count = EXCLUDED.view_count,
                    last_fetched_at = EXCLUDED.last_fetched_at;"#)
                .bind(&user.id)
                .bind(&user.login)
                .bind(&user.display_name)
                .bind(user.created_at())
                .bind(&user.broadcaster_type)
                .bind(&user.user_type)
                .bind(user.view_count)
                .bind(now)
                .execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(renames)
    }
}

/// Operator queries used by `jobctl`
impl PostgresHandler {
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let rows = sqlx::query(r#"SELECT * FROM jobs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC LIMIT $2;"#)
            .bind(status.map(|s| s.as_str()))
            .bind(limit)
            .fetch_all(&self.pool).await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1;")
            .bind(job_id)
            .fetch_optional(&self.pool).await?;
        row.as_ref().map(job_from_row).transpose()
    }
}
