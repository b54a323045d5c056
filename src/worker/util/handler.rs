//! The seams the worker loop is written against. Postgres and the proxy
//! back them in production; tests swap in memory and scripted versions.

use crate::shared::types::account::{HelixChattersResponse, HelixUser};
use crate::shared::types::job::{FetchChattersPayload, Job, NewJob};
use crate::worker::error::ProxyError;
use crate::worker::types::RenameRecord;

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Claims the oldest pending job and marks it running. Concurrent callers
    /// must never receive the same job.
    async fn claim_job(&self) -> Result<Option<Job>, sqlx::Error>;

    /// running -> done. A job that is no longer running is left untouched.
    async fn complete_job(&self, job_id: i64) -> Result<(), sqlx::Error>;

    /// running -> failed, recording the message
    async fn fail_job(&self, job_id: i64, error: &str) -> Result<(), sqlx::Error>;

    async fn enqueue_job(&self, job: &NewJob) -> Result<i64, sqlx::Error>;

    /// Fails every job that has been running for longer than `older_than`.
    /// Returns how many were failed.
    async fn fail_stale_jobs(&self, older_than: Duration) -> Result<u64, sqlx::Error>;
}

#[async_trait]
pub trait CaptureStore: Send + Sync {
    /// Token of the most recently active, unexpired web session belonging to
    /// the owner of analysis session `session_id`
    async fn access_token_for_session(&self, session_id: i64) -> Result<Option<String>, sqlx::Error>;

    /// Writes the capture, one row per chatter and the follow-up job in a
    /// single transaction. Returns the capture id.
    async fn store_capture(&self, payload: &FetchChattersPayload, chatters: &[String], follow_up: Option<&NewJob>)
        -> Result<i64, sqlx::Error>;

    /// Upserts identities and appends one history row per existing user
    /// whose login or display name changed. Returns the appended rows.
    async fn upsert_twitch_users(&self, users: &[HelixUser]) -> Result<Vec<RenameRecord>, sqlx::Error>;
}

#[async_trait]
pub trait TwitchSource: Send + Sync {
    async fn chatters_page(&self, access_token: &str, broadcaster_id: &str, moderator_id: &str, cursor: Option<&str>)
        -> Result<HelixChattersResponse, ProxyError>;

    async fn users(&self, access_token: &str, ids: &[String]) -> Result<Vec<HelixUser>, ProxyError>;
}
