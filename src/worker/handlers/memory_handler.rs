// A handler that keeps the queue and captures in memory (non-persistent)
// Used by tests and for running the worker loop without a database

use crate::shared::types::account::HelixUser;
use crate::shared::types::job::{FetchChattersPayload, Job, JobStatus, NewJob};
use crate::worker::types::{RenameRecord, StoredNames, STALE_JOB_MESSAGE};
use crate::worker::util::handler::{CaptureStore, JobQueue};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub struct StoredCapture {
    pub id: i64,
    pub session_id: i64,
    pub broadcaster_id: String,
    pub broadcaster_login: String,
    pub chatters: Vec<String>
}

#[derive(Default)]
struct State {
    next_job_id: i64,
    next_capture_id: i64,
    jobs: Vec<Job>,
    claims: Vec<i64>,
    captures: Vec<StoredCapture>,
    users: HashMap<String, HelixUser>,
    renames: Vec<RenameRecord>,
    access_tokens: HashMap<i64, String>
}

#[derive(Clone, Default)]
pub struct MemoryHandler {
    state: Arc<Mutex<State>>
}

impl MemoryHandler {
    pub fn new() -> MemoryHandler {
        MemoryHandler::default()
    }

    pub async fn set_access_token(&self, session_id: i64, token: &str) {
        self.state.lock().await.access_tokens.insert(session_id, token.to_string());
    }

    /// Seeds a stored identity, as if a previous enrichment had run
    pub async fn insert_twitch_user(&self, user: HelixUser) {
        self.state.lock().await.users.insert(user.id.clone(), user);
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn job(&self, job_id: i64) -> Option<Job> {
        self.state.lock().await.jobs.iter().find(|j| j.id == job_id).cloned()
    }

    /// Ids handed out by `claim_job`, in claim order
    pub async fn claims(&self) -> Vec<i64> {
        self.state.lock().await.claims.clone()
    }

    pub async fn captures(&self) -> Vec<StoredCapture> {
        self.state.lock().await.captures.clone()
    }

    pub async fn twitch_user(&self, twitch_user_id: &str) -> Option<HelixUser> {
        self.state.lock().await.users.get(twitch_user_id).cloned()
    }

    pub async fn renames(&self) -> Vec<RenameRecord> {
        self.state.lock().await.renames.clone()
    }

    /// Moves `started_at` of a job into the past
    pub async fn backdate_start(&self, job_id: i64, by: Duration) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) {
            if let Some(started) = job.started_at {
                job.started_at = Some(started - ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero()));
            }
        }
    }
}

fn push_job(state: &mut State, job: &NewJob) -> i64 {
    state.next_job_id += 1;
    let id = state.next_job_id;
    state.jobs.push(Job {
        id,
        job_type: job.job_type.as_str().to_string(),
        payload: job.payload.clone(),
        status: JobStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        error_message: None
    });
    id
}

fn finish(state: &mut State, job_id: i64, status: JobStatus, error: Option<&str>) {
    if let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id && j.status == JobStatus::Running) {
        job.status = status;
        job.finished_at = Some(Utc::now());
        job.error_message = error.map(|e| e.to_string());
    }
}

#[async_trait]
impl JobQueue for MemoryHandler {
    async fn claim_job(&self) -> Result<Option<Job>, sqlx::Error> {
        // Select + mark happen under one lock, which is what SKIP LOCKED
        // gives the Postgres handler
        let mut state = self.state.lock().await;
        let next = state.jobs.iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by_key(|j| (j.created_at, j.id));
        let Some(job) = next else { return Ok(None) };

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        let claimed = job.clone();
        state.claims.push(claimed.id);
        Ok(Some(claimed))
    }

    async fn complete_job(&self, job_id: i64) -> Result<(), sqlx::Error> {
        finish(&mut *self.state.lock().await, job_id, JobStatus::Done, None);
        Ok(())
    }

    async fn fail_job(&self, job_id: i64, error: &str) -> Result<(), sqlx::Error> {
        finish(&mut *self.state.lock().await, job_id, JobStatus::Failed, Some(error));
        Ok(())
    }

    async fn enqueue_job(&self, job: &NewJob) -> Result<i64, sqlx::Error> {
        Ok(push_job(&mut *self.state.lock().await, job))
    }

    async fn fail_stale_jobs(&self, older_than: Duration) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - ChronoDuration::from_std(older_than).unwrap_or(ChronoDuration::zero());
        let mut state = self.state.lock().await;
        let stale: Vec<i64> = state.jobs.iter()
            .filter(|j| j.status == JobStatus::Running && j.started_at.map_or(false, |s| s < cutoff))
            .map(|j| j.id)
            .collect();
        for id in stale.iter() {
            finish(&mut state, *id, JobStatus::Failed, Some(STALE_JOB_MESSAGE));
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl CaptureStore for MemoryHandler {
    async fn access_token_for_session(&self, session_id: i64) -> Result<Option<String>, sqlx::Error> {
        Ok(self.state.lock().await.access_tokens.get(&session_id).cloned())
    }

    async fn store_capture(&self, payload: &FetchChattersPayload, chatters: &[String], follow_up: Option<&NewJob>)
            -> Result<i64, sqlx::Error> {
        let mut state = self.state.lock().await;
        state.next_capture_id += 1;
        let id = state.next_capture_id;
        state.captures.push(StoredCapture {
            id,
            session_id: payload.session_id,
            broadcaster_id: payload.broadcaster_id.clone(),
            broadcaster_login: payload.broadcaster_login.clone(),
            chatters: chatters.to_vec()
        });
        if let Some(job) = follow_up {
            push_job(&mut state, job);
        }
        Ok(id)
    }

    async fn upsert_twitch_users(&self, users: &[HelixUser]) -> Result<Vec<RenameRecord>, sqlx::Error> {
        let mut state = self.state.lock().await;
        let mut renames = Vec::new();
        for user in users {
            let previous = state.users.get(&user.id).map(|u| StoredNames {
                login: u.login.clone(),
                display_name: u.display_name.clone()
            });
            if let Some(rename) = RenameRecord::detect(previous.as_ref(), user) {
                state.renames.push(rename.clone());
                renames.push(rename);
            }
            state.users.insert(user.id.clone(), user.clone());
        }
        Ok(renames)
    }
}
