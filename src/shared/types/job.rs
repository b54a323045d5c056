//! Job queue rows and payloads

use serde::{Serialize, Deserialize};
use serde_json::Value;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum JobType {
    #[serde(rename = "FETCH_CHATTERS")]
    FetchChatters,
    #[serde(rename = "FETCH_USERS_INFO")]
    FetchUsersInfo
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FetchChatters => "FETCH_CHATTERS",
            JobType::FetchUsersInfo => "FETCH_USERS_INFO"
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FETCH_CHATTERS" => Ok(JobType::FetchChatters),
            "FETCH_USERS_INFO" => Ok(JobType::FetchUsersInfo),
            other => Err(other.to_string())
        }
    }
}

/// pending -> running -> {done, failed}, never backwards
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed"
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(other.to_string())
        }
    }
}

/// A claimed unit of work. `job_type` stays raw text so rows written by
/// something newer than this worker can still be claimed and failed.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    pub payload: Value,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>
}

/// A row about to be inserted as `pending`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct NewJob {
    pub job_type: JobType,
    pub payload: Value
}

impl NewJob {
    pub fn fetch_chatters(payload: &FetchChattersPayload) -> Result<NewJob, serde_json::Error> {
        Ok(NewJob { job_type: JobType::FetchChatters, payload: serde_json::to_value(payload)? })
    }

    /// A fresh pending copy of a failed job. Any other status, or a type
    /// this build does not know, is refused.
    pub fn requeue_of(job: &Job) -> Result<NewJob, String> {
        if job.status != JobStatus::Failed {
            return Err(format!("job {} is {}, only failed jobs can be requeued", job.id, job.status));
        }
        let job_type = job.job_type.parse::<JobType>()
            .map_err(|unknown| format!("job {} has unknown type `{}`", job.id, unknown))?;
        Ok(NewJob { job_type, payload: job.payload.clone() })
    }

    pub fn fetch_users_info(payload: &FetchUsersInfoPayload) -> Result<NewJob, serde_json::Error> {
        Ok(NewJob { job_type: JobType::FetchUsersInfo, payload: serde_json::to_value(payload)? })
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FetchChattersPayload {
    pub session_id: i64,
    pub twitch_user_id: String,
    pub broadcaster_id: String,
    #[serde(default)]
    pub broadcaster_login: String
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FetchUsersInfoPayload {
    pub session_id: i64,
    #[serde(default)]
    pub user_ids: Vec<String>
}
