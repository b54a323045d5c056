use std::time::Duration;
use thiserror::Error;

/// Failure talking to the twitch-api proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("request to twitch-api failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("twitch-api {endpoint} returned {status}: {body}")]
    Status { endpoint: String, status: u16, body: String },

    #[error("twitch-api rate limited the request")]
    RateLimited
}

/// Why a job ended up `failed`. The Display text is what lands in
/// `jobs.error_message`.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("unknown job type {0}")]
    UnknownType(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("cannot get access token for session {0}")]
    MissingAccessToken(i64),

    #[error("{0}")]
    Upstream(#[from] ProxyError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job timed out after {0:?}")]
    TimedOut(Duration)
}
