use thiserror::Error;

/// Failure talking to Twitch, the twitch-api proxy or the analysis service
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },

    #[error("twitch auth is not configured: {0}")]
    Config(String),

    #[error("twitch returned no user")]
    NoUser
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, UpstreamError::Status { status: 404, .. })
    }
}
