use crate::analysis::types::SessionSummary;
use crate::gateway::error::UpstreamError;

use reqwest::Client;
use std::time::Duration;

/// Client for the analysis service
#[derive(Clone)]
pub struct AnalysisHandler {
    client: Client,
    base_url: String
}

impl AnalysisHandler {
    pub fn new(base_url: &str) -> Result<AnalysisHandler, UpstreamError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(AnalysisHandler { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub async fn summary(&self, session_uuid: &str, broadcaster_ids: &[String]) -> Result<SessionSummary, UpstreamError> {
        let mut request = self.client.get(format!("{}/sessions/{}/summary", self.base_url, session_uuid));
        if !broadcaster_ids.is_empty() {
            request = request.query(&[("broadcaster_id", broadcaster_ids.join(","))]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { service: "analysis", status: status.as_u16(), body });
        }
        Ok(response.json::<SessionSummary>().await?)
    }
}
