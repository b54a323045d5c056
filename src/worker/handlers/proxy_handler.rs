use crate::shared::types::account::{HelixChattersResponse, HelixUser, HelixUsersResponse};
use crate::worker::error::ProxyError;
use crate::worker::util::handler::TwitchSource;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;

/// Largest page Helix hands out for `/chat/chatters`
pub const CHATTERS_PAGE_SIZE: u32 = 1000;

/// Talks to the twitch-api proxy, never to Helix directly
#[derive(Clone)]
pub struct ProxyHandler {
    client: Client,
    base_url: String
}

impl ProxyHandler {
    pub fn new(base_url: &str, timeout: Duration) -> Result<ProxyHandler, ProxyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(ProxyHandler { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn check(endpoint: &str, response: Response) -> Result<Response, ProxyError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProxyError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Status { endpoint: endpoint.to_string(), status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl TwitchSource for ProxyHandler {
    async fn chatters_page(&self, access_token: &str, broadcaster_id: &str, moderator_id: &str, cursor: Option<&str>)
            -> Result<HelixChattersResponse, ProxyError> {
        let mut query = vec![
            ("broadcaster_id", broadcaster_id.to_string()),
            ("moderator_id", moderator_id.to_string()),
            ("first", CHATTERS_PAGE_SIZE.to_string())
        ];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.push(("after", cursor.to_string()));
        }

        let response = self.client.get(format!("{}/chatters", self.base_url))
            .bearer_auth(access_token)
            .query(&query)
            .send().await?;
        let response = ProxyHandler::check("/chatters", response).await?;
        Ok(response.json::<HelixChattersResponse>().await?)
    }

    async fn users(&self, access_token: &str, ids: &[String]) -> Result<Vec<HelixUser>, ProxyError> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();
        let response = self.client.get(format!("{}/users", self.base_url))
            .bearer_auth(access_token)
            .query(&query)
            .send().await?;
        let response = ProxyHandler::check("/users", response).await?;
        Ok(response.json::<HelixUsersResponse>().await?.data)
    }
}
