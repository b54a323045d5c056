use crate::shared::util::config::TwitchConfig;

use actix_web::web::Bytes;
use reqwest::Client;
use std::time::Duration;

/// Raw Helix answer, passed through to the caller untouched
pub struct HelixResponse {
    pub status: u16,
    pub body: Bytes
}

#[derive(Clone)]
pub struct HelixHandler {
    client: Client,
    base_url: String,
    client_id: String
}

impl HelixHandler {
    pub fn new(config: &TwitchConfig) -> Result<HelixHandler, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(HelixHandler {
            client,
            base_url: config.helix_base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone()
        })
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)], access_token: &str)
            -> Result<HelixResponse, reqwest::Error> {
        let response = self.client.get(format!("{}{}", self.base_url, path))
            .header("Client-ID", &self.client_id)
            .bearer_auth(access_token)
            .query(query)
            .send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HelixResponse { status, body })
    }

    pub async fn chatters(&self, access_token: &str, broadcaster_id: &str, moderator_id: &str,
            first: &str, after: Option<&str>) -> Result<HelixResponse, reqwest::Error> {
        let mut query = vec![("broadcaster_id", broadcaster_id), ("moderator_id", moderator_id), ("first", first)];
        if let Some(after) = after {
            query.push(("after", after));
        }
        self.get("/chat/chatters", &query, access_token).await
    }

    pub async fn users(&self, access_token: &str, ids: &[String]) -> Result<HelixResponse, reqwest::Error> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("id", id.as_str())).collect();
        self.get("/users", &query, access_token).await
    }

    pub async fn moderated_channels(&self, access_token: &str, user_id: &str) -> Result<HelixResponse, reqwest::Error> {
        self.get("/moderation/channels", &[("user_id", user_id)], access_token).await
    }
}
