use crate::gateway::error::UpstreamError;
use crate::gateway::types::{Channel, TwitchTokenResponse, TWITCH_SCOPES};
use crate::shared::types::account::{HelixModeratedChannelsResponse, HelixUser, HelixUsersResponse};
use crate::shared::util::config::TwitchConfig;

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenUrl};
use reqwest::{Client, Response};
use std::time::Duration;

/// OAuth against id.twitch.tv plus the few Helix reads the gateway needs.
/// Moderated channels go through the twitch-api proxy so they share its
/// cache and rate limit.
#[derive(Clone)]
pub struct TwitchHandler {
    client: Client,
    config: TwitchConfig,
    proxy_base_url: String
}

async fn check(service: &'static str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status { service, status: status.as_u16(), body });
    }
    Ok(response)
}

impl TwitchHandler {
    pub fn new(config: &TwitchConfig, proxy_base_url: &str) -> Result<TwitchHandler, UpstreamError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(TwitchHandler {
            client,
            config: config.clone(),
            proxy_base_url: proxy_base_url.trim_end_matches('/').to_string()
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.auth_base_url.trim_end_matches('/'), path)
    }

    fn oauth_client(&self) -> Result<BasicClient, UpstreamError> {
        if self.config.client_id.is_empty() || self.config.redirect_url.is_empty() {
            return Err(UpstreamError::Config("client id and redirect url are required".to_string()));
        }
        let config_error = |err: oauth2::url::ParseError| UpstreamError::Config(err.to_string());
        Ok(BasicClient::new(
                ClientId::new(self.config.client_id.clone()),
                Some(ClientSecret::new(self.config.client_secret.clone())),
                AuthUrl::new(self.auth_url("authorize")).map_err(config_error)?,
                Some(TokenUrl::new(self.auth_url("token")).map_err(config_error)?))
            .set_redirect_uri(RedirectUrl::new(self.config.redirect_url.clone()).map_err(config_error)?))
    }

    /// Authorize URL and the random state the callback must echo back
    pub fn authorize_url(&self) -> Result<(String, String), UpstreamError> {
        let client = self.oauth_client()?;
        let mut request = client.authorize_url(CsrfToken::new_random);
        for scope in TWITCH_SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        let (url, state) = request.url();
        Ok((url.to_string(), state.secret().clone()))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TwitchTokenResponse, UpstreamError> {
        if self.config.client_secret.is_empty() {
            return Err(UpstreamError::Config("client secret is required".to_string()));
        }
        let response = self.client.post(self.auth_url("token"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_url.as_str())
            ])
            .send().await?;
        Ok(check("twitch token endpoint", response).await?.json::<TwitchTokenResponse>().await?)
    }

    /// The user the token belongs to
    pub async fn fetch_user(&self, access_token: &str) -> Result<HelixUser, UpstreamError> {
        let response = self.client.get(format!("{}/users", self.config.helix_base_url.trim_end_matches('/')))
            .header("Client-ID", &self.config.client_id)
            .bearer_auth(access_token)
            .send().await?;
        let users = check("twitch users endpoint", response).await?.json::<HelixUsersResponse>().await?;
        users.data.into_iter().next().ok_or(UpstreamError::NoUser)
    }

    pub async fn moderated_channels(&self, access_token: &str, user_id: &str) -> Result<Vec<Channel>, UpstreamError> {
        let response = self.client.get(format!("{}/moderated-channels", self.proxy_base_url))
            .bearer_auth(access_token)
            .query(&[("user_id", user_id)])
            .send().await?;
        let channels = check("twitch-api", response).await?.json::<HelixModeratedChannelsResponse>().await?;
        Ok(channels.data.into_iter().map(|c| Channel {
            broadcaster_id: c.broadcaster_id,
            broadcaster_login: c.broadcaster_login,
            broadcaster_name: c.broadcaster_name
        }).collect())
    }

    pub async fn revoke(&self, access_token: &str) -> Result<(), UpstreamError> {
        let response = self.client.post(self.auth_url("revoke"))
            .form(&[("client_id", self.config.client_id.as_str()), ("token", access_token)])
            .send().await?;
        check("twitch revoke endpoint", response).await?;
        Ok(())
    }
}

/// Own channel first, then moderated ones without repeating it
pub fn merge_channels(own: Channel, moderated: Vec<Channel>) -> Vec<Channel> {
    let own_id = own.broadcaster_id.clone();
    let mut channels = vec![own];
    channels.extend(moderated.into_iter().filter(|c| c.broadcaster_id != own_id));
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> Channel {
        Channel { broadcaster_id: id.to_string(), broadcaster_login: format!("c{}", id), broadcaster_name: format!("C{}", id) }
    }

    fn configured() -> TwitchConfig {
        TwitchConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_url: "http://localhost:8080/auth/callback".to_string(),
            ..TwitchConfig::default()
        }
    }

    #[test]
    fn own_channel_is_listed_once() {
        let channels = merge_channels(channel("1"), vec![channel("2"), channel("1"), channel("3")]);
        let ids: Vec<&str> = channels.iter().map(|c| c.broadcaster_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn authorize_url_carries_scopes_and_state() {
        let handler = TwitchHandler::new(&configured(), "http://twitch-api:8081").unwrap();
        let (url, state) = handler.authorize_url().unwrap();

        assert!(url.starts_with("https://id.twitch.tv/oauth2/authorize?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("user%3Aread%3Amoderated_channels+moderator%3Aread%3Achatters"));
        assert!(url.contains(&format!("state={}", state)));
    }

    #[test]
    fn unconfigured_auth_is_refused() {
        let handler = TwitchHandler::new(&TwitchConfig::default(), "http://twitch-api:8081").unwrap();
        assert!(matches!(handler.authorize_url(), Err(UpstreamError::Config(_))));
    }
}
