use crate::proxy::cache::ResponseCache;
use crate::proxy::handlers::helix_handler::HelixHandler;
use crate::proxy::limiter::OutboundLimiter;
use crate::shared::util::config::Config;

use serde::Deserialize;
use std::time::Duration;

/// Everything the proxy handlers share. Built once and handed to actix as
/// app data, so tests can build their own.
pub struct ProxyState {
    pub helix: HelixHandler,
    pub limiter: OutboundLimiter,
    pub cache: ResponseCache
}

impl ProxyState {
    pub fn from_config(config: &Config) -> Result<ProxyState, reqwest::Error> {
        Ok(ProxyState {
            helix: HelixHandler::new(&config.twitch)?,
            limiter: OutboundLimiter::new(
                config.proxy.rate_limit_requests_per_minute,
                config.proxy.rate_limit_burst,
                Duration::from_millis(config.proxy.max_wait_ms)),
            cache: ResponseCache::new(
                config.proxy.users_cache_ttl_seconds,
                config.proxy.moderated_channels_cache_ttl_seconds)
        })
    }
}

#[derive(Deserialize)]
pub struct ChattersParams {
    #[serde(default)]
    pub broadcaster_id: String,
    #[serde(default)]
    pub moderator_id: String,
    pub after: Option<String>,
    pub first: Option<String>,
    pub access_token: Option<String>
}

#[derive(Deserialize)]
pub struct ModeratedChannelsParams {
    #[serde(default)]
    pub user_id: String,
    pub access_token: Option<String>
}
