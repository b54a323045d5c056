//! Loads config from config.toml, then applies environment overrides

use serde_derive::Deserialize;
use cached::proc_macro::cached;
use std::env;
use std::fs;
use std::process::exit;
use std::time::Duration;
use toml;
use sqlx::postgres::{PgPoolOptions, PgPool};

#[derive(Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub twitch: TwitchConfig,
    pub proxy: ProxyConfig,
    pub worker: WorkerConfig,
    pub analysis: AnalysisConfig
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32
}

/// Gateway server settings
#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub log: bool,
    pub login_cookie_valid_duration_seconds: u64,
    pub web_session_valid_duration_seconds: u64,
    pub session_key_path: String,
    pub request_quota_replenish_ms: u64,
    pub request_quota: u32
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct TwitchConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub helix_base_url: String,
    pub auth_base_url: String
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    pub port: u16,
    pub rate_limit_requests_per_minute: u32,
    pub rate_limit_burst: u32,
    pub max_wait_ms: u64,
    pub users_cache_ttl_seconds: u64,
    pub moderated_channels_cache_ttl_seconds: u64,
    pub cache_sweep_interval_seconds: u64
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_seconds: u64,
    pub twitch_api_base_url: String,
    pub job_timeout_seconds: u64,
    pub rate_limited_sleep_ms: u64,
    pub page_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub stale_job_timeout_seconds: u64,
    pub stale_sweep_interval_seconds: u64
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub port: u16,
    pub base_url: String
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            ip: "db".to_string(),
            port: 5432,
            user: "twitch".to_string(),
            password: "twitchpass".to_string(),
            name: "twitch_chatters".to_string(),
            max_connections: 5
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            log: false,
            login_cookie_valid_duration_seconds: 24 * 60 * 60,
            web_session_valid_duration_seconds: 24 * 60 * 60,
            session_key_path: "./session-key".to_string(),
            request_quota_replenish_ms: 100,
            request_quota: 50
        }
    }
}

impl Default for TwitchConfig {
    fn default() -> Self {
        TwitchConfig {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: String::new(),
            helix_base_url: "https://api.twitch.tv/helix".to_string(),
            auth_base_url: "https://id.twitch.tv/oauth2".to_string()
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            port: 8081,
            rate_limit_requests_per_minute: 600,
            rate_limit_burst: 20,
            max_wait_ms: 30_000,
            users_cache_ttl_seconds: 5 * 60,
            moderated_channels_cache_ttl_seconds: 2 * 60,
            cache_sweep_interval_seconds: 5 * 60
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            poll_interval_seconds: 2,
            twitch_api_base_url: "http://twitch-api:8081".to_string(),
            job_timeout_seconds: 30,
            rate_limited_sleep_ms: 5_000,
            page_delay_ms: 200,
            batch_delay_ms: 100,
            stale_job_timeout_seconds: 15 * 60,
            stale_sweep_interval_seconds: 60
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            port: 8083,
            base_url: "http://analysis:8083".to_string()
        }
    }
}

macro_rules! override_from {
    ($lookup: ident, $key: expr, $target: expr) => {
        if let Some(v) = $lookup($key).filter(|v| !v.is_empty()) {
            $target = v;
        }
    };
    ($lookup: ident, $key: expr, $target: expr, parse) => {
        if let Some(v) = $lookup($key).and_then(|v| v.parse().ok()) {
            $target = v;
        }
    };
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Environment always wins over the file. Unparsable numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) where F: Fn(&str) -> Option<String> {
        override_from!(lookup, "DB_HOST", self.database.ip);
        override_from!(lookup, "DB_PORT", self.database.port, parse);
        override_from!(lookup, "DB_USER", self.database.user);
        override_from!(lookup, "DB_PASSWORD", self.database.password);
        override_from!(lookup, "DB_NAME", self.database.name);

        override_from!(lookup, "GATEWAY_PORT", self.server.port, parse);
        override_from!(lookup, "TWITCH_API_PORT", self.proxy.port, parse);
        override_from!(lookup, "ANALYSIS_PORT", self.analysis.port, parse);

        override_from!(lookup, "TWITCH_CLIENT_ID", self.twitch.client_id);
        override_from!(lookup, "TWITCH_CLIENT_SECRET", self.twitch.client_secret);
        override_from!(lookup, "TWITCH_REDIRECT_URL", self.twitch.redirect_url);

        override_from!(lookup, "TWITCH_API_BASE_URL", self.worker.twitch_api_base_url);
        override_from!(lookup, "ANALYSIS_BASE_URL", self.analysis.base_url);
        override_from!(lookup, "JOB_POLL_INTERVAL", self.worker.poll_interval_seconds, parse);
        override_from!(lookup, "RATE_LIMIT_REQUESTS_PER_MINUTE", self.proxy.rate_limit_requests_per_minute, parse);
    }

    pub fn database_url(&self) -> String {
        format!("postgres://{}:{}@{}:{}/{}", // user:password / ip/db
            self.database.user,
            self.database.password,
            self.database.ip,
            self.database.port,
            self.database.name
        )
    }
}

pub async fn get_pool() -> Result<PgPool, sqlx::Error> {
    let config = get_config();
    PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(config.database_url().as_str())
        .await
}

#[cached]
pub fn get_config() -> Config {
    dotenv::dotenv().ok();
    let path = env::var("CONFIG_PATH").unwrap_or("config.toml".to_string());

    let mut data = match fs::read_to_string(&path) {
        Ok(contents) => match Config::from_toml_str(&contents) {
            Ok(d) => d,
            Err(err) => {
                eprintln!("Unable to load data from {}: {}", path, err);
                exit(1);
            }
        },
        Err(_) => {
            eprintln!("Could not find {}, using defaults and environment", path);
            Config::default()
        }
    };
    data.apply_overrides(|key| env::var(key).ok());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml_str(r#"
            [database]
            ip = "localhost"

            [worker]
            poll_interval_seconds = 5
        "#).unwrap();

        assert_eq!(config.database.ip, "localhost");
        assert_eq!(config.database.port, 5432, "unset keys fall back to defaults");
        assert_eq!(config.worker.poll_interval_seconds, 5);
        assert_eq!(config.worker.rate_limited_sleep_ms, 5_000);
        assert_eq!(config.proxy.rate_limit_requests_per_minute, 600);
        assert_eq!(config.analysis.port, 8083);
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::from_toml_str("[server]\nport = 9000\n").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DB_HOST", "pg.internal"),
            ("DB_PORT", "6543"),
            ("GATEWAY_PORT", "9100"),
            ("JOB_POLL_INTERVAL", "not-a-number"),
            ("TWITCH_CLIENT_ID", ""),
            ("TWITCH_API_BASE_URL", "http://localhost:8081")
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.ip, "pg.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.worker.poll_interval_seconds, 2, "garbage numbers are ignored");
        assert_eq!(config.twitch.client_id, "", "empty values are ignored");
        assert_eq!(config.worker.twitch_api_base_url, "http://localhost:8081");
    }

    #[test]
    fn database_url_layout() {
        let config = Config::default();
        assert_eq!(config.database_url(), "postgres://twitch:twitchpass@db:5432/twitch_chatters");
    }
}
