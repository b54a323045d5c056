use actix_governor::{Governor, GovernorConfigBuilder};
use actix_identity::IdentityMiddleware;
use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::{
    HttpResponse, web::{self, Data},
    cookie::{time::Duration, SameSite},
    middleware, App, HttpServer, Result
};
use log::{info, debug};
use std::io;
use std::time;

use crate::shared::util::{config, secret};

use crate::shared::handlers::postgres_handler::PostgresHandler as SharedPostgresHandler;
use crate::gateway::handlers::postgres_handler::PostgresHandler as GatewayPostgresHandler;
use crate::gateway::handlers::twitch_handler::TwitchHandler;
use crate::gateway::handlers::analysis_handler::AnalysisHandler;
use crate::analysis::handlers::postgres_handler::PostgresHandler as AnalysisPostgresHandler;
use crate::proxy::types::ProxyState;

use crate::gateway::app as gateway_app;
use crate::proxy::app as proxy_app;
use crate::analysis::app as analysis_app;

use crate::shared::types::app as app_types;


async fn not_found() -> Result<HttpResponse> {
    let response = app_types::ErrorResponse{ error: "Resource not found".to_string() };
    Ok(HttpResponse::NotFound().json(response))
}

fn io_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

/// `server.log = true` turns the default filter up to debug; RUST_LOG still wins
pub fn init_logger() {
    let default_filter = if config::get_config().server.log { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

/// Connects and makes sure the schema exists
pub async fn init_database() -> Result<SharedPostgresHandler, sqlx::Error> {
    let handler = SharedPostgresHandler::new().await?;
    handler.init().await?;
    Ok(handler)
}

pub async fn start_gateway() -> io::Result<()> {
    let config = config::get_config();
    let secret_key = secret::get_session_key(&config.server.session_key_path)?;

    let shared_handler = init_database().await.map_err(io_error)?;
    let gateway_handler = GatewayPostgresHandler::from_pool(shared_handler.pool().clone());
    let twitch_handler = TwitchHandler::new(&config.twitch, &config.worker.twitch_api_base_url).map_err(io_error)?;
    let analysis_handler = AnalysisHandler::new(&config.analysis.base_url).map_err(io_error)?;

    let governor_conf = GovernorConfigBuilder::default()
        .per_millisecond(config.server.request_quota_replenish_ms)
        .burst_size(config.server.request_quota)
        .finish()
        .ok_or_else(|| io_error("invalid request quota"))?;

    let cookie_ttl = Duration::seconds(config.server.login_cookie_valid_duration_seconds as i64);

    info!("starting gateway at http://0.0.0.0:{}", config.server.port);

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(shared_handler.clone()))
            .app_data(Data::new(gateway_handler.clone()))
            .app_data(Data::new(twitch_handler.clone()))
            .app_data(Data::new(analysis_handler.clone()))
            .configure(gateway_app::routes)
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_name("login".to_owned())
                    .cookie_same_site(SameSite::Lax)
                    .cookie_secure(false)
                    .cookie_http_only(true)
                    .session_lifecycle(PersistentSession::default().session_ttl(cookie_ttl))
                    .build(),
            )
            .wrap(Governor::new(&governor_conf))
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .default_service(web::route().to(not_found))
    })
        .keep_alive(time::Duration::from_secs(30))
        .bind(("0.0.0.0", config.server.port))?
        .run().await
}

pub async fn start_proxy() -> io::Result<()> {
    let config = config::get_config();
    if config.twitch.client_id.is_empty() || config.twitch.client_secret.is_empty() {
        return Err(io_error("TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET must be set"));
    }
    let state = Data::new(ProxyState::from_config(&config).map_err(io_error)?);

    // Expired entries are also skipped on read; this only bounds memory
    let sweep_state = state.clone();
    let sweep_every = time::Duration::from_secs(config.proxy.cache_sweep_interval_seconds.max(1));
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            let remaining = sweep_state.cache.sweep();
            debug!("cache sweep done, {} entries left", remaining);
        }
    });

    info!("starting twitch-api at http://0.0.0.0:{} (rate limit: {} req/min)",
        config.proxy.port, config.proxy.rate_limit_requests_per_minute);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(proxy_app::routes)
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .default_service(web::route().to(not_found))
    })
        .keep_alive(time::Duration::from_secs(30))
        .bind(("0.0.0.0", config.proxy.port))?
        .run().await
}

pub async fn start_analysis() -> io::Result<()> {
    let config = config::get_config();
    let shared_handler = init_database().await.map_err(io_error)?;
    let handler = AnalysisPostgresHandler::from_pool(shared_handler.pool().clone());

    info!("starting analysis at http://0.0.0.0:{}", config.analysis.port);

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(handler.clone()))
            .configure(analysis_app::routes)
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .default_service(web::route().to(not_found))
    })
        .keep_alive(time::Duration::from_secs(30))
        .bind(("0.0.0.0", config.analysis.port))?
        .run().await
}
