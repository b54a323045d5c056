use crate::proxy::cache::{self, CacheKind};
use crate::proxy::handlers::helix_handler::HelixResponse;
use crate::proxy::types::{ChattersParams, ModeratedChannelsParams, ProxyState};
use crate::shared::types::app::{ErrorResponse, bad_request};

use actix_web::{get, HttpRequest, HttpResponse, Result, http::header, http::StatusCode, web::{self, Data}};
use log::{debug, error};

const CACHE_HEADER: &str = "X-Cache";

/// Bearer header first, `access_token` query parameter as fallback
fn access_token(req: &HttpRequest, from_query: Option<&str>) -> Option<String> {
    let from_header = req.headers().get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());
    from_header.or(from_query.map(|v| v.to_string())).filter(|v| !v.is_empty())
}

fn pass_through(upstream: HelixResponse, cache_status: Option<&str>) -> HttpResponse {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = HttpResponse::build(status);
    response.content_type("application/json");
    if let Some(cache_status) = cache_status {
        response.insert_header((CACHE_HEADER, cache_status));
    }
    response.body(upstream.body)
}

fn cache_hit(body: web::Bytes) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .insert_header((CACHE_HEADER, "HIT"))
        .body(body)
}

macro_rules! wait_for_token {
    ($state: expr) => {
        if !$state.limiter.acquire().await {
            return Ok(HttpResponse::TooManyRequests().json(ErrorResponse::new("rate limit exceeded")));
        }
    };
}

macro_rules! upstream_failed {
    ($endpoint: expr, $err: expr) => {{
        error!("helix {} request failed: {}", $endpoint, $err);
        return Ok(HttpResponse::BadGateway().json(ErrorResponse::new("twitch api error")));
    }};
}

// Chatters (never cached)
#[get("/chatters")]
async fn chatters(state: Data<ProxyState>, req: HttpRequest, params: web::Query<ChattersParams>) -> Result<HttpResponse> {
    let Some(token) = access_token(&req, params.access_token.as_deref()) else {
        bad_request!("missing access token")
    };
    if params.broadcaster_id.is_empty() || params.moderator_id.is_empty() {
        bad_request!("missing required parameters");
    }

    wait_for_token!(state);
    let first = params.first.as_deref().filter(|f| !f.is_empty()).unwrap_or("1000");
    match state.helix.chatters(&token, &params.broadcaster_id, &params.moderator_id, first,
            params.after.as_deref().filter(|a| !a.is_empty())).await {
        Ok(upstream) => Ok(pass_through(upstream, None)),
        Err(err) => upstream_failed!("/chat/chatters", err)
    }
}

// Users
#[get("/users")]
async fn users(state: Data<ProxyState>, req: HttpRequest, params: web::Query<Vec<(String, String)>>) -> Result<HttpResponse> {
    let query_token = params.iter().find(|(k, _)| k == "access_token").map(|(_, v)| v.as_str());
    let Some(token) = access_token(&req, query_token) else {
        bad_request!("missing access token")
    };
    let ids: Vec<String> = params.iter()
        .filter(|(k, v)| k == "id" && !v.is_empty())
        .map(|(_, v)| v.clone())
        .collect();
    if ids.is_empty() {
        bad_request!("missing id parameter");
    }

    let key = cache::users_key(&ids);
    if let Some(body) = state.cache.get(CacheKind::Users, &key) {
        debug!("cache hit {}", key);
        return Ok(cache_hit(body));
    }

    wait_for_token!(state);
    match state.helix.users(&token, &ids).await {
        Ok(upstream) => {
            if upstream.status == 200 {
                state.cache.put(CacheKind::Users, key, upstream.body.clone());
            }
            Ok(pass_through(upstream, Some("MISS")))
        },
        Err(err) => upstream_failed!("/users", err)
    }
}

// Moderated channels
#[get("/moderated-channels")]
async fn moderated_channels(state: Data<ProxyState>, req: HttpRequest, params: web::Query<ModeratedChannelsParams>)
        -> Result<HttpResponse> {
    let Some(token) = access_token(&req, params.access_token.as_deref()) else {
        bad_request!("missing access token")
    };
    if params.user_id.is_empty() {
        bad_request!("missing required parameters");
    }

    let key = cache::moderated_channels_key(&params.user_id);
    if let Some(body) = state.cache.get(CacheKind::ModeratedChannels, &key) {
        debug!("cache hit {}", key);
        return Ok(cache_hit(body));
    }

    wait_for_token!(state);
    match state.helix.moderated_channels(&token, &params.user_id).await {
        Ok(upstream) => {
            if upstream.status == 200 {
                state.cache.put(CacheKind::ModeratedChannels, key, upstream.body.clone());
            }
            Ok(pass_through(upstream, Some("MISS")))
        },
        Err(err) => upstream_failed!("/moderation/channels", err)
    }
}

#[get("/healthz")]
async fn healthz() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().body("ok"))
}

pub fn routes(app: &mut web::ServiceConfig) {
    app
        .service(chatters)
        .service(users)
        .service(moderated_channels)
        .service(healthz);
}
