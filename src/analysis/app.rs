use crate::analysis::handlers::postgres_handler::PostgresHandler;
use crate::analysis::types::{parse_broadcaster_filter, SummaryParams};
use crate::shared::types::app::{ErrorResponse, not_found, server_error};

use actix_web::{get, HttpResponse, Result, web::{self, Data}};
use log::error;

#[get("/sessions/{session_uuid}/summary")]
async fn session_summary(handler: Data<PostgresHandler>, path: web::Path<String>, params: web::Query<SummaryParams>)
        -> Result<HttpResponse> {
    let session_uuid = path.into_inner();
    let filter = parse_broadcaster_filter(params.broadcaster_id.as_deref());

    match handler.session_summary(&session_uuid, filter.as_deref(), params.logins.unwrap_or(true)).await {
        Ok(Some(summary)) => Ok(HttpResponse::Ok().json(summary)),
        Ok(None) => not_found!("Session not found"),
        Err(err) => {
            error!("failed to build summary for {}: {}", session_uuid, err);
            server_error!("Failed to build summary");
        }
    }
}

#[get("/healthz")]
async fn healthz(handler: Data<PostgresHandler>) -> Result<HttpResponse> {
    if let Err(err) = handler.ping().await {
        error!("health check failed: {}", err);
        server_error!("db error");
    }
    Ok(HttpResponse::Ok().body("ok"))
}

pub fn routes(app: &mut web::ServiceConfig) {
    app
        .service(session_summary)
        .service(healthz);
}
