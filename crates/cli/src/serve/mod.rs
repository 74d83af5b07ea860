//! `bondflow serve` -- HTTP JSON API over the deal workflow engine.
//!
//! Security features:
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key authentication (`api_key` / `BONDFLOW_API_KEY`)
//!
//! Endpoints:
//! - GET  /health                     - Server status (exempt from auth)
//! - GET  /deals?stage=               - Deals, newest first
//! - POST /deals                      - Create a deal
//! - GET  /deals/{key}                - One deal with its typed move history
//! - PATCH /deals/{key}               - Update allow-listed deal columns
//! - GET  /deals/{key}/banks?stage=   - Reconciled bank notes for a stage
//! - PUT  /deals/{key}/bank-notes     - Replace stage-tagged bank notes
//! - POST /moves                      - Move a deal to another stage
//! - GET  /moves?dealId=              - One deal's recorded moves
//! - GET  /activity?q=&limit=         - Deduplicated activity feed
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{middleware as axum_middleware, Json, Router};
use bondflow_workflow::WorkflowError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use self::handlers::{
    handle_activity, handle_banks, handle_create_deal, handle_get_deal, handle_health,
    handle_list_deals, handle_list_moves, handle_move, handle_not_found,
    handle_replace_bank_notes, handle_update_deal,
};
use self::middleware::{auth_middleware, rate_limit_middleware, trace_middleware};
use self::state::AppState;
use crate::config::ServeConfig;
use crate::store::Session;

/// Maximum request body size: 2 MB.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Header naming the acting user.
const ACTOR_HEADER: &str = "x-cb-user";

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

fn error_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::InvalidField { .. }
        | WorkflowError::InvalidDeal(_)
        | WorkflowError::MissingActor => StatusCode::BAD_REQUEST,
        WorkflowError::IncompletePayload { .. } => StatusCode::PRECONDITION_REQUIRED,
        WorkflowError::Conflict { .. } => StatusCode::CONFLICT,
        WorkflowError::PersistFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an engine error onto a JSON error response.
fn error_response(err: WorkflowError) -> Response {
    let body = serde_json::json!({
        "error": err.to_string(),
        "kind": err.kind(),
        "recoverable": err.is_recoverable(),
    });
    (error_status(&err), Json(body)).into_response()
}

/// Build the application router over `state`.
fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/deals", get(handle_list_deals).post(handle_create_deal))
        .route("/deals/{key}", get(handle_get_deal).patch(handle_update_deal))
        .route("/deals/{key}/banks", get(handle_banks))
        .route("/deals/{key}/bank-notes", put(handle_replace_bank_notes))
        .route("/moves", get(handle_list_moves).post(handle_move))
        .route("/activity", get(handle_activity))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn(trace_middleware))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Load the store named by `config` and serve until Ctrl+C.
pub async fn start_server(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(config.store_path.as_deref(), config.engine.clone())?;
    match &config.store_path {
        Some(path) => info!(path = %path.display(), "writes are saved to the store file"),
        None => warn!("no store file configured; deals live only as long as the server"),
    }

    let api_key = config.effective_api_key().map(str::to_string);
    if api_key.is_some() {
        info!("API key authentication enabled");
    }
    info!(
        rate_limit = config.rate_limit_per_minute,
        "rate limit per minute per IP"
    );

    let state = Arc::new(AppState::new(
        session,
        config.rate_limit_per_minute,
        api_key,
    ));
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "bondflow listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal");
}
