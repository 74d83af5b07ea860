//! Route handlers for deals, moves, bank notes and the activity feed.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bondflow_workflow::{
    history, normalize, normalize_opt, BankNoteInput, MoveRequest, NewDeal, StagePayload,
    WorkflowError,
};
use serde::Deserialize;

use super::state::AppState;
use super::{error_response, json_error, ACTOR_HEADER};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

fn header_actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Save a successful write. The caller holds [`AppState::begin_write`].
async fn saved<T>(state: &AppState, result: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
    let value = result?;
    state.persist().await?;
    Ok(value)
}

/// Version token from `If-Match`, quoted or bare.
fn if_match_version(headers: &HeaderMap) -> Result<Option<i64>, Response> {
    let Some(raw) = headers.get("if-match") else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .map(|v| v.trim().trim_matches('"'))
        .and_then(|v| v.parse().ok())
        .map(Some)
        .ok_or_else(|| {
            json_error(StatusCode::BAD_REQUEST, "If-Match must be a deal version").into_response()
        })
}

// ── Deals ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct DealsQuery {
    stage: Option<String>,
}

/// GET /deals?stage=
pub(crate) async fn handle_list_deals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DealsQuery>,
) -> Response {
    match state.executor().list_deals(query.stage.as_deref()).await {
        Ok(deals) => (StatusCode::OK, Json(serde_json::json!({ "deals": deals }))).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /deals
pub(crate) async fn handle_create_deal(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewDeal>,
) -> Response {
    let _write = state.begin_write().await;
    match saved(&state, state.executor().create_deal(new).await).await {
        Ok(deal) => (StatusCode::CREATED, Json(deal)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /deals/{key}
pub(crate) async fn handle_get_deal(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.executor().get_deal(&key).await {
        Ok(deal) => {
            let entries = history(&deal);
            let stage = normalize(&deal.stage);
            let body = serde_json::json!({
                "deal": deal,
                "stage": stage,
                "history": entries,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// PATCH /deals/{key}
///
/// Body is an object of allow-listed columns. The acting user comes from
/// `x-cb-user`; a version token may be sent as `If-Match`.
pub(crate) async fn handle_update_deal(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let serde_json::Value::Object(fields) = body else {
        return json_error(StatusCode::BAD_REQUEST, "body must be a JSON object").into_response();
    };
    if fields.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "no fields to update").into_response();
    }
    let expected_version = match if_match_version(&headers) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let actor = header_actor(&headers);

    let _write = state.begin_write().await;
    let result = state
        .executor()
        .update_fields(&key, &fields, actor.as_deref(), expected_version)
        .await;
    match saved(&state, result).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Moves ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct MoveBody {
    deal_id: String,
    to_stage: String,
    stage_data: Option<serde_json::Value>,
    stage_confirmed: bool,
    moved_by: Option<String>,
    note: Option<String>,
    expected_version: Option<i64>,
}

/// Read `stageData` as a payload for `to_stage`. An object without a
/// `stage` tag is tagged with the target stage.
fn parse_stage_data(data: serde_json::Value, to_stage: &str) -> Result<Option<StagePayload>, String> {
    let data = match data {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Object(mut map) => {
            if !map.contains_key("stage") {
                map.insert(
                    "stage".to_string(),
                    serde_json::Value::String(normalize(to_stage).as_str().to_string()),
                );
            }
            serde_json::Value::Object(map)
        }
        _ => return Err("stageData must be an object".to_string()),
    };
    serde_json::from_value(data)
        .map(Some)
        .map_err(|e| format!("invalid stageData: {}", e))
}

/// POST /moves
pub(crate) async fn handle_move(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<MoveBody>,
) -> Response {
    if body.deal_id.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "dealId is required").into_response();
    }
    if body.to_stage.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "toStage is required").into_response();
    }

    // Unconfirmed stage data is not evidence of anything.
    let payload = match body.stage_data.filter(|_| body.stage_confirmed) {
        Some(data) => match parse_stage_data(data, &body.to_stage) {
            Ok(payload) => payload.map(StagePayload::confirm),
            Err(msg) => return json_error(StatusCode::BAD_REQUEST, &msg).into_response(),
        },
        None => None,
    };

    let request = MoveRequest {
        deal_key: body.deal_id,
        to_stage: body.to_stage,
        payload,
        actor: header_actor(&headers).or(body.moved_by),
        note: body.note,
        expected_version: body.expected_version,
    };
    let _write = state.begin_write().await;
    match saved(&state, state.executor().move_deal(request).await).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MovesQuery {
    deal_id: Option<String>,
}

/// GET /moves?dealId=
pub(crate) async fn handle_list_moves(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MovesQuery>,
) -> Response {
    match state.executor().list_moves(query.deal_id.as_deref()).await {
        Ok(moves) => (StatusCode::OK, Json(serde_json::json!({ "moves": moves }))).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Activity ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct ActivityQuery {
    q: Option<String>,
    limit: Option<usize>,
    /// `history` builds the feed from deal move histories.
    source: Option<String>,
}

/// GET /activity?q=&limit=
pub(crate) async fn handle_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActivityQuery>,
) -> Response {
    let executor = state.executor();
    let feed = match query.source.as_deref() {
        Some("history") => executor.history_feed(query.q.as_deref(), query.limit).await,
        None | Some("") | Some("activity") => {
            executor.activity_feed(query.q.as_deref(), query.limit).await
        }
        Some(other) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("unknown activity source '{}'", other),
            )
            .into_response()
        }
    };
    match feed {
        Ok(feed) => (StatusCode::OK, Json(serde_json::json!({ "activity": feed }))).into_response(),
        Err(e) => error_response(e),
    }
}

// ── Banks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct BanksQuery {
    stage: Option<String>,
}

/// GET /deals/{key}/banks?stage=
pub(crate) async fn handle_banks(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<BanksQuery>,
) -> Response {
    let stage = normalize_opt(query.stage.as_deref());
    match state.executor().reconcile_banks(&key, stage).await {
        Ok(banks) => {
            let body = serde_json::json!({ "stage": stage, "banks": banks });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BankNotesBody {
    stage: Option<String>,
    rows: Vec<BankNoteInput>,
}

/// PUT /deals/{key}/bank-notes
pub(crate) async fn handle_replace_bank_notes(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<BankNotesBody>,
) -> Response {
    let _write = state.begin_write().await;
    let result = state
        .executor()
        .replace_bank_notes(&key, body.stage.as_deref(), body.rows)
        .await;
    match saved(&state, result).await {
        Ok(inserted) => (
            StatusCode::OK,
            Json(serde_json::json!({ "ok": true, "inserted": inserted })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondflow_workflow::Stage;

    #[test]
    fn untagged_stage_data_takes_the_target_stage() {
        let payload = parse_stage_data(serde_json::json!({"conditions": "valuation"}), "Granted")
            .unwrap()
            .unwrap();
        assert_eq!(payload.stage(), Stage::Granted);
    }

    #[test]
    fn null_stage_data_is_no_payload() {
        assert_eq!(parse_stage_data(serde_json::Value::Null, "aip").unwrap(), None);
        assert!(parse_stage_data(serde_json::json!("text"), "aip").is_err());
    }

    #[test]
    fn if_match_accepts_quoted_versions() {
        let mut headers = HeaderMap::new();
        assert_eq!(if_match_version(&headers).unwrap(), None);
        headers.insert("if-match", "\"3\"".parse().unwrap());
        assert_eq!(if_match_version(&headers).unwrap(), Some(3));
        headers.insert("if-match", "abc".parse().unwrap());
        assert!(if_match_version(&headers).is_err());
    }
}
