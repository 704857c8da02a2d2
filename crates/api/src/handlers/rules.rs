//! Automation rule handlers — the admin configuration surface.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use automation::{RuleDraft, RuleUpdate};

use super::{actor_from_headers, rule_error, ApiError, AppState};

pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let rules = state.rules.list().await.map_err(rule_error)?;
    Ok(Json(json!({ "ok": true, "rules": rules })))
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    actor_from_headers(&headers)?;

    // System rules are seeded, never created over the API.
    draft.is_system = false;
    let rule = state.rules.create(draft).await.map_err(rule_error)?;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "rule": rule }))))
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<RuleUpdate>,
) -> Result<Json<Value>, ApiError> {
    actor_from_headers(&headers)?;
    let rule = state.rules.update(id, update).await.map_err(rule_error)?;
    Ok(Json(json!({ "ok": true, "rule": rule })))
}

/// Delete is rejected with 403 for system rules; disable them instead.
pub async fn remove(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    actor_from_headers(&headers)?;
    state.rules.delete(id).await.map_err(rule_error)?;
    Ok(StatusCode::NO_CONTENT)
}
