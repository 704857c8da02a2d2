//! Process instance handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use events::EventType;

use super::{actor_from_headers, engine_error, fail, ApiError, AppState};

#[derive(serde::Deserialize)]
pub struct StartDto {
    pub definition_key: String,
    #[serde(default)]
    pub context: Value,
}

#[derive(serde::Deserialize)]
pub struct CompleteStepDto {
    pub step_key: String,
    #[serde(default)]
    pub output_data: Value,
    pub gateway_decision: Option<String>,
}

#[derive(serde::Deserialize, Default)]
pub struct ReasonDto {
    pub reason: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct RaiseEventDto {
    pub event_type: String,
    pub step_key: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<StartDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let instance = state
        .machine
        .start(&dto.definition_key, dto.context, Some(&actor))
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "instance": instance }))))
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let instance = state.machine.instance(id).await.map_err(engine_error)?;
    Ok(Json(json!({ "ok": true, "instance": instance })))
}

pub async fn timeline(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let timeline = state.machine.timeline(id).await.map_err(engine_error)?;
    Ok(Json(json!({ "ok": true, "timeline": timeline })))
}

pub async fn candidates(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let candidates = state.machine.list_candidates(id).await.map_err(engine_error)?;
    Ok(Json(json!({ "ok": true, "candidates": candidates })))
}

pub async fn complete(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<CompleteStepDto>,
) -> Result<Json<Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let instance = state
        .machine
        .complete_step(
            id,
            &dto.step_key,
            &actor,
            dto.output_data,
            dto.gateway_decision.as_deref(),
        )
        .await
        .map_err(engine_error)?;

    Ok(Json(json!({ "ok": true, "instance": instance })))
}

pub async fn skip(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<ReasonDto>,
) -> Result<Json<Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let instance = state
        .machine
        .skip_step(id, &actor, dto.reason)
        .await
        .map_err(engine_error)?;

    Ok(Json(json!({ "ok": true, "instance": instance })))
}

pub async fn cancel(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<ReasonDto>,
) -> Result<Json<Value>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state
        .machine
        .cancel(id, Some(&actor), dto.reason)
        .await
        .map_err(engine_error)?;

    Ok(Json(json!({ "ok": true })))
}

/// Entry point for external collaborators injecting synthetic events
/// (e.g. the SLA scanner's `step.sla_warning` / `step.sla_breached`).
pub async fn raise_event(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<RaiseEventDto>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    actor_from_headers(&headers)?;
    let event_type: EventType = dto
        .event_type
        .parse()
        .map_err(|e: String| fail(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    state
        .machine
        .raise_event(event_type, id, dto.step_key, dto.payload)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}
