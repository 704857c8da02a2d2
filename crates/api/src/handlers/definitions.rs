//! Process definition handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use db::repository::definitions as def_repo;
use engine::ProcessDefinition;

use super::{actor_from_headers, engine_error, fail, ApiError, AppState};

/// Validate and publish a definition; a broken graph is rejected wholesale
/// and nothing is stored.
pub async fn publish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(definition): Json<ProcessDefinition>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    actor_from_headers(&headers)?;

    let registry = state.machine.registry();
    let key = definition.key.clone();
    let version = registry.publish(definition).map_err(engine_error)?;

    // Persist the frozen copy (with its assigned version) for restarts.
    let published = registry.version(&key, version).map_err(engine_error)?;
    def_repo::insert_definition(&state.pool, &published)
        .await
        .map_err(|e| fail(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "ok": true, "key": key, "version": version })),
    ))
}

pub async fn get_active(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let definition = state.machine.registry().active(&key).map_err(engine_error)?;
    Ok(Json(json!({ "ok": true, "definition": &*definition })))
}
