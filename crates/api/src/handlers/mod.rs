//! Shared handler state and error mapping.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use automation::{RuleError, RuleStore};
use db::DbPool;
use engine::{Actor, EngineError, ProcessMachine};

pub mod definitions;
pub mod instances;
pub mod rules;

#[derive(Clone)]
pub struct AppState {
    pub machine: Arc<ProcessMachine>,
    pub rules: Arc<dyn RuleStore>,
    pub pool: DbPool,
}

/// Error responses carry `{ok: false, error}` beside the status code.
pub(crate) type ApiError = (StatusCode, Json<Value>);

pub(crate) fn fail(status: StatusCode, message: impl ToString) -> ApiError {
    (status, Json(json!({ "ok": false, "error": message.to_string() })))
}

/// The identity provider lives in front of this service; it hands the
/// resolved actor over in headers. Mutating endpoints require them.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ApiError> {
    let id = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    let role = headers
        .get("x-actor-role")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    match (id, role) {
        (Some(id), Some(role)) => Ok(Actor::new(id, role)),
        _ => Err(fail(StatusCode::UNAUTHORIZED, "missing actor identity headers")),
    }
}

pub(crate) fn engine_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        // Stale client state: the UI should refresh and retry.
        EngineError::StepMismatch { .. } => StatusCode::CONFLICT,
        EngineError::InvalidState(_) => StatusCode::CONFLICT,
        EngineError::InvalidDecision { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, err)
}

pub(crate) fn rule_error(err: RuleError) -> ApiError {
    let status = match &err {
        RuleError::NotFound => StatusCode::NOT_FOUND,
        RuleError::Forbidden => StatusCode::FORBIDDEN,
        RuleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, err)
}
