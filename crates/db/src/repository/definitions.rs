//! Process definition persistence.
//!
//! Definitions are written once at publish time and only ever read back;
//! versioning and validation belong to the registry in the `engine` crate.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use engine::ProcessDefinition;

use crate::{models::ProcessDefinitionRow, DbError};

const COLUMNS: &str = "id, key, version, is_active, json, created_at";

/// Persist a freshly published definition (its version already assigned).
pub async fn insert_definition(
    pool: &PgPool,
    definition: &ProcessDefinition,
) -> Result<(), DbError> {
    let json = serde_json::to_value(definition).map_err(|e| DbError::Decode(e.to_string()))?;

    sqlx::query(
        "INSERT INTO process_definitions (id, key, version, is_active, json, created_at) \
         VALUES ($1, $2, $3, TRUE, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(&definition.key)
    .bind(definition.version)
    .bind(json)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Every active definition version, for hydrating the registry at startup.
pub async fn list_definitions(pool: &PgPool) -> Result<Vec<ProcessDefinition>, DbError> {
    let rows: Vec<ProcessDefinitionRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM process_definitions WHERE is_active ORDER BY key, version"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ProcessDefinitionRow::into_domain).collect()
}

/// Latest active version for one key.
pub async fn get_active_definition(
    pool: &PgPool,
    key: &str,
) -> Result<ProcessDefinition, DbError> {
    let row: Option<ProcessDefinitionRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM process_definitions \
         WHERE key = $1 AND is_active ORDER BY version DESC LIMIT 1"
    ))
    .bind(key)
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)?.into_domain()
}
