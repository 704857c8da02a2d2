//! Automation rule persistence.
//!
//! The `is_system` delete protection is enforced one level up, in the
//! store adapter; these functions are pure SQL.

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use automation::{AutomationRule, RuleDraft, RuleUpdate};

use crate::{models::AutomationRuleRow, DbError};

const COLUMNS: &str = "id, name, description, enabled, trigger_type, trigger_step_keys, \
                       trigger_lanes, conditions, action, action_config, priority, is_system, \
                       created_seq, created_at, updated_at";

fn opt_json<T: Serialize>(value: &Option<T>) -> Result<Option<serde_json::Value>, DbError> {
    value
        .as_ref()
        .map(|v| serde_json::to_value(v).map_err(|e| DbError::Decode(e.to_string())))
        .transpose()
}

/// All rules, ordered the way the admin surface lists them.
pub async fn list_rules(pool: &PgPool) -> Result<Vec<AutomationRule>, DbError> {
    let rows: Vec<AutomationRuleRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM automation_rules ORDER BY priority, created_seq"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AutomationRuleRow::into_domain).collect()
}

/// The enabled subset, snapshotted by the rule engine per event.
pub async fn list_enabled_rules(pool: &PgPool) -> Result<Vec<AutomationRule>, DbError> {
    let rows: Vec<AutomationRuleRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM automation_rules WHERE enabled ORDER BY priority, created_seq"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AutomationRuleRow::into_domain).collect()
}

/// Fetch a single rule by its primary key.
pub async fn get_rule(pool: &PgPool, id: Uuid) -> Result<AutomationRule, DbError> {
    let row: Option<AutomationRuleRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM automation_rules WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.ok_or(DbError::NotFound)?.into_domain()
}

/// Insert a new rule; `created_seq` comes from the table's sequence.
pub async fn insert_rule(pool: &PgPool, draft: &RuleDraft) -> Result<AutomationRule, DbError> {
    let now = Utc::now();

    let row: AutomationRuleRow = sqlx::query_as(&format!(
        "INSERT INTO automation_rules \
             (id, name, description, enabled, trigger_type, trigger_step_keys, trigger_lanes, \
              conditions, action, action_config, priority, is_system, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13) \
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&draft.name)
    .bind(&draft.description)
    .bind(draft.enabled)
    .bind(draft.trigger.to_string())
    .bind(opt_json(&draft.trigger_step_keys)?)
    .bind(opt_json(&draft.trigger_lanes)?)
    .bind(opt_json(&draft.conditions)?)
    .bind(draft.action.to_string())
    .bind(&draft.action_config)
    .bind(draft.priority)
    .bind(draft.is_system)
    .bind(now)
    .fetch_one(pool)
    .await?;

    row.into_domain()
}

/// Apply the admin-editable fields of a rule.
pub async fn update_rule(
    pool: &PgPool,
    id: Uuid,
    update: &RuleUpdate,
) -> Result<AutomationRule, DbError> {
    let row: Option<AutomationRuleRow> = sqlx::query_as(&format!(
        "UPDATE automation_rules SET \
             enabled       = COALESCE($2, enabled), \
             name          = COALESCE($3, name), \
             description   = COALESCE($4, description), \
             priority      = COALESCE($5, priority), \
             action_config = COALESCE($6, action_config), \
             conditions    = COALESCE($7, conditions), \
             updated_at    = $8 \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(update.enabled)
    .bind(&update.name)
    .bind(&update.description)
    .bind(update.priority)
    .bind(&update.action_config)
    .bind(opt_json(&update.conditions)?)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)?.into_domain()
}

/// Permanently delete a rule by its primary key.
pub async fn delete_rule(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM automation_rules WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
