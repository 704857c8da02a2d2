//! Process instance and step instance persistence.
//!
//! `commit_transition` carries the engine's optimistic-concurrency check:
//! the instance `UPDATE` is guarded on `current_step_key` and
//! `status = 'running'`, and zero affected rows surfaces as
//! [`DbError::Conflict`] — the losing writer of a race gets nothing
//! applied.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use engine::store::{Advance, CloseStep};
use engine::{InstanceStatus, ProcessInstance, StepInstance};

use crate::{
    models::{ProcessInstanceRow, StepInstanceRow},
    DbError,
};

const INSTANCE_COLUMNS: &str = "id, definition_key, definition_version, status, \
                                current_step_key, context, started_at, ended_at, canceled_reason";

const STEP_COLUMNS: &str =
    "id, process_instance_id, step_key, status, started_at, completed_at, output_data";

// ---------------------------------------------------------------------------
// process_instances
// ---------------------------------------------------------------------------

/// Persist a freshly started instance together with its first step row.
pub async fn insert_instance(
    pool: &PgPool,
    instance: &ProcessInstance,
    first_step: Option<&StepInstance>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO process_instances \
             (id, definition_key, definition_version, status, current_step_key, \
              context, started_at, ended_at, canceled_reason) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(instance.id)
    .bind(&instance.definition_key)
    .bind(instance.definition_version)
    .bind(instance.status.to_string())
    .bind(&instance.current_step_key)
    .bind(&instance.context)
    .bind(instance.started_at)
    .bind(instance.ended_at)
    .bind(&instance.canceled_reason)
    .execute(&mut *tx)
    .await?;

    if let Some(step) = first_step {
        insert_step_instance(&mut tx, step).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Fetch a single instance by its primary key.
pub async fn get_instance(pool: &PgPool, id: Uuid) -> Result<ProcessInstance, DbError> {
    let row: Option<ProcessInstanceRow> =
        sqlx::query_as(&format!("SELECT {INSTANCE_COLUMNS} FROM process_instances WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.ok_or(DbError::NotFound)?.into_domain()
}

/// Step rows for one instance, in creation order.
pub async fn step_history(pool: &PgPool, instance_id: Uuid) -> Result<Vec<StepInstance>, DbError> {
    let rows: Vec<StepInstanceRow> = sqlx::query_as(&format!(
        "SELECT {STEP_COLUMNS} FROM step_instances \
         WHERE process_instance_id = $1 ORDER BY seq"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(StepInstanceRow::into_domain).collect()
}

/// Atomically close the current step and advance (or finish) the instance.
pub async fn commit_transition(
    pool: &PgPool,
    instance_id: Uuid,
    expected_step: &str,
    close: &CloseStep,
    advance: &Advance,
    context: &Value,
) -> Result<ProcessInstance, DbError> {
    let mut tx = pool.begin().await?;

    let (next_key, status, ended_at): (Option<String>, InstanceStatus, Option<DateTime<Utc>>) =
        match advance {
            Advance::To(next) => (Some(next.step_key.clone()), InstanceStatus::Running, None),
            Advance::Finish { status, ended_at } => (None, *status, Some(*ended_at)),
        };

    // The compare-and-swap guard: only the writer that saw the live
    // `current_step_key` gets to commit.
    let row: Option<ProcessInstanceRow> = sqlx::query_as(&format!(
        "UPDATE process_instances \
         SET current_step_key = $3, status = $4, ended_at = $5, context = $6 \
         WHERE id = $1 AND current_step_key = $2 AND status = 'running' \
         RETURNING {INSTANCE_COLUMNS}"
    ))
    .bind(instance_id)
    .bind(expected_step)
    .bind(&next_key)
    .bind(status.to_string())
    .bind(ended_at)
    .bind(context)
    .fetch_optional(&mut *tx)
    .await?;

    let row = row.ok_or(DbError::Conflict)?;

    // Close the newest open row for the expected step (loops close their
    // latest re-entry).
    sqlx::query(
        "UPDATE step_instances SET status = $1, completed_at = $2, output_data = $3 \
         WHERE id = (SELECT id FROM step_instances \
                     WHERE process_instance_id = $4 AND step_key = $5 AND status = 'in_progress' \
                     ORDER BY seq DESC LIMIT 1)",
    )
    .bind(close.status.to_string())
    .bind(close.at)
    .bind(&close.output_data)
    .bind(instance_id)
    .bind(expected_step)
    .execute(&mut *tx)
    .await?;

    if let Advance::To(next) = advance {
        insert_step_instance(&mut tx, next).await?;
    }

    tx.commit().await?;
    row.into_domain()
}

/// Move a running instance to `canceled`, closing open step rows.
///
/// Returns `None` when the instance exists but is already terminal.
pub async fn cancel_instance(
    pool: &PgPool,
    instance_id: Uuid,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Option<ProcessInstance>, DbError> {
    let mut tx = pool.begin().await?;

    let row: Option<ProcessInstanceRow> = sqlx::query_as(&format!(
        "UPDATE process_instances \
         SET status = 'canceled', current_step_key = NULL, ended_at = $2, canceled_reason = $3 \
         WHERE id = $1 AND status = 'running' \
         RETURNING {INSTANCE_COLUMNS}"
    ))
    .bind(instance_id)
    .bind(at)
    .bind(reason)
    .fetch_optional(&mut *tx)
    .await?;

    match row {
        Some(row) => {
            sqlx::query(
                "UPDATE step_instances SET status = 'skipped', completed_at = $2 \
                 WHERE process_instance_id = $1 AND status = 'in_progress'",
            )
            .bind(instance_id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Some(row.into_domain()?))
        }
        None => {
            tx.rollback().await?;
            // Distinguish "already terminal" from "does not exist".
            get_instance(pool, instance_id).await.map(|_| None)
        }
    }
}

// ---------------------------------------------------------------------------
// step_instances
// ---------------------------------------------------------------------------

async fn insert_step_instance(
    tx: &mut Transaction<'_, Postgres>,
    step: &StepInstance,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO step_instances \
             (id, process_instance_id, step_key, status, started_at, completed_at, output_data) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(step.id)
    .bind(step.process_instance_id)
    .bind(&step.step_key)
    .bind(step.status.to_string())
    .bind(step.started_at)
    .bind(step.completed_at)
    .bind(&step.output_data)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
