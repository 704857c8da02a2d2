//! Domain event persistence.
//!
//! Insert-only; `seq` comes from the table's sequence and is the total
//! order the rest of the system relies on.

use sqlx::PgPool;
use uuid::Uuid;

use events::DomainEvent;

use crate::{models::DomainEventRow, DbError};

const COLUMNS: &str = "id, seq, event_type, instance_id, step_key, actor_id, payload, created_at";

/// Append one event, returning its database-assigned sequence number.
pub async fn append_event(pool: &PgPool, event: &DomainEvent) -> Result<i64, DbError> {
    let (seq,): (i64,) = sqlx::query_as(
        "INSERT INTO domain_events \
             (id, event_type, instance_id, step_key, actor_id, payload, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING seq",
    )
    .bind(event.id)
    .bind(event.event_type.to_string())
    .bind(event.instance_id)
    .bind(&event.step_key)
    .bind(&event.actor_id)
    .bind(&event.payload)
    .bind(event.created_at)
    .fetch_one(pool)
    .await?;

    Ok(seq)
}

/// All events for one instance, ordered by sequence number.
pub async fn list_by_instance(
    pool: &PgPool,
    instance_id: Uuid,
) -> Result<Vec<DomainEvent>, DbError> {
    let rows: Vec<DomainEventRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM domain_events WHERE instance_id = $1 ORDER BY seq"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(DomainEventRow::into_domain).collect()
}
