//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour. Domain
//! types live in the `engine`, `events` and `automation` crates; each row
//! converts with `into_domain`, surfacing stale stored values as
//! [`DbError::Decode`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use automation::AutomationRule;
use engine::{ProcessInstance, StepInstance};
use events::DomainEvent;

use crate::DbError;

// ---------------------------------------------------------------------------
// process_definitions
// ---------------------------------------------------------------------------

/// A persisted process definition row. The full definition lives in `json`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessDefinitionRow {
    pub id: Uuid,
    pub key: String,
    pub version: i32,
    pub is_active: bool,
    pub json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ProcessDefinitionRow {
    pub fn into_domain(self) -> Result<engine::ProcessDefinition, DbError> {
        serde_json::from_value(self.json).map_err(|e| DbError::Decode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// process_instances
// ---------------------------------------------------------------------------

/// A persisted process instance row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessInstanceRow {
    pub id: Uuid,
    pub definition_key: String,
    pub definition_version: i32,
    pub status: String,
    pub current_step_key: Option<String>,
    pub context: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub canceled_reason: Option<String>,
}

impl ProcessInstanceRow {
    pub fn into_domain(self) -> Result<ProcessInstance, DbError> {
        Ok(ProcessInstance {
            id: self.id,
            definition_key: self.definition_key,
            definition_version: self.definition_version,
            status: self.status.parse().map_err(DbError::Decode)?,
            current_step_key: self.current_step_key,
            context: self.context,
            started_at: self.started_at,
            ended_at: self.ended_at,
            canceled_reason: self.canceled_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// step_instances
// ---------------------------------------------------------------------------

/// A persisted step instance row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepInstanceRow {
    pub id: Uuid,
    pub process_instance_id: Uuid,
    pub step_key: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_data: serde_json::Value,
}

impl StepInstanceRow {
    pub fn into_domain(self) -> Result<StepInstance, DbError> {
        Ok(StepInstance {
            id: self.id,
            process_instance_id: self.process_instance_id,
            step_key: self.step_key,
            status: self.status.parse().map_err(DbError::Decode)?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            output_data: self.output_data,
        })
    }
}

// ---------------------------------------------------------------------------
// domain_events
// ---------------------------------------------------------------------------

/// A persisted domain event row. `seq` is assigned by the database and is
/// the per-instance total order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DomainEventRow {
    pub id: Uuid,
    pub seq: i64,
    pub event_type: String,
    pub instance_id: Option<Uuid>,
    pub step_key: Option<String>,
    pub actor_id: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DomainEventRow {
    pub fn into_domain(self) -> Result<DomainEvent, DbError> {
        Ok(DomainEvent {
            id: self.id,
            event_type: self.event_type.parse().map_err(DbError::Decode)?,
            instance_id: self.instance_id,
            step_key: self.step_key,
            actor_id: self.actor_id,
            payload: self.payload,
            seq: self.seq,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// automation_rules
// ---------------------------------------------------------------------------

/// A persisted automation rule row. The filter sets and conditions are
/// stored as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AutomationRuleRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub trigger_type: String,
    pub trigger_step_keys: Option<serde_json::Value>,
    pub trigger_lanes: Option<serde_json::Value>,
    pub conditions: Option<serde_json::Value>,
    pub action: String,
    pub action_config: serde_json::Value,
    pub priority: i32,
    pub is_system: bool,
    pub created_seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRuleRow {
    pub fn into_domain(self) -> Result<AutomationRule, DbError> {
        fn from_json<T: serde::de::DeserializeOwned>(
            value: Option<serde_json::Value>,
        ) -> Result<Option<T>, DbError> {
            value
                .map(|v| serde_json::from_value(v).map_err(|e| DbError::Decode(e.to_string())))
                .transpose()
        }

        Ok(AutomationRule {
            id: self.id,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            trigger: self.trigger_type.parse().map_err(DbError::Decode)?,
            trigger_step_keys: from_json(self.trigger_step_keys)?,
            trigger_lanes: from_json(self.trigger_lanes)?,
            conditions: from_json(self.conditions)?,
            action: self.action.parse().map_err(DbError::Decode)?,
            action_config: self.action_config,
            priority: self.priority,
            is_system: self.is_system,
            created_seq: self.created_seq,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
