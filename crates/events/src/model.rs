//! Domain event types.
//!
//! Every state-machine transition and every automation outcome is recorded
//! as a [`DomainEvent`]. Event kinds are a closed enum so a rule can never
//! reference a trigger the engine does not emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// The kind of a domain event.
///
/// Wire names are dotted (`"step.completed"`), matching what automation
/// rules store as their trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "instance.started")]
    InstanceStarted,
    #[serde(rename = "instance.completed")]
    InstanceCompleted,
    #[serde(rename = "instance.canceled")]
    InstanceCanceled,
    #[serde(rename = "step.entered")]
    StepEntered,
    #[serde(rename = "step.completed")]
    StepCompleted,
    #[serde(rename = "step.skipped")]
    StepSkipped,
    #[serde(rename = "gateway.decided")]
    GatewayDecided,
    #[serde(rename = "step.sla_warning")]
    SlaWarning,
    #[serde(rename = "step.sla_breached")]
    SlaBreached,
    #[serde(rename = "automation.executed")]
    AutomationExecuted,
    #[serde(rename = "automation.failed")]
    AutomationFailed,
}

impl EventType {
    /// `automation.*` events record rule outcomes; they are never themselves
    /// offered to the rule engine, which keeps rules from cascading.
    pub fn is_automation_outcome(self) -> bool {
        matches!(self, Self::AutomationExecuted | Self::AutomationFailed)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InstanceStarted => "instance.started",
            Self::InstanceCompleted => "instance.completed",
            Self::InstanceCanceled => "instance.canceled",
            Self::StepEntered => "step.entered",
            Self::StepCompleted => "step.completed",
            Self::StepSkipped => "step.skipped",
            Self::GatewayDecided => "gateway.decided",
            Self::SlaWarning => "step.sla_warning",
            Self::SlaBreached => "step.sla_breached",
            Self::AutomationExecuted => "automation.executed",
            Self::AutomationFailed => "automation.failed",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for EventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instance.started" => Ok(Self::InstanceStarted),
            "instance.completed" => Ok(Self::InstanceCompleted),
            "instance.canceled" => Ok(Self::InstanceCanceled),
            "step.entered" => Ok(Self::StepEntered),
            "step.completed" => Ok(Self::StepCompleted),
            "step.skipped" => Ok(Self::StepSkipped),
            "gateway.decided" => Ok(Self::GatewayDecided),
            "step.sla_warning" => Ok(Self::SlaWarning),
            "step.sla_breached" => Ok(Self::SlaBreached),
            "automation.executed" => Ok(Self::AutomationExecuted),
            "automation.failed" => Ok(Self::AutomationFailed),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// One entry in the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: EventType,
    /// Instance the event belongs to; `None` for engine-global events.
    pub instance_id: Option<Uuid>,
    pub step_key: Option<String>,
    /// `None` for system-generated events.
    pub actor_id: Option<String>,
    pub payload: Value,
    /// Log-assigned insertion sequence; breaks `created_at` ties.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Build an event ready for appending (`seq` is assigned by the log).
    pub fn new(
        event_type: EventType,
        instance_id: Option<Uuid>,
        step_key: Option<String>,
        actor_id: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            instance_id,
            step_key,
            actor_id,
            payload,
            seq: 0,
            created_at: Utc::now(),
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_type_round_trips_through_wire_name() {
        for t in [
            EventType::InstanceStarted,
            EventType::StepCompleted,
            EventType::GatewayDecided,
            EventType::SlaBreached,
        ] {
            assert_eq!(EventType::from_str(&t.to_string()).unwrap(), t);
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(EventType::from_str("step.exploded").is_err());
    }

    #[test]
    fn automation_outcomes_are_flagged() {
        assert!(EventType::AutomationExecuted.is_automation_outcome());
        assert!(EventType::AutomationFailed.is_automation_outcome());
        assert!(!EventType::StepCompleted.is_automation_outcome());
    }
}
