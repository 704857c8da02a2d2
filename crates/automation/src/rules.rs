//! Automation rule model and storage.
//!
//! Rules are admin-configured and read on every event; stores hand out
//! snapshots so a rule being toggled mid-evaluation of an unrelated event
//! needs no global lock. System rules (`is_system`) protect the baseline
//! automations: they can be disabled but a delete is rejected.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use events::EventType;

use crate::conditions::Condition;
use crate::{ActionKind, RuleError};

// ---------------------------------------------------------------------------
// AutomationRule
// ---------------------------------------------------------------------------

/// A trigger → condition → action binding evaluated against domain events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Event kind this rule reacts to.
    pub trigger: EventType,
    /// If set, only events for these step keys match.
    pub trigger_step_keys: Option<Vec<String>>,
    /// If set, only events whose step belongs to one of these lanes match.
    pub trigger_lanes: Option<Vec<String>>,
    /// Predicates over the event payload; all must hold.
    pub conditions: Option<Vec<Condition>>,
    pub action: ActionKind,
    /// Opaque parameters for the dispatcher; `{{placeholder}}` templates are
    /// resolved from the event payload before dispatch.
    pub action_config: Value,
    /// Lower runs first.
    pub priority: i32,
    /// Seeded rules that may be disabled but not deleted.
    pub is_system: bool,
    /// Store-assigned creation sequence; breaks priority ties so rule
    /// ordering stays deterministic.
    pub created_seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the caller supplies when creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: EventType,
    #[serde(default)]
    pub trigger_step_keys: Option<Vec<String>>,
    #[serde(default)]
    pub trigger_lanes: Option<Vec<String>>,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    pub action: ActionKind,
    #[serde(default)]
    pub action_config: Value,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub is_system: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    10
}

/// Fields an admin may change on an existing rule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleUpdate {
    pub enabled: Option<bool>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub action_config: Option<Value>,
    pub conditions: Option<Vec<Condition>>,
}

// ---------------------------------------------------------------------------
// RuleStore
// ---------------------------------------------------------------------------

/// Storage for automation rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// All rules, for the admin surface.
    async fn list(&self) -> Result<Vec<AutomationRule>, RuleError>;

    /// Snapshot of enabled rules, taken once per `on_event` call.
    async fn list_enabled(&self) -> Result<Vec<AutomationRule>, RuleError>;

    async fn get(&self, id: Uuid) -> Result<AutomationRule, RuleError>;

    async fn create(&self, draft: RuleDraft) -> Result<AutomationRule, RuleError>;

    async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<AutomationRule, RuleError>;

    /// Fails with [`RuleError::Forbidden`] for system rules.
    async fn delete(&self, id: Uuid) -> Result<(), RuleError>;
}

// ---------------------------------------------------------------------------
// MemoryRuleStore
// ---------------------------------------------------------------------------

/// In-memory rule store, used by tests and brokerless deployments.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<AutomationRule>>,
    next_seq: AtomicI64,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_seq: AtomicI64::new(1),
        }
    }

    fn materialize(&self, draft: RuleDraft) -> AutomationRule {
        let now = Utc::now();
        AutomationRule {
            id: Uuid::new_v4(),
            name: draft.name,
            description: draft.description,
            enabled: draft.enabled,
            trigger: draft.trigger,
            trigger_step_keys: draft.trigger_step_keys,
            trigger_lanes: draft.trigger_lanes,
            conditions: draft.conditions,
            action: draft.action,
            action_config: draft.action_config,
            priority: draft.priority,
            is_system: draft.is_system,
            created_seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            created_at: now,
            updated_at: now,
        }
    }
}

fn poisoned<T>(_: T) -> RuleError {
    RuleError::Storage("rule store lock poisoned".into())
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list(&self) -> Result<Vec<AutomationRule>, RuleError> {
        Ok(self.rules.read().map_err(poisoned)?.clone())
    }

    async fn list_enabled(&self) -> Result<Vec<AutomationRule>, RuleError> {
        Ok(self
            .rules
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<AutomationRule, RuleError> {
        self.rules
            .read()
            .map_err(poisoned)?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(RuleError::NotFound)
    }

    async fn create(&self, draft: RuleDraft) -> Result<AutomationRule, RuleError> {
        let rule = self.materialize(draft);
        self.rules.write().map_err(poisoned)?.push(rule.clone());
        Ok(rule)
    }

    async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<AutomationRule, RuleError> {
        let mut rules = self.rules.write().map_err(poisoned)?;
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(RuleError::NotFound)?;

        if let Some(enabled) = update.enabled {
            rule.enabled = enabled;
        }
        if let Some(name) = update.name {
            rule.name = name;
        }
        if let Some(description) = update.description {
            rule.description = Some(description);
        }
        if let Some(priority) = update.priority {
            rule.priority = priority;
        }
        if let Some(config) = update.action_config {
            rule.action_config = config;
        }
        if let Some(conditions) = update.conditions {
            rule.conditions = Some(conditions);
        }
        rule.updated_at = Utc::now();

        Ok(rule.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RuleError> {
        let mut rules = self.rules.write().map_err(poisoned)?;
        let idx = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or(RuleError::NotFound)?;
        if rules[idx].is_system {
            return Err(RuleError::Forbidden);
        }
        rules.remove(idx);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Seeded system rules
// ---------------------------------------------------------------------------

/// The baseline automations every deployment starts with.
///
/// All are `is_system` so an admin can switch them off but not remove them.
pub fn system_rules() -> Vec<RuleDraft> {
    vec![
        RuleDraft {
            name: "Notify reviewer on new request".into(),
            description: Some("Email the reviewing role when a request enters review".into()),
            enabled: true,
            trigger: EventType::StepEntered,
            trigger_step_keys: Some(vec!["review_request".into()]),
            trigger_lanes: None,
            conditions: None,
            action: ActionKind::SendEmail,
            action_config: json!({
                "to": "pm",
                "subject": "New request pending review",
                "body": "Request on instance {{instanceId}} reached step {{stepTitle}}.",
            }),
            priority: 1,
            is_system: true,
        },
        RuleDraft {
            name: "SLA warning reminder".into(),
            description: Some("Nudge the assignee when a step approaches its SLA threshold".into()),
            enabled: true,
            trigger: EventType::SlaWarning,
            trigger_step_keys: None,
            trigger_lanes: None,
            conditions: None,
            action: ActionKind::SendEmail,
            action_config: json!({
                "to": "assignee",
                "subject": "[SLA warning] Action required: {{stepTitle}}",
                "body": "Step {{stepKey}} has been open for {{elapsedHours}} hours.",
            }),
            priority: 1,
            is_system: true,
        },
        RuleDraft {
            name: "SLA breach escalation".into(),
            description: Some("Escalate to project management once a step blows its SLA".into()),
            enabled: true,
            trigger: EventType::SlaBreached,
            trigger_step_keys: None,
            trigger_lanes: None,
            conditions: None,
            action: ActionKind::SendNotification,
            action_config: json!({
                "channel": "in_app",
                "recipients": ["pm"],
                "message": "Step {{stepKey}} on instance {{instanceId}} breached its SLA.",
                "urgency": "high",
            }),
            priority: 2,
            is_system: true,
        },
        RuleDraft {
            name: "Process completed webhook".into(),
            description: Some("Post to the configured webhook when an instance completes".into()),
            // Off until a webhook URL is configured.
            enabled: false,
            trigger: EventType::InstanceCompleted,
            trigger_step_keys: None,
            trigger_lanes: None,
            conditions: None,
            action: ActionKind::SendWebhook,
            action_config: json!({
                "url": "{{webhookUrl}}",
                "method": "POST",
                "payload": {
                    "event": "instance.completed",
                    "instanceId": "{{instanceId}}",
                },
            }),
            priority: 5,
            is_system: true,
        },
    ]
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> RuleDraft {
        RuleDraft {
            name: name.into(),
            description: None,
            enabled: true,
            trigger: EventType::StepCompleted,
            trigger_step_keys: None,
            trigger_lanes: None,
            conditions: None,
            action: ActionKind::CreateTask,
            action_config: json!({}),
            priority: 10,
            is_system: false,
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_creation_sequence() {
        let store = MemoryRuleStore::new();
        let a = store.create(draft("a")).await.unwrap();
        let b = store.create(draft("b")).await.unwrap();
        assert!(a.created_seq < b.created_seq);
    }

    #[tokio::test]
    async fn list_enabled_excludes_disabled_rules() {
        let store = MemoryRuleStore::new();
        let a = store.create(draft("a")).await.unwrap();
        store.create(draft("b")).await.unwrap();

        store
            .update(a.id, RuleUpdate { enabled: Some(false), ..Default::default() })
            .await
            .unwrap();

        let enabled = store.list_enabled().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "b");
    }

    #[tokio::test]
    async fn system_rules_can_be_disabled_but_not_deleted() {
        let store = MemoryRuleStore::new();
        let mut d = draft("baseline");
        d.is_system = true;
        let rule = store.create(d).await.unwrap();

        assert!(matches!(store.delete(rule.id).await, Err(RuleError::Forbidden)));

        let updated = store
            .update(rule.id, RuleUpdate { enabled: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(!updated.enabled);

        // Still present after the rejected delete.
        assert!(store.get(rule.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_ordinary_rules() {
        let store = MemoryRuleStore::new();
        let rule = store.create(draft("temp")).await.unwrap();
        store.delete(rule.id).await.unwrap();
        assert!(matches!(store.get(rule.id).await, Err(RuleError::NotFound)));
    }

    #[test]
    fn seeded_rules_are_all_system_rules() {
        for d in system_rules() {
            assert!(d.is_system, "seeded rule '{}' must be a system rule", d.name);
        }
    }
}
