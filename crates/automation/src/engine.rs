//! The rule engine — matches fired events against enabled rules and
//! dispatches their actions.
//!
//! Ordering is a hard contract: matching rules always run ascending by
//! `(priority, created_seq)`, so two rules that both fire for the same
//! event shape keep the same relative order on every evaluation. A failed
//! action is recorded and does not stop the remaining rules.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use events::DomainEvent;

use crate::rules::{AutomationRule, RuleStore};
use crate::template;
use crate::{conditions, ActionDispatcher, ActionResult};

pub struct RuleEngine {
    store: Arc<dyn RuleStore>,
    dispatcher: Arc<dyn ActionDispatcher>,
}

impl RuleEngine {
    pub fn new(store: Arc<dyn RuleStore>, dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// The shared dispatcher, for callers that also run step-level
    /// automations outside any rule.
    pub fn dispatcher(&self) -> Arc<dyn ActionDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Evaluate one event against the current rule set.
    ///
    /// Returns one result per matching rule, in dispatch order. Never
    /// fails: a broken store or a failing action degrades to an empty or
    /// partial result list, and the caller decides what to log.
    pub async fn on_event(&self, event: &DomainEvent) -> Vec<ActionResult> {
        if event.event_type.is_automation_outcome() {
            return Vec::new();
        }

        // Snapshot once per call; concurrent admin edits affect later events.
        let snapshot = match self.store.list_enabled().await {
            Ok(rules) => rules,
            Err(err) => {
                warn!(%err, "could not load automation rules; skipping evaluation");
                return Vec::new();
            }
        };

        let mut matching: Vec<AutomationRule> = snapshot
            .into_iter()
            .filter(|rule| Self::matches(rule, event))
            .collect();
        matching.sort_by_key(|r| (r.priority, r.created_seq));

        debug!(
            event_type = %event.event_type,
            matched = matching.len(),
            "evaluating automation rules"
        );

        let mut results = Vec::with_capacity(matching.len());
        for rule in matching {
            let config = template::render_config(&rule.action_config, &event.payload);
            let outcome = self.dispatcher.execute(rule.action, &config, &event.payload).await;

            let result = match outcome {
                Ok(details) => ActionResult {
                    rule_id: rule.id,
                    rule_name: rule.name,
                    action: rule.action,
                    ok: true,
                    error: None,
                    details: (!details.is_null()).then_some(details),
                    executed_at: Utc::now(),
                },
                Err(err) => {
                    warn!(rule = %rule.name, action = %rule.action, %err, "automation action failed");
                    ActionResult {
                        rule_id: rule.id,
                        rule_name: rule.name,
                        action: rule.action,
                        ok: false,
                        error: Some(err.to_string()),
                        details: None,
                        executed_at: Utc::now(),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    fn matches(rule: &AutomationRule, event: &DomainEvent) -> bool {
        if rule.trigger != event.event_type {
            return false;
        }

        if let Some(step_keys) = &rule.trigger_step_keys {
            if !step_keys.is_empty() {
                match &event.step_key {
                    Some(key) if step_keys.contains(key) => {}
                    _ => return false,
                }
            }
        }

        if let Some(lanes) = &rule.trigger_lanes {
            if !lanes.is_empty() {
                match event.payload.get("lane").and_then(Value::as_str) {
                    Some(lane) if lanes.iter().any(|l| l == lane) => {}
                    _ => return false,
                }
            }
        }

        if let Some(conds) = &rule.conditions {
            if !conditions::evaluate(conds, &event.payload) {
                return false;
            }
        }

        true
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Condition, ConditionOp};
    use crate::rules::{MemoryRuleStore, RuleDraft};
    use crate::{ActionKind, MockDispatcher};
    use events::EventType;
    use serde_json::json;
    use uuid::Uuid;

    fn draft(name: &str, trigger: EventType, action: ActionKind, priority: i32) -> RuleDraft {
        RuleDraft {
            name: name.into(),
            description: None,
            enabled: true,
            trigger,
            trigger_step_keys: None,
            trigger_lanes: None,
            conditions: None,
            action,
            action_config: json!({}),
            priority,
            is_system: false,
        }
    }

    fn step_completed(step_key: &str, payload: Value) -> DomainEvent {
        DomainEvent::new(
            EventType::StepCompleted,
            Some(Uuid::new_v4()),
            Some(step_key.into()),
            None,
            payload,
        )
    }

    async fn engine_with(
        rules: Vec<RuleDraft>,
        dispatcher: MockDispatcher,
    ) -> (RuleEngine, Arc<MockDispatcher>) {
        let store = Arc::new(MemoryRuleStore::new());
        for rule in rules {
            store.create(rule).await.unwrap();
        }
        let dispatcher = Arc::new(dispatcher);
        (
            RuleEngine::new(store, Arc::clone(&dispatcher) as Arc<dyn ActionDispatcher>),
            dispatcher,
        )
    }

    #[tokio::test]
    async fn trigger_type_must_match() {
        let (engine, mock) = engine_with(
            vec![draft("on-complete", EventType::StepCompleted, ActionKind::CreateTask, 1)],
            MockDispatcher::succeeding(),
        )
        .await;

        let entered = DomainEvent::new(EventType::StepEntered, None, Some("review".into()), None, json!({}));
        assert!(engine.on_event(&entered).await.is_empty());
        assert_eq!(mock.call_count(), 0);

        let results = engine.on_event(&step_completed("review", json!({}))).await;
        assert_eq!(results.len(), 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn step_key_filter_narrows_matches() {
        let mut rule = draft("review-only", EventType::StepCompleted, ActionKind::SendEmail, 1);
        rule.trigger_step_keys = Some(vec!["review".into()]);
        let (engine, mock) = engine_with(vec![rule], MockDispatcher::succeeding()).await;

        assert!(engine.on_event(&step_completed("intake", json!({}))).await.is_empty());
        assert_eq!(engine.on_event(&step_completed("review", json!({}))).await.len(), 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn lane_filter_reads_the_event_payload() {
        let mut rule = draft("ops-lane", EventType::StepCompleted, ActionKind::SendEmail, 1);
        rule.trigger_lanes = Some(vec!["ops".into()]);
        let (engine, _) = engine_with(vec![rule], MockDispatcher::succeeding()).await;

        let wrong_lane = step_completed("review", json!({ "lane": "sales" }));
        assert!(engine.on_event(&wrong_lane).await.is_empty());

        let right_lane = step_completed("review", json!({ "lane": "ops" }));
        assert_eq!(engine.on_event(&right_lane).await.len(), 1);
    }

    #[tokio::test]
    async fn conditions_filter_on_the_payload() {
        let mut rule = draft("approved-only", EventType::StepCompleted, ActionKind::SendNotification, 1);
        rule.conditions = Some(vec![Condition {
            field: "approvalStatus".into(),
            operator: ConditionOp::Equals,
            value: Some(json!("approved")),
        }]);
        let (engine, _) = engine_with(vec![rule], MockDispatcher::succeeding()).await;

        let rejected = step_completed("review", json!({ "approvalStatus": "rejected" }));
        assert!(engine.on_event(&rejected).await.is_empty());

        let approved = step_completed("review", json!({ "approvalStatus": "approved" }));
        assert_eq!(engine.on_event(&approved).await.len(), 1);
    }

    #[tokio::test]
    async fn rules_run_by_priority_then_creation_order() {
        let (engine, mock) = engine_with(
            vec![
                draft("late", EventType::StepCompleted, ActionKind::SendWebhook, 5),
                draft("first", EventType::StepCompleted, ActionKind::CreateTask, 1),
                draft("second", EventType::StepCompleted, ActionKind::SendEmail, 1),
            ],
            MockDispatcher::succeeding(),
        )
        .await;

        // Evaluate twice: the order must be identical each time.
        for _ in 0..2 {
            engine.on_event(&step_completed("review", json!({}))).await;
        }

        let kinds = mock.kinds();
        let expected = [
            ActionKind::CreateTask,
            ActionKind::SendEmail,
            ActionKind::SendWebhook,
        ];
        assert_eq!(kinds[..3], expected);
        assert_eq!(kinds[3..], expected);
    }

    #[tokio::test]
    async fn failing_action_does_not_block_later_rules() {
        let (engine, mock) = engine_with(
            vec![
                draft("ok-task", EventType::StepCompleted, ActionKind::CreateTask, 1),
                draft("broken-mail", EventType::StepCompleted, ActionKind::SendEmail, 2),
                draft("ok-webhook", EventType::StepCompleted, ActionKind::SendWebhook, 3),
            ],
            MockDispatcher::failing_for(ActionKind::SendEmail, "smtp unavailable"),
        )
        .await;

        let results = engine.on_event(&step_completed("review", json!({}))).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].ok);
        assert!(!results[1].ok);
        assert_eq!(results[1].error.as_deref(), Some("action failed: smtp unavailable"));
        assert!(results[2].ok);
        // All three were attempted despite the middle failure.
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn disabled_rules_do_not_fire() {
        let mut rule = draft("off", EventType::StepCompleted, ActionKind::CreateTask, 1);
        rule.enabled = false;
        let (engine, mock) = engine_with(vec![rule], MockDispatcher::succeeding()).await;

        assert!(engine.on_event(&step_completed("review", json!({}))).await.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn automation_outcome_events_never_match() {
        let rule = draft("loop", EventType::StepCompleted, ActionKind::CreateTask, 1);
        let (engine, mock) = engine_with(vec![rule], MockDispatcher::succeeding()).await;

        let outcome = DomainEvent::new(
            EventType::AutomationExecuted,
            Some(Uuid::new_v4()),
            Some("review".into()),
            None,
            json!({}),
        );
        assert!(engine.on_event(&outcome).await.is_empty());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn action_config_templates_are_resolved_before_dispatch() {
        let mut rule = draft("templated", EventType::StepCompleted, ActionKind::SendEmail, 1);
        rule.action_config = json!({ "subject": "Step {{stepKey}} done by {{leadName}}" });
        let (engine, mock) = engine_with(vec![rule], MockDispatcher::succeeding()).await;

        engine
            .on_event(&step_completed("review", json!({ "stepKey": "review", "leadName": "Acme" })))
            .await;

        let calls = mock.calls();
        assert_eq!(calls[0].config["subject"], "Step review done by Acme");
    }
}
