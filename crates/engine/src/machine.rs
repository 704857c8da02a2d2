//! The process instance state machine.
//!
//! `ProcessMachine` is the central orchestrator and the single writer of a
//! given instance:
//! 1. Validates the caller's step against `current_step_key` and the role
//!    gate before anything else.
//! 2. Resolves the successor (gateway decision or sole `next_step_keys`
//!    entry) against the definition version pinned at `start`.
//! 3. Commits the transition through the store's compare-and-swap; the
//!    loser of a racing completion observes a changed `current_step_key`
//!    and is rejected.
//! 4. Emits `step.completed` before `step.entered`, both before returning,
//!    fanning each event out to the automation rule engine synchronously.
//! 5. Records one `automation.executed`/`automation.failed` event per rule
//!    result; automation failures never fail the triggering transition.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use automation::{template, ActionResult, RuleEngine};
use events::{DomainEvent, EventLog, EventType};

use crate::gateway;
use crate::models::{
    Actor, DecisionCandidate, InstanceStatus, Lane, ProcessInstance, Step,
    StepInstance, StepInstanceStatus, ROLE_ADMIN, ROLE_PM,
};
use crate::registry::DefinitionRegistry;
use crate::store::{Advance, CloseStep, InstanceStore, StoreError};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Read model for the presentation layer: the instance, its step history
/// and its slice of the event log.
#[derive(Debug, Serialize)]
pub struct Timeline {
    pub instance: ProcessInstance,
    pub steps: Vec<StepInstance>,
    pub events: Vec<DomainEvent>,
}

// ---------------------------------------------------------------------------
// ProcessMachine
// ---------------------------------------------------------------------------

pub struct ProcessMachine {
    registry: Arc<DefinitionRegistry>,
    store: Arc<dyn InstanceStore>,
    log: Arc<dyn EventLog>,
    rules: Arc<RuleEngine>,
}

impl ProcessMachine {
    pub fn new(
        registry: Arc<DefinitionRegistry>,
        store: Arc<dyn InstanceStore>,
        log: Arc<dyn EventLog>,
        rules: Arc<RuleEngine>,
    ) -> Self {
        Self { registry, store, log, rules }
    }

    pub fn registry(&self) -> Arc<DefinitionRegistry> {
        Arc::clone(&self.registry)
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    /// Create an instance of the active definition, placed at the start
    /// step's sole successor.
    #[instrument(skip(self, context, actor), fields(definition_key = %definition_key))]
    pub async fn start(
        &self,
        definition_key: &str,
        context: Value,
        actor: Option<&Actor>,
    ) -> Result<ProcessInstance, EngineError> {
        let definition = self.registry.active(definition_key)?;
        let start = definition
            .start_step()
            .ok_or_else(|| EngineError::InvalidState("definition has no start step".into()))?;
        let first_key = start.next_step_keys.first().ok_or_else(|| {
            EngineError::InvalidState("start step has no successor".into())
        })?;
        let first = definition.step(first_key).ok_or_else(|| {
            EngineError::NotFound(format!("step '{first_key}' in definition '{definition_key}'"))
        })?;

        let now = Utc::now();
        let mut instance = ProcessInstance {
            id: Uuid::new_v4(),
            definition_key: definition.key.clone(),
            definition_version: definition.version,
            status: InstanceStatus::Running,
            current_step_key: Some(first.key.clone()),
            context,
            started_at: now,
            ended_at: None,
            canceled_reason: None,
        };

        // A start step may feed directly into an end step, in which case
        // the instance is born completed.
        let first_step_row = if first.is_end() {
            instance.status = InstanceStatus::Completed;
            instance.current_step_key = None;
            instance.ended_at = Some(now);
            None
        } else {
            Some(StepInstance::in_progress(instance.id, &first.key, now))
        };

        self.store
            .insert(instance.clone(), first_step_row)
            .await
            .map_err(|e| storage_error(e, instance.id))?;

        info!(instance_id = %instance.id, version = definition.version, "process instance started");

        self.emit(DomainEvent::new(
            EventType::InstanceStarted,
            Some(instance.id),
            Some(start.key.clone()),
            actor.map(|a| a.id.clone()),
            instance_payload(&instance, json!({})),
        ))
        .await;

        if instance.status == InstanceStatus::Completed {
            self.emit(DomainEvent::new(
                EventType::InstanceCompleted,
                Some(instance.id),
                Some(first.key.clone()),
                None,
                instance_payload(&instance, json!({})),
            ))
            .await;
        } else {
            self.enter_step(first, &instance, Some(&start.key)).await;
        }

        Ok(instance)
    }

    // -----------------------------------------------------------------------
    // complete_step
    // -----------------------------------------------------------------------

    /// Complete the instance's current step and advance it.
    ///
    /// # Errors
    /// `NotFound`, `InvalidState`, `StepMismatch`, `Unauthorized` and
    /// `InvalidDecision` per the validation order documented on the module.
    #[instrument(skip(self, output_data, gateway_decision), fields(instance_id = %instance_id, step_key = %step_key))]
    pub async fn complete_step(
        &self,
        instance_id: Uuid,
        step_key: &str,
        actor: &Actor,
        output_data: Value,
        gateway_decision: Option<&str>,
    ) -> Result<ProcessInstance, EngineError> {
        let instance = self.instance(instance_id).await?;

        if instance.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "instance is {}",
                instance.status
            )));
        }
        let current = instance.current_step_key.clone().ok_or_else(|| {
            EngineError::InvalidState("running instance has no current step".into())
        })?;
        if step_key != current {
            return Err(EngineError::StepMismatch {
                requested: step_key.to_string(),
                current,
            });
        }

        let definition = self
            .registry
            .version(&instance.definition_key, instance.definition_version)?;
        let step = definition.step(step_key).ok_or_else(|| {
            EngineError::NotFound(format!(
                "step '{step_key}' in definition '{}'",
                definition.key
            ))
        })?;
        authorize(step, definition.lane(&step.lane), actor)?;

        let next_key = if step.is_gateway() {
            gateway::resolve(step, gateway_decision)?
        } else {
            step.next_step_keys.first().map(String::as_str).ok_or_else(|| {
                EngineError::InvalidState(format!("step '{step_key}' has no successor"))
            })?
        };
        let next = definition.step(next_key).ok_or_else(|| {
            EngineError::NotFound(format!(
                "step '{next_key}' in definition '{}'",
                definition.key
            ))
        })?;

        let now = Utc::now();
        let close = CloseStep {
            status: StepInstanceStatus::Completed,
            output_data: output_data.clone(),
            at: now,
        };
        let advance = if next.is_end() {
            Advance::Finish { status: InstanceStatus::Completed, ended_at: now }
        } else {
            Advance::To(StepInstance::in_progress(instance_id, &next.key, now))
        };
        let merged = merge_context(&instance.context, &output_data);

        let updated = match self
            .store
            .commit_transition(instance_id, step_key, close, advance, merged)
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::Conflict) => {
                return Err(self.conflict_to_error(instance_id, step_key).await)
            }
            Err(e) => return Err(storage_error(e, instance_id)),
        };

        info!(next = %next.key, "step completed");

        self.emit(DomainEvent::new(
            EventType::StepCompleted,
            Some(instance_id),
            Some(step.key.clone()),
            Some(actor.id.clone()),
            step_payload(step, &updated, &output_data),
        ))
        .await;

        if step.is_gateway() {
            self.emit(DomainEvent::new(
                EventType::GatewayDecided,
                Some(instance_id),
                Some(step.key.clone()),
                Some(actor.id.clone()),
                step_payload(step, &updated, &json!({ "decision": next.key })),
            ))
            .await;
        }

        if updated.status == InstanceStatus::Completed {
            self.emit(DomainEvent::new(
                EventType::InstanceCompleted,
                Some(instance_id),
                Some(next.key.clone()),
                None,
                instance_payload(&updated, json!({})),
            ))
            .await;
        } else {
            self.enter_step(next, &updated, Some(&step.key)).await;
        }

        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // skip_step
    // -----------------------------------------------------------------------

    /// Skip the current step without completing it. Admin only; gateways
    /// cannot be skipped because something has to pick a branch.
    #[instrument(skip(self, reason), fields(instance_id = %instance_id))]
    pub async fn skip_step(
        &self,
        instance_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<ProcessInstance, EngineError> {
        let instance = self.instance(instance_id).await?;

        if instance.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "instance is {}",
                instance.status
            )));
        }
        let current = instance.current_step_key.clone().ok_or_else(|| {
            EngineError::InvalidState("running instance has no current step".into())
        })?;
        if !actor.is_admin() {
            return Err(EngineError::Unauthorized {
                role: actor.role.clone(),
                step: current,
            });
        }

        let definition = self
            .registry
            .version(&instance.definition_key, instance.definition_version)?;
        let step = definition.step(&current).ok_or_else(|| {
            EngineError::NotFound(format!("step '{current}' in definition '{}'", definition.key))
        })?;
        if step.is_gateway() {
            return Err(EngineError::InvalidState(
                "gateway steps cannot be skipped".into(),
            ));
        }
        let next_key = step.next_step_keys.first().map(String::as_str).ok_or_else(|| {
            EngineError::InvalidState(format!("step '{current}' has no successor"))
        })?;
        let next = definition.step(next_key).ok_or_else(|| {
            EngineError::NotFound(format!("step '{next_key}' in definition '{}'", definition.key))
        })?;

        let now = Utc::now();
        let close = CloseStep {
            status: StepInstanceStatus::Skipped,
            output_data: Value::Null,
            at: now,
        };
        let advance = if next.is_end() {
            Advance::Finish { status: InstanceStatus::Completed, ended_at: now }
        } else {
            Advance::To(StepInstance::in_progress(instance_id, &next.key, now))
        };

        let updated = match self
            .store
            .commit_transition(instance_id, &current, close, advance, instance.context.clone())
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::Conflict) => {
                return Err(self.conflict_to_error(instance_id, &current).await)
            }
            Err(e) => return Err(storage_error(e, instance_id)),
        };

        warn!(step = %current, by = %actor.id, "step skipped");

        self.emit(DomainEvent::new(
            EventType::StepSkipped,
            Some(instance_id),
            Some(step.key.clone()),
            Some(actor.id.clone()),
            step_payload(step, &updated, &json!({ "reason": reason })),
        ))
        .await;

        if updated.status == InstanceStatus::Completed {
            self.emit(DomainEvent::new(
                EventType::InstanceCompleted,
                Some(instance_id),
                Some(next.key.clone()),
                None,
                instance_payload(&updated, json!({})),
            ))
            .await;
        } else {
            self.enter_step(next, &updated, Some(&step.key)).await;
        }

        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // cancel
    // -----------------------------------------------------------------------

    /// Cancel a running instance. A no-op (not an error) when the instance
    /// is already terminal; a cancel racing a completion loses cleanly.
    #[instrument(skip(self, reason), fields(instance_id = %instance_id))]
    pub async fn cancel(
        &self,
        instance_id: Uuid,
        actor: Option<&Actor>,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        match self
            .store
            .commit_cancel(instance_id, reason.clone(), Utc::now())
            .await
        {
            Ok(Some(updated)) => {
                info!("process instance canceled");
                self.emit(DomainEvent::new(
                    EventType::InstanceCanceled,
                    Some(instance_id),
                    None,
                    actor.map(|a| a.id.clone()),
                    instance_payload(&updated, json!({ "reason": reason })),
                ))
                .await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(storage_error(e, instance_id)),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn instance(&self, id: Uuid) -> Result<ProcessInstance, EngineError> {
        self.store.get(id).await.map_err(|e| storage_error(e, id))
    }

    /// The legal decisions at the instance's current step; empty unless the
    /// instance is running and sitting on a gateway.
    pub async fn list_candidates(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<DecisionCandidate>, EngineError> {
        let instance = self.instance(instance_id).await?;
        if instance.status.is_terminal() {
            return Ok(Vec::new());
        }
        let Some(current) = instance.current_step_key.as_deref() else {
            return Ok(Vec::new());
        };
        let definition = self
            .registry
            .version(&instance.definition_key, instance.definition_version)?;
        Ok(definition
            .step(current)
            .filter(|s| s.is_gateway())
            .map(|s| gateway::candidates(&definition, s))
            .unwrap_or_default())
    }

    pub async fn timeline(&self, instance_id: Uuid) -> Result<Timeline, EngineError> {
        let instance = self.instance(instance_id).await?;
        let steps = self
            .store
            .step_history(instance_id)
            .await
            .map_err(|e| storage_error(e, instance_id))?;
        let events = self
            .log
            .list_by_instance(instance_id)
            .await
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        Ok(Timeline { instance, steps, events })
    }

    // -----------------------------------------------------------------------
    // External events (SLA scanner et al.)
    // -----------------------------------------------------------------------

    /// Record a synthetic event injected by an external collaborator (e.g.
    /// the periodic SLA scan) and fan it out like any internal emission.
    pub async fn raise_event(
        &self,
        event_type: EventType,
        instance_id: Uuid,
        step_key: Option<String>,
        payload: Value,
    ) -> Result<(), EngineError> {
        let instance = self.instance(instance_id).await?;
        let definition = self
            .registry
            .version(&instance.definition_key, instance.definition_version)?;

        // Enrich with step fields so lane filters and templates keep working.
        let payload = match step_key.as_deref().and_then(|k| definition.step(k)) {
            Some(step) => step_payload(step, &instance, &payload),
            None => payload,
        };

        self.emit(DomainEvent::new(
            event_type,
            Some(instance_id),
            step_key,
            None,
            payload,
        ))
        .await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal: event emission and automation fan-out
    // -----------------------------------------------------------------------

    async fn emit(&self, event: DomainEvent) {
        // The transition is already committed; a log failure must not undo
        // the caller's work, so it is reported and swallowed.
        if let Err(err) = self.log.append(event.clone()).await {
            error!(%err, event_type = %event.event_type, "failed to append domain event");
        }

        let results = self.rules.on_event(&event).await;
        self.record_outcomes(&event, &results).await;
    }

    async fn record_outcomes(&self, event: &DomainEvent, results: &[ActionResult]) {
        for result in results {
            let event_type = if result.ok {
                EventType::AutomationExecuted
            } else {
                EventType::AutomationFailed
            };
            let outcome = DomainEvent::new(
                event_type,
                event.instance_id,
                event.step_key.clone(),
                None,
                json!({
                    "ruleId": result.rule_id,
                    "ruleName": result.rule_name,
                    "action": result.action.to_string(),
                    "trigger": event.event_type.to_string(),
                    "ok": result.ok,
                    "error": result.error,
                    "details": result.details,
                }),
            );
            if let Err(err) = self.log.append(outcome).await {
                error!(%err, "failed to append automation outcome event");
            }
        }
    }

    /// Emit `step.entered` and run the step-level automation, if any.
    async fn enter_step(&self, step: &Step, instance: &ProcessInstance, previous_step: Option<&str>) {
        let mut payload = step_payload(step, instance, &Value::Null);
        if let (Value::Object(fields), Some(prev)) = (&mut payload, previous_step) {
            fields.insert("previousStepKey".into(), json!(prev));
        }

        self.emit(DomainEvent::new(
            EventType::StepEntered,
            Some(instance.id),
            Some(step.key.clone()),
            None,
            payload.clone(),
        ))
        .await;

        let Some(auto) = &step.automation else { return };
        let config = template::render_config(&auto.config, &payload);
        let (event_type, outcome_payload) =
            match self.rules.dispatcher().execute(auto.action, &config, &payload).await {
                Ok(details) => (
                    EventType::AutomationExecuted,
                    json!({
                        "action": auto.action.to_string(),
                        "stepKey": step.key,
                        "ok": true,
                        "details": details,
                    }),
                ),
                Err(err) => {
                    warn!(step = %step.key, action = %auto.action, %err, "step automation failed");
                    (
                        EventType::AutomationFailed,
                        json!({
                            "action": auto.action.to_string(),
                            "stepKey": step.key,
                            "ok": false,
                            "error": err.to_string(),
                        }),
                    )
                }
            };
        if let Err(err) = self
            .log
            .append(DomainEvent::new(
                event_type,
                Some(instance.id),
                Some(step.key.clone()),
                None,
                outcome_payload,
            ))
            .await
        {
            error!(%err, "failed to append step automation outcome");
        }
    }

    /// Turn a commit conflict into the error the caller should see: the
    /// instance either left the running state or advanced under our feet.
    async fn conflict_to_error(&self, instance_id: Uuid, requested: &str) -> EngineError {
        match self.store.get(instance_id).await {
            Ok(instance) if instance.status.is_terminal() => {
                EngineError::InvalidState(format!("instance is {}", instance.status))
            }
            Ok(instance) => EngineError::StepMismatch {
                requested: requested.to_string(),
                current: instance.current_step_key.unwrap_or_default(),
            },
            Err(_) => EngineError::StepMismatch {
                requested: requested.to_string(),
                current: String::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn authorize(step: &Step, lane: Option<&Lane>, actor: &Actor) -> Result<(), EngineError> {
    let Some(required) = step.participant_role.as_deref() else {
        return Ok(());
    };
    let role = actor.role.as_str();
    let automation_lane = lane.is_some_and(Lane::is_automation);
    let allowed = role.eq_ignore_ascii_case(required)
        || role.eq_ignore_ascii_case(ROLE_ADMIN)
        || (automation_lane && role.eq_ignore_ascii_case(ROLE_PM));

    if allowed {
        Ok(())
    } else {
        Err(EngineError::Unauthorized {
            role: role.to_string(),
            step: step.key.clone(),
        })
    }
}

/// Payload for step-scoped events: instance context first, then the step's
/// output, with the well-known fields layered on top so filters and
/// templates always see the true `stepKey`/`lane`.
fn step_payload(step: &Step, instance: &ProcessInstance, extra: &Value) -> Value {
    let mut fields = serde_json::Map::new();
    if let Some(ctx) = instance.context.as_object() {
        fields.extend(ctx.clone());
    }
    if let Some(out) = extra.as_object() {
        fields.extend(out.clone());
    }
    fields.insert("instanceId".into(), json!(instance.id));
    fields.insert("definitionKey".into(), json!(instance.definition_key));
    fields.insert("stepKey".into(), json!(step.key));
    fields.insert("stepTitle".into(), json!(step.title));
    fields.insert("lane".into(), json!(step.lane));
    Value::Object(fields)
}

/// Payload for instance-scoped events.
fn instance_payload(instance: &ProcessInstance, extra: Value) -> Value {
    let mut fields = serde_json::Map::new();
    if let Some(ctx) = instance.context.as_object() {
        fields.extend(ctx.clone());
    }
    if let Some(out) = extra.as_object() {
        fields.extend(out.clone());
    }
    fields.insert("instanceId".into(), json!(instance.id));
    fields.insert("definitionKey".into(), json!(instance.definition_key));
    fields.insert("status".into(), json!(instance.status.to_string()));
    Value::Object(fields)
}

/// Each completed step's output folds into the instance context, so later
/// conditions and templates can see everything gathered so far.
fn merge_context(context: &Value, output: &Value) -> Value {
    match (context, output) {
        (Value::Object(ctx), Value::Object(out)) => {
            let mut merged = ctx.clone();
            merged.extend(out.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(merged)
        }
        (Value::Null, Value::Object(_)) => output.clone(),
        _ => context.clone(),
    }
}

fn storage_error(err: StoreError, instance_id: Uuid) -> EngineError {
    match err {
        StoreError::NotFound => EngineError::NotFound(format!("process instance {instance_id}")),
        StoreError::Conflict => EngineError::InvalidState("instance changed concurrently".into()),
        StoreError::Storage(msg) => EngineError::Storage(msg),
    }
}
