//! Postgres-backed implementations of the engine-side storage traits.
//!
//! Thin adapters: each method delegates to a repository function and maps
//! `DbError` onto the trait's error type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use automation::{AutomationRule, RuleDraft, RuleError, RuleStore, RuleUpdate};
use engine::store::{Advance, CloseStep, InstanceStore, StoreError};
use engine::{ProcessInstance, StepInstance};
use events::{DomainEvent, EventLog, EventLogError};

use crate::repository::{events as event_repo, instances as instance_repo, rules as rule_repo};
use crate::{DbError, DbPool};

fn store_error(err: DbError) -> StoreError {
    match err {
        DbError::NotFound => StoreError::NotFound,
        DbError::Conflict => StoreError::Conflict,
        other => StoreError::Storage(other.to_string()),
    }
}

fn rule_error(err: DbError) -> RuleError {
    match err {
        DbError::NotFound => RuleError::NotFound,
        other => RuleError::Storage(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// PgInstanceStore
// ---------------------------------------------------------------------------

pub struct PgInstanceStore {
    pool: DbPool,
}

impl PgInstanceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceStore for PgInstanceStore {
    async fn insert(
        &self,
        instance: ProcessInstance,
        first_step: Option<StepInstance>,
    ) -> Result<(), StoreError> {
        instance_repo::insert_instance(&self.pool, &instance, first_step.as_ref())
            .await
            .map_err(store_error)
    }

    async fn get(&self, id: Uuid) -> Result<ProcessInstance, StoreError> {
        instance_repo::get_instance(&self.pool, id).await.map_err(store_error)
    }

    async fn step_history(&self, id: Uuid) -> Result<Vec<StepInstance>, StoreError> {
        instance_repo::step_history(&self.pool, id).await.map_err(store_error)
    }

    async fn commit_transition(
        &self,
        instance_id: Uuid,
        expected_step: &str,
        close: CloseStep,
        advance: Advance,
        context: Value,
    ) -> Result<ProcessInstance, StoreError> {
        let result = instance_repo::commit_transition(
            &self.pool,
            instance_id,
            expected_step,
            &close,
            &advance,
            &context,
        )
        .await;

        match result {
            Ok(instance) => Ok(instance),
            // The guarded UPDATE matches nothing both for a lost race and
            // for a missing instance; split the two for the caller.
            Err(DbError::Conflict) => {
                match instance_repo::get_instance(&self.pool, instance_id).await {
                    Ok(_) => Err(StoreError::Conflict),
                    Err(DbError::NotFound) => Err(StoreError::NotFound),
                    Err(other) => Err(StoreError::Storage(other.to_string())),
                }
            }
            Err(other) => Err(store_error(other)),
        }
    }

    async fn commit_cancel(
        &self,
        instance_id: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<ProcessInstance>, StoreError> {
        instance_repo::cancel_instance(&self.pool, instance_id, reason.as_deref(), at)
            .await
            .map_err(store_error)
    }
}

// ---------------------------------------------------------------------------
// PgEventLog
// ---------------------------------------------------------------------------

pub struct PgEventLog {
    pool: DbPool,
}

impl PgEventLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, event: DomainEvent) -> Result<i64, EventLogError> {
        event_repo::append_event(&self.pool, &event)
            .await
            .map_err(|e| EventLogError::Storage(e.to_string()))
    }

    async fn list_by_instance(&self, instance_id: Uuid) -> Result<Vec<DomainEvent>, EventLogError> {
        event_repo::list_by_instance(&self.pool, instance_id)
            .await
            .map_err(|e| EventLogError::Storage(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// PgRuleStore
// ---------------------------------------------------------------------------

pub struct PgRuleStore {
    pool: DbPool,
}

impl PgRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    async fn list(&self) -> Result<Vec<AutomationRule>, RuleError> {
        rule_repo::list_rules(&self.pool).await.map_err(rule_error)
    }

    async fn list_enabled(&self) -> Result<Vec<AutomationRule>, RuleError> {
        rule_repo::list_enabled_rules(&self.pool).await.map_err(rule_error)
    }

    async fn get(&self, id: Uuid) -> Result<AutomationRule, RuleError> {
        rule_repo::get_rule(&self.pool, id).await.map_err(rule_error)
    }

    async fn create(&self, draft: RuleDraft) -> Result<AutomationRule, RuleError> {
        rule_repo::insert_rule(&self.pool, &draft).await.map_err(rule_error)
    }

    async fn update(&self, id: Uuid, update: RuleUpdate) -> Result<AutomationRule, RuleError> {
        rule_repo::update_rule(&self.pool, id, &update).await.map_err(rule_error)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RuleError> {
        let rule = self.get(id).await?;
        if rule.is_system {
            return Err(RuleError::Forbidden);
        }
        rule_repo::delete_rule(&self.pool, id).await.map_err(rule_error)
    }
}
