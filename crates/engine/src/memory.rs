//! In-memory `InstanceStore`.
//!
//! One mutex over the whole map gives per-instance atomicity for free; the
//! compare-and-swap semantics are identical to the Postgres-backed store in
//! the `db` crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{InstanceStatus, ProcessInstance, StepInstance, StepInstanceStatus};
use crate::store::{Advance, CloseStep, InstanceStore, StoreError};

struct Record {
    instance: ProcessInstance,
    steps: Vec<StepInstance>,
}

#[derive(Default)]
pub struct MemoryInstanceStore {
    records: Mutex<HashMap<Uuid, Record>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self { records: Mutex::new(HashMap::new()) }
    }
}

fn lock_poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("instance store lock poisoned".into())
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn insert(
        &self,
        instance: ProcessInstance,
        first_step: Option<StepInstance>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().map_err(lock_poisoned)?;
        let steps = first_step.into_iter().collect();
        records.insert(instance.id, Record { instance, steps });
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ProcessInstance, StoreError> {
        let records = self.records.lock().map_err(lock_poisoned)?;
        records
            .get(&id)
            .map(|r| r.instance.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn step_history(&self, id: Uuid) -> Result<Vec<StepInstance>, StoreError> {
        let records = self.records.lock().map_err(lock_poisoned)?;
        records
            .get(&id)
            .map(|r| r.steps.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn commit_transition(
        &self,
        instance_id: Uuid,
        expected_step: &str,
        close: CloseStep,
        advance: Advance,
        context: Value,
    ) -> Result<ProcessInstance, StoreError> {
        let mut records = self.records.lock().map_err(lock_poisoned)?;
        let record = records.get_mut(&instance_id).ok_or(StoreError::NotFound)?;

        // The optimistic-concurrency guard.
        if record.instance.status != InstanceStatus::Running
            || record.instance.current_step_key.as_deref() != Some(expected_step)
        {
            return Err(StoreError::Conflict);
        }

        // Close the open row for the expected step (newest first, so loops
        // close their latest re-entry).
        if let Some(open) = record
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.step_key == expected_step && s.status == StepInstanceStatus::InProgress)
        {
            open.status = close.status;
            open.completed_at = Some(close.at);
            open.output_data = close.output_data;
        }

        record.instance.context = context;
        match advance {
            Advance::To(next) => {
                record.instance.current_step_key = Some(next.step_key.clone());
                record.steps.push(next);
            }
            Advance::Finish { status, ended_at } => {
                record.instance.status = status;
                record.instance.current_step_key = None;
                record.instance.ended_at = Some(ended_at);
            }
        }

        Ok(record.instance.clone())
    }

    async fn commit_cancel(
        &self,
        instance_id: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<ProcessInstance>, StoreError> {
        let mut records = self.records.lock().map_err(lock_poisoned)?;
        let record = records.get_mut(&instance_id).ok_or(StoreError::NotFound)?;

        if record.instance.status.is_terminal() {
            return Ok(None);
        }

        record.instance.status = InstanceStatus::Canceled;
        record.instance.current_step_key = None;
        record.instance.ended_at = Some(at);
        record.instance.canceled_reason = reason;

        for step in &mut record.steps {
            if step.status == StepInstanceStatus::InProgress {
                step.status = StepInstanceStatus::Skipped;
                step.completed_at = Some(at);
            }
        }

        Ok(Some(record.instance.clone()))
    }
}
