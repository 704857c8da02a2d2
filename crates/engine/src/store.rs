//! The `InstanceStore` trait — storage seam of the state machine.
//!
//! The machine is the single writer of a given instance; the store enforces
//! that with an optimistic-concurrency check: `commit_transition` succeeds
//! only while the instance is still `running` *and* its `current_step_key`
//! equals the step the caller saw. The loser of a race gets
//! [`StoreError::Conflict`] and no partial application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InstanceStatus, ProcessInstance, StepInstance, StepInstanceStatus};

/// Errors from instance storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance not found")]
    NotFound,

    /// The compare-and-swap guard failed: the instance advanced or left the
    /// running state between read and commit.
    #[error("concurrent update conflict")]
    Conflict,

    #[error("instance storage error: {0}")]
    Storage(String),
}

/// How the current step instance is closed by a transition.
#[derive(Debug, Clone)]
pub struct CloseStep {
    /// `Completed` for a normal completion, `Skipped` for an admin skip.
    pub status: StepInstanceStatus,
    pub output_data: Value,
    pub at: DateTime<Utc>,
}

/// Where the instance goes after the current step is closed.
#[derive(Debug, Clone)]
pub enum Advance {
    /// Move to a new current step (row created `in_progress`).
    To(StepInstance),
    /// The resolved successor is an end step: the instance terminates.
    Finish {
        status: InstanceStatus,
        ended_at: DateTime<Utc>,
    },
}

/// Storage for process instances and their step history.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Persist a freshly started instance together with its first step row
    /// (absent when the instance completed immediately).
    async fn insert(
        &self,
        instance: ProcessInstance,
        first_step: Option<StepInstance>,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<ProcessInstance, StoreError>;

    /// Step rows for one instance, oldest first.
    async fn step_history(&self, id: Uuid) -> Result<Vec<StepInstance>, StoreError>;

    /// Atomically close the current step and advance (or finish) the
    /// instance, replacing its context with `context`.
    ///
    /// # Errors
    /// [`StoreError::Conflict`] when the instance is not running or its
    /// current step is no longer `expected_step`.
    async fn commit_transition(
        &self,
        instance_id: Uuid,
        expected_step: &str,
        close: CloseStep,
        advance: Advance,
        context: Value,
    ) -> Result<ProcessInstance, StoreError>;

    /// Move a running instance to `canceled`, closing its open step row as
    /// `skipped`. Returns `None` when the instance is already terminal (the
    /// caller treats that as an idempotent no-op).
    async fn commit_cancel(
        &self,
        instance_id: Uuid,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<ProcessInstance>, StoreError>;
}
