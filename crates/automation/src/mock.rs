//! `MockDispatcher` — a test double for `ActionDispatcher`.
//!
//! Records every dispatched action in call order and returns a
//! programmer-specified result, so tests can assert on ordering and
//! partial-failure isolation without real side effects.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{ActionDispatcher, ActionError, ActionKind};

/// Behaviour injected into `MockDispatcher` at construction time.
pub enum MockBehaviour {
    /// Every action succeeds.
    Succeed,
    /// Every action fails with the given message.
    Fail(String),
    /// Actions of this kind fail; everything else succeeds.
    FailFor(ActionKind, String),
}

/// One recorded dispatch.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub action: ActionKind,
    pub config: Value,
    pub payload: Value,
}

pub struct MockDispatcher {
    behaviour: MockBehaviour,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockDispatcher {
    /// Create a mock where every action succeeds.
    pub fn succeeding() -> Self {
        Self {
            behaviour: MockBehaviour::Succeed,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock where every action fails.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::Fail(msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock where only actions of `kind` fail.
    pub fn failing_for(kind: ActionKind, msg: impl Into<String>) -> Self {
        Self {
            behaviour: MockBehaviour::FailFor(kind, msg.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of dispatches seen so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All dispatches, in call order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Just the action kinds, in call order.
    pub fn kinds(&self) -> Vec<ActionKind> {
        self.calls.lock().unwrap().iter().map(|c| c.action).collect()
    }
}

#[async_trait]
impl ActionDispatcher for MockDispatcher {
    async fn execute(
        &self,
        action: ActionKind,
        config: &Value,
        payload: &Value,
    ) -> Result<Value, ActionError> {
        self.calls.lock().unwrap().push(RecordedCall {
            action,
            config: config.clone(),
            payload: payload.clone(),
        });

        match &self.behaviour {
            MockBehaviour::Succeed => Ok(json!({ "dispatched": action.to_string() })),
            MockBehaviour::Fail(msg) => Err(ActionError::Failed(msg.clone())),
            MockBehaviour::FailFor(kind, msg) if *kind == action => {
                Err(ActionError::Failed(msg.clone()))
            }
            MockBehaviour::FailFor(..) => Ok(json!({ "dispatched": action.to_string() })),
        }
    }
}
