//! The `ActionDispatcher` trait — the contract every side-effect executor
//! must fulfil.
//!
//! Action kinds are a closed enum mapped to handlers by the dispatcher, so
//! an unknown kind is unrepresentable and exhaustiveness is checked at
//! compile time rather than falling through a string lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ActionError;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// What an automation rule (or a step-level automation) does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    CreateTask,
    UpdateData,
    SendWebhook,
    AssignUser,
    SendNotification,
    ScheduleReminder,
    ExecuteScript,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SendEmail => "send_email",
            Self::CreateTask => "create_task",
            Self::UpdateData => "update_data",
            Self::SendWebhook => "send_webhook",
            Self::AssignUser => "assign_user",
            Self::SendNotification => "send_notification",
            Self::ScheduleReminder => "schedule_reminder",
            Self::ExecuteScript => "execute_script",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send_email" => Ok(Self::SendEmail),
            "create_task" => Ok(Self::CreateTask),
            "update_data" => Ok(Self::UpdateData),
            "send_webhook" => Ok(Self::SendWebhook),
            "assign_user" => Ok(Self::AssignUser),
            "send_notification" => Ok(Self::SendNotification),
            "schedule_reminder" => Ok(Self::ScheduleReminder),
            "execute_script" => Ok(Self::ExecuteScript),
            other => Err(format!("unknown action kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionResult
// ---------------------------------------------------------------------------

/// Outcome of dispatching one rule's action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub action: ActionKind,
    pub ok: bool,
    pub error: Option<String>,
    /// Dispatcher-supplied detail (e.g. the created task id).
    pub details: Option<Value>,
    pub executed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ActionDispatcher
// ---------------------------------------------------------------------------

/// The external executor of automation side effects.
///
/// `config` arrives with `{{placeholder}}` templates already resolved from
/// the event payload. Implementations may retry internally; the engine
/// records exactly one result per invocation.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn execute(
        &self,
        action: ActionKind,
        config: &Value,
        payload: &Value,
    ) -> Result<Value, ActionError>;
}

/// Dispatcher that records actions in the log output and succeeds.
///
/// The default wiring for the server binary: the concrete side-effect
/// integrations (mailer, task tracker, webhook sender) are collaborators
/// plugged in by the host application.
#[derive(Default)]
pub struct LoggingDispatcher;

#[async_trait]
impl ActionDispatcher for LoggingDispatcher {
    async fn execute(
        &self,
        action: ActionKind,
        config: &Value,
        _payload: &Value,
    ) -> Result<Value, ActionError> {
        tracing::info!(%action, %config, "dispatching automation action");
        Ok(Value::Null)
    }
}
