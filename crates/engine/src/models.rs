//! Core domain models for the process engine.
//!
//! These types are the source of truth for what a process definition and a
//! running instance look like in memory. They serialise to/from the JSONB
//! columns of the `process_definitions` and `process_instances` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use automation::ActionKind;

/// Role that overrides every step-level participant gate.
pub const ROLE_ADMIN: &str = "admin";

/// Role additionally permitted on automation-lane steps.
pub const ROLE_PM: &str = "pm";

/// A lane whose participant role equals this marker is the automation lane.
pub const AUTOMATION_LANE_ROLE: &str = "automation";

// ---------------------------------------------------------------------------
// Lane
// ---------------------------------------------------------------------------

/// A swim-lane grouping steps by responsible participant role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lane {
    pub key: String,
    pub display_name: String,
    pub participant_role: String,
}

impl Lane {
    pub fn is_automation(&self) -> bool {
        self.participant_role.eq_ignore_ascii_case(AUTOMATION_LANE_ROLE)
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Kind of a node in a process definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Start,
    Task,
    Gateway,
    End,
}

/// Action dispatched when a step is entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAutomation {
    pub action: ActionKind,
    #[serde(default)]
    pub config: Value,
}

/// A single node in the process graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the definition; referenced by `next_step_keys`.
    pub key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Key of the lane this step belongs to.
    pub lane: String,
    /// Required for task and gateway steps.
    #[serde(default)]
    pub participant_role: Option<String>,
    /// Optional action fired when the step becomes current.
    #[serde(default)]
    pub automation: Option<StepAutomation>,
    /// Exactly one entry for start/task, at least two for gateway, empty
    /// for end.
    #[serde(default)]
    pub next_step_keys: Vec<String>,
}

impl Step {
    pub fn is_gateway(&self) -> bool {
        self.step_type == StepType::Gateway
    }

    pub fn is_end(&self) -> bool {
        self.step_type == StepType::End
    }
}

// ---------------------------------------------------------------------------
// ProcessDefinition
// ---------------------------------------------------------------------------

/// A complete, versioned process definition. Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Assigned by the registry at publish time.
    #[serde(default)]
    pub version: i32,
    pub lanes: Vec<Lane>,
    pub steps: Vec<Step>,
}

impl ProcessDefinition {
    pub fn step(&self, key: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.key == key)
    }

    pub fn lane(&self, key: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.key == key)
    }

    pub fn start_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_type == StepType::Start)
    }
}

// ---------------------------------------------------------------------------
// ProcessInstance
// ---------------------------------------------------------------------------

/// Lifecycle status of a process instance. `Running` is the only
/// non-terminal status; transitions out of it are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Completed,
    Canceled,
    Errored,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "canceled" => Ok(Self::Canceled),
            "errored" => Ok(Self::Errored),
            other => Err(format!("unknown instance status: {other}")),
        }
    }
}

/// One running (or finished) execution of a process definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: Uuid,
    pub definition_key: String,
    /// Version pinned at `start`; later publishes never affect this instance.
    pub definition_version: i32,
    pub status: InstanceStatus,
    /// `None` exactly when the instance is no longer running.
    pub current_step_key: Option<String>,
    /// Opaque business context, merged with each completed step's output.
    pub context: Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub canceled_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// StepInstance
// ---------------------------------------------------------------------------

/// Status of one step's execution within one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepInstanceStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl std::fmt::Display for StepInstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for StepInstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown step instance status: {other}")),
        }
    }
}

/// The record of one step's execution. A new row is appended each time a
/// step becomes current; completed rows are never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInstance {
    pub id: Uuid,
    pub process_instance_id: Uuid,
    pub step_key: String,
    pub status: StepInstanceStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Key/value map supplied by the completer.
    pub output_data: Value,
}

impl StepInstance {
    /// The row created the moment a step becomes current.
    pub fn in_progress(process_instance_id: Uuid, step_key: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            process_instance_id,
            step_key: step_key.to_string(),
            status: StepInstanceStatus::InProgress,
            started_at: at,
            completed_at: None,
            output_data: Value::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor & DecisionCandidate
// ---------------------------------------------------------------------------

/// The authenticated caller, as supplied by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self { id: id.into(), role: role.into() }
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ROLE_ADMIN)
    }
}

/// One legal gateway decision, for presenting choices to an operator.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionCandidate {
    pub key: String,
    pub title: String,
}
