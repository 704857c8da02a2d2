//! Engine-level error types.

use thiserror::Error;

/// Errors rejected at publish time — a broken definition is never
/// activated, not even partially.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// No step of type `start`.
    #[error("definition has no start step")]
    MissingStart,

    /// More than one step of type `start`.
    #[error("definition has more than one start step ('{0}')")]
    MultipleStart(String),

    /// Two or more steps share the same key.
    #[error("duplicate step key: '{0}'")]
    DuplicateStepKey(String),

    /// A step references a lane that is not defined.
    #[error("step '{step}' references unknown lane '{lane}'")]
    UnknownLane { step: String, lane: String },

    /// A `next_step_keys` entry references a step that doesn't exist.
    #[error("step '{from}' references unknown step '{to}'")]
    UnknownStepReference { from: String, to: String },

    /// Wrong number of outgoing branches for the step's type.
    #[error("step '{step}' has {found} outgoing branches, expected {expected}")]
    BranchCount {
        step: String,
        expected: &'static str,
        found: usize,
    },

    /// Task and gateway steps must name a participant role.
    #[error("step '{0}' requires a participant role")]
    MissingParticipantRole(String),

    /// A step cannot be reached from the start step.
    #[error("step '{0}' is not reachable from the start step")]
    UnreachableStep(String),

    /// Following the graph from start never arrives at an end step.
    #[error("no end step is reachable from the start step")]
    NoReachableEnd,
}

/// Runtime errors from the state machine and registry.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown instance, definition or step.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted on a terminal or otherwise unfit instance.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Stale client state — the instance has already advanced. Expected
    /// under concurrent multi-user operation; clients should refresh and
    /// retry.
    #[error("step mismatch: instance is at '{current}', not '{requested}'")]
    StepMismatch { requested: String, current: String },

    /// Role gate failure on a participant-gated step.
    #[error("role '{role}' is not authorized to act on step '{step}'")]
    Unauthorized { role: String, step: String },

    /// Gateway choice missing or not among the step's branches.
    #[error("invalid gateway decision '{decision}' for step '{step}'")]
    InvalidDecision { step: String, decision: String },

    /// Publish-time graph violation.
    #[error(transparent)]
    Validation(#[from] DefinitionError),

    /// Underlying storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}
