//! Automation-level error types.

use thiserror::Error;

/// Error returned by an action dispatcher.
///
/// The contract is "return ok/error, never panic": a failed action is
/// recorded against its rule and never aborts the evaluation of the
/// remaining rules, nor the step transition that triggered it.
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(String),
}

/// Errors from the rule store.
#[derive(Debug, Error)]
pub enum RuleError {
    /// No rule with the requested id.
    #[error("rule not found")]
    NotFound,

    /// System rules may be disabled but never deleted.
    #[error("system rules cannot be deleted")]
    Forbidden,

    #[error("rule storage error: {0}")]
    Storage(String),
}
