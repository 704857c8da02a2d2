//! `automation` crate — the `ActionDispatcher` trait and the rule engine.
//!
//! Rules bind a trigger (an event kind, optionally narrowed by step keys,
//! lanes and payload conditions) to an action. The engine matches fired
//! events against enabled rules in priority order and dispatches each
//! matching rule's action through [`ActionDispatcher`]. Side effects live
//! behind that trait; the engine only decides *that* and *with what
//! arguments* an action fires.

pub mod action;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod mock;
pub mod rules;
pub mod template;

pub use action::{ActionDispatcher, ActionKind, ActionResult, LoggingDispatcher};
pub use conditions::{Condition, ConditionOp};
pub use engine::RuleEngine;
pub use error::{ActionError, RuleError};
pub use mock::MockDispatcher;
pub use rules::{system_rules, AutomationRule, MemoryRuleStore, RuleDraft, RuleStore, RuleUpdate};
