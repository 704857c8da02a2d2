//! Gateway decision resolution.
//!
//! A thin validator between a human/automated choice and the gateway's
//! outgoing branches, exposed separately so callers can preview the legal
//! decisions without side effects.

use crate::models::{DecisionCandidate, ProcessDefinition, Step};
use crate::EngineError;

/// Resolve a candidate decision against a gateway step's branches.
///
/// # Errors
/// [`EngineError::InvalidDecision`] when the decision is absent or not a
/// member of `next_step_keys`.
pub fn resolve<'a>(step: &'a Step, decision: Option<&str>) -> Result<&'a str, EngineError> {
    let decision = decision.ok_or_else(|| EngineError::InvalidDecision {
        step: step.key.clone(),
        decision: "(none)".into(),
    })?;

    step.next_step_keys
        .iter()
        .find(|key| key.as_str() == decision)
        .map(String::as_str)
        .ok_or_else(|| EngineError::InvalidDecision {
            step: step.key.clone(),
            decision: decision.to_string(),
        })
}

/// The legal decisions of a gateway step, with their target titles.
pub fn candidates(definition: &ProcessDefinition, step: &Step) -> Vec<DecisionCandidate> {
    step.next_step_keys
        .iter()
        .map(|key| DecisionCandidate {
            key: key.clone(),
            title: definition
                .step(key)
                .map(|s| s.title.clone())
                .unwrap_or_else(|| key.clone()),
        })
        .collect()
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepType;

    fn gateway() -> Step {
        Step {
            key: "approval".into(),
            title: "Approval".into(),
            step_type: StepType::Gateway,
            lane: "ops".into(),
            participant_role: Some("pm".into()),
            automation: None,
            next_step_keys: vec!["approve".into(), "reject".into()],
        }
    }

    #[test]
    fn member_decision_resolves() {
        let step = gateway();
        assert_eq!(resolve(&step, Some("reject")).unwrap(), "reject");
    }

    #[test]
    fn non_member_decision_is_invalid() {
        let step = gateway();
        assert!(matches!(
            resolve(&step, Some("escalate")),
            Err(EngineError::InvalidDecision { decision, .. }) if decision == "escalate"
        ));
    }

    #[test]
    fn missing_decision_is_invalid() {
        let step = gateway();
        assert!(matches!(
            resolve(&step, None),
            Err(EngineError::InvalidDecision { .. })
        ));
    }
}
