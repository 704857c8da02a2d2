//! Step-graph validation — run this before publishing a definition.
//!
//! Rules enforced:
//! 1. Exactly one `start` step.
//! 2. Step keys must be unique within the definition.
//! 3. Every step must belong to a defined lane.
//! 4. Every `next_step_keys` entry must reference an existing step.
//! 5. Branch cardinality per step type: one successor for start/task,
//!    two or more for gateway, none for end.
//! 6. Task and gateway steps must name a participant role.
//! 7. Every step must be reachable from the start step, and at least one
//!    end step must be reachable.
//!
//! Back-edges are legal: a later step may point at an earlier one, which
//! simply re-opens that step at runtime.

use std::collections::{HashSet, VecDeque};

use crate::models::{ProcessDefinition, StepType};
use crate::DefinitionError;

/// Validate the definition's step graph.
///
/// # Errors
/// The first violated rule, as a [`DefinitionError`].
pub fn validate(definition: &ProcessDefinition) -> Result<(), DefinitionError> {
    // -----------------------------------------------------------------------
    // 1. Exactly one start step
    // -----------------------------------------------------------------------
    let mut start_key: Option<&str> = None;
    for step in &definition.steps {
        if step.step_type == StepType::Start {
            if start_key.is_some() {
                return Err(DefinitionError::MultipleStart(step.key.clone()));
            }
            start_key = Some(step.key.as_str());
        }
    }
    let start_key = start_key.ok_or(DefinitionError::MissingStart)?;

    // -----------------------------------------------------------------------
    // 2. Step keys are unique
    // -----------------------------------------------------------------------
    let mut seen_keys: HashSet<&str> = HashSet::new();
    for step in &definition.steps {
        if !seen_keys.insert(step.key.as_str()) {
            return Err(DefinitionError::DuplicateStepKey(step.key.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 3. Lane references resolve
    // -----------------------------------------------------------------------
    let lane_set: HashSet<&str> = definition.lanes.iter().map(|l| l.key.as_str()).collect();
    for step in &definition.steps {
        if !lane_set.contains(step.lane.as_str()) {
            return Err(DefinitionError::UnknownLane {
                step: step.key.clone(),
                lane: step.lane.clone(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // 4. Successor references resolve
    // -----------------------------------------------------------------------
    for step in &definition.steps {
        for next in &step.next_step_keys {
            if !seen_keys.contains(next.as_str()) {
                return Err(DefinitionError::UnknownStepReference {
                    from: step.key.clone(),
                    to: next.clone(),
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 5. Branch cardinality + 6. participant roles
    // -----------------------------------------------------------------------
    for step in &definition.steps {
        let found = step.next_step_keys.len();
        match step.step_type {
            StepType::Start | StepType::Task if found != 1 => {
                return Err(DefinitionError::BranchCount {
                    step: step.key.clone(),
                    expected: "exactly 1",
                    found,
                });
            }
            StepType::Gateway if found < 2 => {
                return Err(DefinitionError::BranchCount {
                    step: step.key.clone(),
                    expected: "at least 2",
                    found,
                });
            }
            StepType::End if found != 0 => {
                return Err(DefinitionError::BranchCount {
                    step: step.key.clone(),
                    expected: "none",
                    found,
                });
            }
            _ => {}
        }

        let needs_role = matches!(step.step_type, StepType::Task | StepType::Gateway);
        if needs_role && step.participant_role.as_deref().map_or(true, str::is_empty) {
            return Err(DefinitionError::MissingParticipantRole(step.key.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 7. Reachability from start (BFS; cycles are fine)
    // -----------------------------------------------------------------------
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    reachable.insert(start_key);
    queue.push_back(start_key);

    while let Some(key) = queue.pop_front() {
        // Key came out of the definition, so the lookup always succeeds.
        if let Some(step) = definition.step(key) {
            for next in &step.next_step_keys {
                if reachable.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }
    }

    for step in &definition.steps {
        if !reachable.contains(step.key.as_str()) {
            return Err(DefinitionError::UnreachableStep(step.key.clone()));
        }
    }

    let end_reachable = definition
        .steps
        .iter()
        .any(|s| s.step_type == StepType::End && reachable.contains(s.key.as_str()));
    if !end_reachable {
        return Err(DefinitionError::NoReachableEnd);
    }

    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Lane, Step};

    fn lane(key: &str, role: &str) -> Lane {
        Lane {
            key: key.into(),
            display_name: key.into(),
            participant_role: role.into(),
        }
    }

    fn step(key: &str, step_type: StepType, next: &[&str]) -> Step {
        let participant_role = matches!(step_type, StepType::Task | StepType::Gateway)
            .then(|| "pm".to_string());
        Step {
            key: key.into(),
            title: key.into(),
            step_type,
            lane: "ops".into(),
            participant_role,
            automation: None,
            next_step_keys: next.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn definition(steps: Vec<Step>) -> ProcessDefinition {
        ProcessDefinition {
            key: "test".into(),
            name: "test".into(),
            description: String::new(),
            version: 0,
            lanes: vec![lane("ops", "pm")],
            steps,
        }
    }

    #[test]
    fn linear_definition_is_valid() {
        let def = definition(vec![
            step("begin", StepType::Start, &["work"]),
            step("work", StepType::Task, &["done"]),
            step("done", StepType::End, &[]),
        ]);
        assert!(validate(&def).is_ok());
    }

    #[test]
    fn gateway_definition_is_valid() {
        let def = definition(vec![
            step("begin", StepType::Start, &["decide"]),
            step("decide", StepType::Gateway, &["yes", "no"]),
            step("yes", StepType::End, &[]),
            step("no", StepType::End, &[]),
        ]);
        assert!(validate(&def).is_ok());
    }

    #[test]
    fn loop_back_edges_are_permitted() {
        // work → review → (rework → work) | done
        let def = definition(vec![
            step("begin", StepType::Start, &["work"]),
            step("work", StepType::Task, &["review"]),
            step("review", StepType::Gateway, &["rework", "done"]),
            step("rework", StepType::Task, &["work"]), // back-edge
            step("done", StepType::End, &[]),
        ]);
        assert!(validate(&def).is_ok());
    }

    #[test]
    fn missing_start_is_rejected() {
        let def = definition(vec![
            step("work", StepType::Task, &["done"]),
            step("done", StepType::End, &[]),
        ]);
        assert_eq!(validate(&def), Err(DefinitionError::MissingStart));
    }

    #[test]
    fn duplicate_step_key_is_rejected() {
        let def = definition(vec![
            step("begin", StepType::Start, &["work"]),
            step("work", StepType::Task, &["done"]),
            step("work", StepType::Task, &["done"]), // duplicate!
            step("done", StepType::End, &[]),
        ]);
        assert_eq!(
            validate(&def),
            Err(DefinitionError::DuplicateStepKey("work".into()))
        );
    }

    #[test]
    fn dangling_successor_is_rejected() {
        let def = definition(vec![
            step("begin", StepType::Start, &["ghost"]), // ghost doesn't exist
            step("done", StepType::End, &[]),
        ]);
        assert!(matches!(
            validate(&def),
            Err(DefinitionError::UnknownStepReference { to, .. }) if to == "ghost"
        ));
    }

    #[test]
    fn unknown_lane_is_rejected() {
        let mut bad = step("work", StepType::Task, &["done"]);
        bad.lane = "nowhere".into();
        let def = definition(vec![
            step("begin", StepType::Start, &["work"]),
            bad,
            step("done", StepType::End, &[]),
        ]);
        assert!(matches!(
            validate(&def),
            Err(DefinitionError::UnknownLane { lane, .. }) if lane == "nowhere"
        ));
    }

    #[test]
    fn single_branch_gateway_is_rejected() {
        let def = definition(vec![
            step("begin", StepType::Start, &["decide"]),
            step("decide", StepType::Gateway, &["done"]), // only one branch
            step("done", StepType::End, &[]),
        ]);
        assert!(matches!(
            validate(&def),
            Err(DefinitionError::BranchCount { step, .. }) if step == "decide"
        ));
    }

    #[test]
    fn task_without_role_is_rejected() {
        let mut bad = step("work", StepType::Task, &["done"]);
        bad.participant_role = None;
        let def = definition(vec![
            step("begin", StepType::Start, &["work"]),
            bad,
            step("done", StepType::End, &[]),
        ]);
        assert_eq!(
            validate(&def),
            Err(DefinitionError::MissingParticipantRole("work".into()))
        );
    }

    #[test]
    fn orphan_step_is_rejected() {
        let def = definition(vec![
            step("begin", StepType::Start, &["done"]),
            step("island", StepType::Task, &["done"]), // nothing points here
            step("done", StepType::End, &[]),
        ]);
        assert_eq!(
            validate(&def),
            Err(DefinitionError::UnreachableStep("island".into()))
        );
    }

    #[test]
    fn graph_without_reachable_end_is_rejected() {
        // begin → a → b → a … the walk never arrives at an end step
        let def = definition(vec![
            step("begin", StepType::Start, &["a"]),
            step("a", StepType::Task, &["b"]),
            step("b", StepType::Task, &["a"]),
        ]);
        assert_eq!(validate(&def), Err(DefinitionError::NoReachableEnd));
    }
}
