//! The built-in client-onboarding process definition.
//!
//! Seeded on first run so a fresh deployment has a working process; admins
//! publish their own definitions alongside it.

use serde_json::json;

use automation::ActionKind;

use crate::models::{Lane, ProcessDefinition, Step, StepAutomation, StepType};

fn lane(key: &str, display_name: &str, participant_role: &str) -> Lane {
    Lane {
        key: key.into(),
        display_name: display_name.into(),
        participant_role: participant_role.into(),
    }
}

#[allow(clippy::too_many_arguments)]
fn step(
    key: &str,
    title: &str,
    step_type: StepType,
    lane: &str,
    participant_role: Option<&str>,
    automation: Option<StepAutomation>,
    next: &[&str],
) -> Step {
    Step {
        key: key.into(),
        title: title.into(),
        step_type,
        lane: lane.into(),
        participant_role: participant_role.map(Into::into),
        automation,
        next_step_keys: next.iter().map(|s| s.to_string()).collect(),
    }
}

/// Client onboarding: request intake → review → approval gateway →
/// project setup → kickoff, with a rejection path back to the client.
pub fn client_onboarding() -> ProcessDefinition {
    ProcessDefinition {
        key: "client_onboarding".into(),
        name: "Client Onboarding".into(),
        description: "From a submitted project request to a kicked-off project".into(),
        version: 0,
        lanes: vec![
            lane("client", "Client", "client"),
            lane("sales", "Business Development", "bd"),
            lane("auto", "Automation & CRM", "automation"),
            lane("mgmt", "Project Management", "pm"),
        ],
        steps: vec![
            step(
                "request_received",
                "Project request received",
                StepType::Start,
                "client",
                None,
                None,
                &["record_request"],
            ),
            step(
                "record_request",
                "Record request in CRM",
                StepType::Task,
                "auto",
                Some("automation"),
                Some(StepAutomation {
                    action: ActionKind::UpdateData,
                    config: json!({ "entity": "lead", "patch": { "status": "in_review" } }),
                }),
                &["review_request"],
            ),
            step(
                "review_request",
                "Review project request",
                StepType::Task,
                "mgmt",
                Some("pm"),
                None,
                &["approval_gateway"],
            ),
            step(
                "approval_gateway",
                "Approve project?",
                StepType::Gateway,
                "mgmt",
                Some("pm"),
                None,
                &["setup_project", "send_rejection"],
            ),
            step(
                "setup_project",
                "Create project workspace",
                StepType::Task,
                "auto",
                Some("automation"),
                Some(StepAutomation {
                    action: ActionKind::CreateTask,
                    config: json!({
                        "title": "Prepare workspace for {{leadName}}",
                        "priority": "high",
                        "assign_to": "pm",
                    }),
                }),
                &["assign_team"],
            ),
            step(
                "assign_team",
                "Assign project team",
                StepType::Task,
                "mgmt",
                Some("pm"),
                None,
                &["kickoff"],
            ),
            step(
                "kickoff",
                "Hold kickoff meeting",
                StepType::Task,
                "mgmt",
                Some("pm"),
                Some(StepAutomation {
                    action: ActionKind::ScheduleReminder,
                    config: json!({ "delay_minutes": 1440, "message": "Kickoff follow-up for {{leadName}}" }),
                }),
                &["onboarded"],
            ),
            step(
                "send_rejection",
                "Send rejection notice",
                StepType::Task,
                "auto",
                Some("automation"),
                Some(StepAutomation {
                    action: ActionKind::SendEmail,
                    config: json!({
                        "to": "{{leadEmail}}",
                        "subject": "Update on your project request",
                    }),
                }),
                &["rejected"],
            ),
            step("onboarded", "Client onboarded", StepType::End, "mgmt", None, None, &[]),
            step("rejected", "Request declined", StepType::End, "client", None, None, &[]),
        ],
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;

    #[test]
    fn built_in_definition_passes_validation() {
        graph::validate(&client_onboarding()).expect("seed definition must be valid");
    }
}
