//! Condition evaluation — the predicate grammar of automation rules.
//!
//! A condition compares one top-level field of the event payload against a
//! literal. All conditions of a rule must hold for the rule to match.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotEmpty,
    IsEmpty,
}

/// One predicate over the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOp,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Evaluate a conjunction of conditions against an event payload.
///
/// An empty (or absent) condition list always matches.
pub fn evaluate(conditions: &[Condition], payload: &Value) -> bool {
    conditions.iter().all(|c| evaluate_one(c, payload))
}

fn evaluate_one(condition: &Condition, payload: &Value) -> bool {
    let field_value = payload.get(&condition.field);
    let expected = condition.value.as_ref();

    match condition.operator {
        ConditionOp::Equals => field_value == expected,
        ConditionOp::NotEquals => field_value != expected,
        ConditionOp::GreaterThan => match (field_value.and_then(as_number), expected.and_then(as_number)) {
            (Some(actual), Some(limit)) => actual > limit,
            _ => false,
        },
        ConditionOp::LessThan => match (field_value.and_then(as_number), expected.and_then(as_number)) {
            (Some(actual), Some(limit)) => actual < limit,
            _ => false,
        },
        ConditionOp::Contains => match (field_value, expected) {
            (Some(Value::String(s)), Some(Value::String(needle))) => s.contains(needle),
            (Some(Value::Array(items)), Some(needle)) => items.contains(needle),
            _ => false,
        },
        ConditionOp::NotEmpty => !is_empty(field_value),
        ConditionOp::IsEmpty => is_empty(field_value),
    }
}

/// Numeric coercion: JSON numbers directly, numeric strings parsed.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(_) => false,
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(field: &str, operator: ConditionOp, value: Option<Value>) -> Condition {
        Condition { field: field.into(), operator, value }
    }

    #[test]
    fn equals_and_not_equals() {
        let payload = json!({ "status": "approved" });
        assert!(evaluate(&[cond("status", ConditionOp::Equals, Some(json!("approved")))], &payload));
        assert!(!evaluate(&[cond("status", ConditionOp::Equals, Some(json!("rejected")))], &payload));
        assert!(evaluate(&[cond("status", ConditionOp::NotEquals, Some(json!("rejected")))], &payload));
    }

    #[test]
    fn numeric_comparison_coerces_strings() {
        let payload = json!({ "score": "72", "budget": 1500 });
        assert!(evaluate(&[cond("score", ConditionOp::GreaterThan, Some(json!(50)))], &payload));
        assert!(evaluate(&[cond("budget", ConditionOp::LessThan, Some(json!("2000")))], &payload));
        assert!(!evaluate(&[cond("score", ConditionOp::GreaterThan, Some(json!(100)))], &payload));
    }

    #[test]
    fn non_numeric_comparison_never_matches() {
        let payload = json!({ "score": "high" });
        assert!(!evaluate(&[cond("score", ConditionOp::GreaterThan, Some(json!(1)))], &payload));
    }

    #[test]
    fn contains_works_for_strings_and_arrays() {
        let payload = json!({ "message": "urgent: server down", "tags": ["ops", "sev1"] });
        assert!(evaluate(&[cond("message", ConditionOp::Contains, Some(json!("urgent")))], &payload));
        assert!(evaluate(&[cond("tags", ConditionOp::Contains, Some(json!("sev1")))], &payload));
        assert!(!evaluate(&[cond("tags", ConditionOp::Contains, Some(json!("sev2")))], &payload));
    }

    #[test]
    fn emptiness_checks() {
        let payload = json!({ "email": "", "company": "Acme", "missing_is_empty_too": null });
        assert!(evaluate(&[cond("email", ConditionOp::IsEmpty, None)], &payload));
        assert!(evaluate(&[cond("absent", ConditionOp::IsEmpty, None)], &payload));
        assert!(evaluate(&[cond("company", ConditionOp::NotEmpty, None)], &payload));
        assert!(!evaluate(&[cond("email", ConditionOp::NotEmpty, None)], &payload));
    }

    #[test]
    fn all_conditions_must_hold() {
        let payload = json!({ "status": "approved", "score": 80 });
        let conditions = [
            cond("status", ConditionOp::Equals, Some(json!("approved"))),
            cond("score", ConditionOp::GreaterThan, Some(json!(90))),
        ];
        assert!(!evaluate(&conditions, &payload));
    }

    #[test]
    fn empty_condition_list_always_matches() {
        assert!(evaluate(&[], &json!({})));
    }
}
