//! `{{placeholder}}` template resolution.
//!
//! Action configs may embed placeholders referencing top-level fields of
//! the event payload (`{{stepKey}}`, `{{leadName}}`, …). Resolution walks
//! the whole config value and substitutes inside every string; unknown
//! placeholders are left untouched so a misconfigured rule stays visible
//! rather than silently blanking out.

use serde_json::Value;

/// Substitute payload fields into a single template string.
pub fn render_str(template: &str, payload: &Value) -> String {
    let Some(fields) = payload.as_object() else {
        return template.to_string();
    };

    let mut result = template.to_string();
    for (key, value) in fields {
        let placeholder = format!("{{{{{key}}}}}");
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, &scalar_text(value));
        }
    }
    result
}

/// Substitute payload fields into every string of a config value.
pub fn render_config(config: &Value, payload: &Value) -> Value {
    match config {
        Value::String(s) => Value::String(render_str(s, payload)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_config(v, payload)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_config(v, payload)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Text form of a payload field: bare strings, compact JSON for the rest.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replaces_known_placeholders() {
        let payload = json!({ "stepKey": "review", "leadName": "Acme" });
        assert_eq!(
            render_str("Step {{stepKey}} for {{leadName}}", &payload),
            "Step review for Acme"
        );
    }

    #[test]
    fn unknown_placeholders_are_left_intact() {
        let payload = json!({ "stepKey": "review" });
        assert_eq!(render_str("{{stepKey}}/{{ghost}}", &payload), "review/{{ghost}}");
    }

    #[test]
    fn non_string_fields_are_stringified() {
        let payload = json!({ "score": 72, "approved": true, "note": null });
        assert_eq!(render_str("{{score}}-{{approved}}-{{note}}", &payload), "72-true-");
    }

    #[test]
    fn config_is_rendered_recursively() {
        let payload = json!({ "stepKey": "review", "instanceId": "abc" });
        let config = json!({
            "subject": "[{{stepKey}}] pending",
            "headers": { "x-instance": "{{instanceId}}" },
            "cc": ["ops@{{stepKey}}.example", 42],
        });

        let rendered = render_config(&config, &payload);
        assert_eq!(rendered["subject"], "[review] pending");
        assert_eq!(rendered["headers"]["x-instance"], "abc");
        assert_eq!(rendered["cc"][0], "ops@review.example");
        assert_eq!(rendered["cc"][1], 42);
    }
}
