//! Formatting of `terraform output -json`

use serde_json::Value;

/// Placeholder shown instead of sensitive output values
pub const SENSITIVE_PLACEHOLDER: &str = "<sensitive>";

/// Turn structured tool outputs into `key: value` lines.
///
/// Returns `None` when the text is not the expected JSON object of
/// `{ "value": ..., "sensitive": bool }` entries.
pub fn format_outputs(json: &str) -> Option<String> {
    let parsed: serde_json::Map<String, Value> = serde_json::from_str(json.trim()).ok()?;

    let mut lines = Vec::with_capacity(parsed.len());
    for (key, entry) in &parsed {
        let entry = entry.as_object()?;
        let value = entry.get("value")?;
        let sensitive = entry
            .get("sensitive")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let rendered = if sensitive {
            SENSITIVE_PLACEHOLDER.to_string()
        } else {
            match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };
        lines.push(format!("{}: {}", key, rendered));
    }

    Some(lines.join("\n"))
}
