use serde_json::Value as JsonValue;

/// Fingerprint entry standing in for the default grouping components.
pub const DEFAULT_FINGERPRINT_VAR: &str = "{{ default }}";

/// Fingerprint stored on an event payload.
///
/// A single string is treated as a one-element list. Anything missing, empty
/// or containing non-string entries falls back to the default fingerprint.
pub fn event_fingerprint(data: Option<&JsonValue>) -> Vec<String> {
    let default = || vec![DEFAULT_FINGERPRINT_VAR.to_string()];

    match data.and_then(|data| data.get("fingerprint")) {
        Some(JsonValue::String(entry)) if !entry.is_empty() => vec![entry.clone()],
        Some(JsonValue::Array(entries)) if !entries.is_empty() => entries
            .iter()
            .map(|entry| entry.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_else(default),
        _ => default(),
    }
}

/// Whether the entry refers to the default grouping components.
pub(crate) fn is_default_var(entry: &str) -> bool {
    let trimmed = entry.trim();
    trimmed == DEFAULT_FINGERPRINT_VAR || trimmed == "{{default}}"
}
