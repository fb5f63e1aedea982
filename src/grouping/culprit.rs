use serde_json::Value as JsonValue;

/// Culprits longer than this are truncated.
pub const MAX_CULPRIT_LENGTH: usize = 200;

/// Derive the code location an event is attributed to.
///
/// Uses the most relevant frame of the last exception's stacktrace (the last
/// in-app frame, otherwise the last frame), formatted as `module in function`.
/// Falls back to an explicit `culprit` or `transaction` on the payload.
pub fn generate_culprit(data: Option<&JsonValue>) -> Option<String> {
    let data = data?;

    let from_frames = data
        .pointer("/exception/values")
        .and_then(JsonValue::as_array)
        .and_then(|values| values.last())
        .and_then(|exception| exception.pointer("/stacktrace/frames"))
        .and_then(JsonValue::as_array)
        .and_then(|frames| culprit_from_frames(frames));

    let culprit = from_frames.or_else(|| {
        ["culprit", "transaction"]
            .iter()
            .find_map(|key| data.get(*key).and_then(JsonValue::as_str))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })?;

    Some(truncate(&culprit, MAX_CULPRIT_LENGTH))
}

fn culprit_from_frames(frames: &[JsonValue]) -> Option<String> {
    let frame = frames
        .iter()
        .rev()
        .find(|frame| frame.get("in_app").and_then(JsonValue::as_bool) == Some(true))
        .or_else(|| frames.last())?;

    let location = ["module", "filename"]
        .iter()
        .find_map(|key| frame.get(*key).and_then(JsonValue::as_str))
        .filter(|value| !value.is_empty());
    let function = frame
        .get("function")
        .and_then(JsonValue::as_str)
        .filter(|value| !value.is_empty());

    match (location, function) {
        (Some(location), Some(function)) => Some(format!("{location} in {function}")),
        (Some(location), None) => Some(location.to_string()),
        (None, Some(function)) => Some(function.to_string()),
        (None, None) => None,
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars - 3).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_last_in_app_frame() {
        let data = json!({
            "exception": {"values": [{
                "stacktrace": {"frames": [
                    {"module": "app.views", "function": "checkout", "in_app": true},
                    {"module": "django.core", "function": "dispatch", "in_app": false}
                ]}
            }]}
        });
        assert_eq!(generate_culprit(Some(&data)).as_deref(), Some("app.views in checkout"));
    }

    #[test]
    fn falls_back_to_last_frame_then_payload_fields() {
        let data = json!({
            "exception": {"values": [{
                "stacktrace": {"frames": [{"filename": "lib.js", "function": "run"}]}
            }]}
        });
        assert_eq!(generate_culprit(Some(&data)).as_deref(), Some("lib.js in run"));

        let data = json!({"transaction": "/api/orders"});
        assert_eq!(generate_culprit(Some(&data)).as_deref(), Some("/api/orders"));

        assert_eq!(generate_culprit(Some(&json!({}))), None);
        assert_eq!(generate_culprit(None), None);
    }

    #[test]
    fn long_culprits_are_truncated_on_char_boundaries() {
        let data = json!({"culprit": "é".repeat(300)});
        let culprit = generate_culprit(Some(&data)).unwrap();
        assert_eq!(culprit.chars().count(), MAX_CULPRIT_LENGTH);
        assert!(culprit.ends_with("..."));
    }
}
