//! Error payloads returned by the backend.
//!
//! Pure helpers in this crate never fail on bad data; they degrade and report
//! through [`crate::Diagnostics`]. What remains is turning the backend's error
//! bodies into a message a user can read.

use serde_json::Value;

/// Extract a human-readable message from an error payload.
///
/// Looks at `response.data.message`, `response.message`, `message` and the
/// FastAPI-style `detail`, in that order. Array messages are joined with
/// `", "`. Falls back to `"Unknown error"`.
pub fn error_message(payload: &Value) -> String {
    if let Value::String(s) = payload {
        return s.clone();
    }

    let candidates = [
        payload.pointer("/response/data/message"),
        payload.pointer("/response/message"),
        payload.get("message"),
        payload.get("detail"),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(render_message)
        .unwrap_or_else(|| "Unknown error".to_string())
}

fn render_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    // FastAPI validation errors carry their text in `msg`
                    Value::Object(map) => map
                        .get("msg")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| item.to_string()),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}
