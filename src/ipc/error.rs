use serde_json::json;

/// Success envelope.
pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({ "id": id, "ok": true, "result": result })
}

/// Failure envelope. `details` is attached only when a handler has something
/// structured to add (usually the table involved).
pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}
