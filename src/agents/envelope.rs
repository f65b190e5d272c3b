//! Result envelopes.
//!
//! Deterministic agents answer `{status: "success", ...payload}` or
//! `{status: "error", message}`. Companion agents answer
//! `{success, user_id, agent, result | error, timestamp}`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::Result;

/// Flatten `payload` into a success envelope. Non-object payloads land under `data`.
pub fn success<T: Serialize>(payload: &T) -> Result<Value> {
    let mut envelope = Map::new();
    envelope.insert("status".to_string(), json!("success"));
    match serde_json::to_value(payload)? {
        Value::Object(fields) => envelope.extend(fields),
        other => {
            envelope.insert("data".to_string(), other);
        }
    }
    Ok(Value::Object(envelope))
}

pub fn error(message: impl std::fmt::Display) -> Value {
    json!({"status": "error", "message": message.to_string()})
}

pub fn companion_success(user_id: &str, agent: &str, result: Value, at: DateTime<Utc>) -> Value {
    json!({
        "success": true,
        "user_id": user_id,
        "agent": agent,
        "result": result,
        "timestamp": at.to_rfc3339(),
    })
}

pub fn companion_error(user_id: &str, agent: &str, message: impl std::fmt::Display, at: DateTime<Utc>) -> Value {
    json!({
        "success": false,
        "user_id": user_id,
        "agent": agent,
        "error": message.to_string(),
        "timestamp": at.to_rfc3339(),
    })
}

/// True when an envelope of either shape reports success.
pub fn is_success(envelope: &Value) -> bool {
    envelope["status"] == "success" || envelope["success"] == true
}
