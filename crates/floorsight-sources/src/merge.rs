//! Stock merges for fan-out sources

use serde_json::{json, Value};

/// Sum per-item counts into `{ "total": n, "fanOut": items }`
///
/// Each per-item payload is either a bare number or a document with a
/// numeric `count` field; anything else contributes zero. An empty slice
/// merges to a zero total, which is how a fan-out over an empty item list
/// settles.
#[must_use]
pub fn sum_counts(payloads: &[Value]) -> Value {
    let total: f64 = payloads.iter().map(count_of).sum();
    json!({ "total": total, "fanOut": payloads.len() })
}

fn count_of(payload: &Value) -> f64 {
    payload
        .as_f64()
        .or_else(|| payload.get("count").and_then(Value::as_f64))
        .unwrap_or(0.0)
}
