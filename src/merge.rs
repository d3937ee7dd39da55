//! Secret-aware merge of an incoming configuration document
//!
//! Clients only ever see masked secrets, and they send back the whole tree
//! they last read. The merge keeps real credentials intact when a client
//! echoes a masked (or blank) placeholder, while every other branch the
//! client sends replaces the stored one wholesale.

use crate::secrets::{is_secret, MASK_MARKER};
use serde_json::{Map, Value};

/// Check whether a submitted secret is a placeholder rather than a real value
pub fn looks_masked(value: &str) -> bool {
    value.is_empty() || value.ends_with(MASK_MARKER)
}

/// Merge `incoming` over `existing`, restoring secrets the client only echoed.
///
/// This is a full-replace merge: keys missing from `incoming` are not carried
/// over from `existing`. The only values taken from `existing` are secrets
/// for which the client submitted a placeholder.
pub fn merge_secrets(incoming: Value, existing: &Value) -> Value {
    let (incoming, existing) = match (incoming, existing) {
        (Value::Object(incoming), Value::Object(existing)) => (incoming, existing),
        (incoming, _) => return incoming,
    };

    let empty = Value::Object(Map::new());
    let merged: Map<String, Value> = incoming
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(ref s) if is_secret(&key) && looks_masked(s) => existing
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new())),
                other => merge_secrets(other, existing.get(&key).unwrap_or(&empty)),
            };
            (key, value)
        })
        .collect();

    Value::Object(merged)
}
