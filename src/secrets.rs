//! Secret classification and masking for the gateway configuration
//!
//! Secrets are identified purely by the name of the key that holds them,
//! wherever that key appears in the document. Masked values keep a short
//! prefix so operators can tell which credential is configured without the
//! full value ever leaving the control plane.

use serde_json::{Map, Value};

/// Marker appended to (or standing in for) a masked secret
pub const MASK_MARKER: &str = "***";

/// Number of leading characters kept visible when masking long secrets
const MASK_VISIBLE_CHARS: usize = 8;

/// Leaf key names that hold credentials
pub const SECRET_FIELDS: &[&str] = &[
    "api_key",
    "token",
    "app_secret",
    "encrypt_key",
    "verification_token",
    "bot_token",
    "app_token",
    "channel_secret",
    "channel_access_token",
    "client_secret",
];

/// Check whether a key name is classified as secret
pub fn is_secret(key: &str) -> bool {
    SECRET_FIELDS.contains(&key)
}

/// Mask a single secret value.
///
/// Values of up to eight characters collapse to the bare marker, longer
/// values keep their first eight characters.
pub fn mask_value(value: &str) -> String {
    let mut chars = value.chars();
    let prefix: String = chars.by_ref().take(MASK_VISIBLE_CHARS).collect();
    if chars.next().is_none() {
        return MASK_MARKER.to_string();
    }
    format!("{}{}", prefix, MASK_MARKER)
}

/// Return a copy of the document with every non-empty secret string masked.
///
/// Empty secrets and secrets holding non-string values are left as they are,
/// so a reader can still see that nothing is configured.
pub fn mask_secrets(document: &Value) -> Value {
    match document {
        Value::Object(map) => {
            let masked: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) if is_secret(key) && !s.is_empty() => {
                            Value::String(mask_value(s))
                        }
                        other => mask_secrets(other),
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(mask_secrets).collect()),
        leaf => leaf.clone(),
    }
}
