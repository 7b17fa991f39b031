//! Canonical (system, tools) fingerprinting for prompt-cache attribution
//! (spec.md §4.3). The hash lives here because it is a pure function of
//! request content; the cache's lifecycle (hit/create bookkeeping, TTL
//! sweep) lives in the gateway, which is the only place with process-wide
//! shared state.

use crate::apis::anthropic::{MessagesSystemPrompt, MessagesTool};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A 256-bit fingerprint rendered as lowercase hex.
pub type Fingerprint = String;

/// Computes a stable fingerprint over `(system, tools)`. Canonicalization
/// sorts object keys recursively and preserves array order, so permuting
/// keys in a schema yields the same fingerprint while permuting the
/// `tools` array yields a different one (spec.md P5).
pub fn fingerprint(system: Option<&MessagesSystemPrompt>, tools: Option<&[MessagesTool]>) -> Fingerprint {
    let system_value = system.map(|s| match s {
        MessagesSystemPrompt::Single(text) => Value::String(text.clone()),
        MessagesSystemPrompt::Blocks(blocks) => {
            serde_json::to_value(blocks).unwrap_or(Value::Null)
        }
    });
    let tools_value = tools.map(|t| serde_json::to_value(t).unwrap_or(Value::Null));

    let combined = serde_json::json!({
        "system": system_value,
        "tools": tools_value,
    });

    let canonical = canonicalize(&combined);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Renders a JSON value with object keys sorted lexicographically and no
/// extraneous whitespace, preserving array order and all other semantics.
fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", canonicalize(&Value::String(k.clone())), canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}
