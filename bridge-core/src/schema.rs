//! C1: rewrites an Anthropic tool schema into an OpenAI function schema.
//! Deterministic by construction — no randomness, no time, no locale.

use crate::apis::anthropic::MessagesTool;
use crate::apis::openai::{Function, Tool};
use crate::capability::Capabilities;
use crate::error::TranslateError;
use serde_json::{Map, Value};

/// Rewrites one Anthropic tool into the OpenAI `{type: "function", ...}`
/// shape, applying the capability-gated rewrite rules from spec.md §4.1.
pub fn rewrite(tool: &MessagesTool, caps: &Capabilities) -> Result<Tool, TranslateError> {
    if tool.name.trim().is_empty() {
        return Err(TranslateError::SchemaMissingName);
    }
    let parameters = rewrite_schema(&tool.input_schema, caps)?;
    Ok(Tool {
        tool_type: "function".to_string(),
        function: Function {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
        },
    })
}

fn rewrite_schema(schema: &Value, caps: &Capabilities) -> Result<Value, TranslateError> {
    let mut obj = schema
        .as_object()
        .cloned()
        .ok_or(TranslateError::SchemaNotObject)?;

    if !obj.contains_key("type") {
        obj.insert("type".to_string(), Value::String("object".to_string()));
    }

    resolve_refs_inline(&mut obj, schema);
    flatten_single_branch_unions(&mut obj);
    strip_format_on_non_strings(&mut obj);

    if caps.strict_additional_properties
        && obj.get("type").and_then(Value::as_str) == Some("object")
        && !obj.contains_key("additionalProperties")
    {
        obj.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    if caps.simplify_schemas {
        drop_vendor_keywords(&mut obj);
    }

    Ok(Value::Object(obj))
}

/// `$ref` indirection resolved inline: Anthropic tool schemas sent to this
/// proxy are self-contained (no external refs), so the only case worth
/// handling is a `$ref` pointing at a `$defs`/`definitions` entry in the
/// same document.
fn resolve_refs_inline(obj: &mut Map<String, Value>, root: &Value) {
    for (_, value) in obj.iter_mut() {
        inline_refs_in_value(value, root);
    }
}

fn inline_refs_in_value(value: &mut Value, root: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get("$ref").cloned() {
                if let Some(resolved) = resolve_json_pointer(root, &pointer) {
                    *value = resolved;
                    return;
                }
            }
            for (_, v) in map.iter_mut() {
                inline_refs_in_value(v, root);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_in_value(item, root);
            }
        }
        _ => {}
    }
}

fn resolve_json_pointer(root: &Value, pointer: &str) -> Option<Value> {
    let rest = pointer.strip_prefix("#/")?;
    let mut cur = root;
    for segment in rest.split('/') {
        cur = cur.get(segment)?;
    }
    Some(cur.clone())
}

/// `oneOf`/`anyOf` with a single branch is flattened into that branch.
fn flatten_single_branch_unions(obj: &mut Map<String, Value>) {
    for key in ["oneOf", "anyOf"] {
        if let Some(Value::Array(branches)) = obj.get(key) {
            if branches.len() == 1 {
                let branch = branches[0].clone();
                obj.remove(key);
                if let Value::Object(branch_obj) = branch {
                    for (k, v) in branch_obj {
                        obj.entry(k).or_insert(v);
                    }
                }
            }
        }
    }
}

/// `format` on a non-string type is a construct some backends reject.
fn strip_format_on_non_strings(obj: &mut Map<String, Value>) {
    let is_string_type = matches!(obj.get("type"), Some(Value::String(t)) if t == "string");
    if !is_string_type {
        obj.remove("format");
    }
    if let Some(Value::Object(props)) = obj.get_mut("properties") {
        for (_, prop) in props.iter_mut() {
            if let Value::Object(prop_obj) = prop {
                strip_format_on_non_strings(prop_obj);
            }
        }
    }
}

/// Known JSON Schema keywords this proxy understands; anything else is a
/// vendor-specific extension, dropped only when `simplify_schemas` is set.
const KNOWN_KEYWORDS: &[&str] = &[
    "type",
    "properties",
    "required",
    "items",
    "enum",
    "description",
    "additionalProperties",
    "oneOf",
    "anyOf",
    "format",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "default",
];

fn drop_vendor_keywords(obj: &mut Map<String, Value>) {
    obj.retain(|k, _| KNOWN_KEYWORDS.contains(&k.as_str()));
}
