//! Tool schema converter (C2): translates [`ToolDescriptor`] into each
//! provider's tool-declaration wire shape.

use serde_json::{json, Value};

use crate::canonical::{OpenAiVariant, ProviderTag, ToolDescriptor};
use crate::error::CanonicalError;

/// Convert a set of tool descriptors into the wire shape `provider` expects.
pub fn convert_tools(
    tools: &[ToolDescriptor],
    provider: ProviderTag,
) -> Result<Vec<Value>, CanonicalError> {
    tools.iter().map(|tool| convert_one(tool, provider)).collect()
}

fn convert_one(tool: &ToolDescriptor, provider: ProviderTag) -> Result<Value, CanonicalError> {
    match provider {
        ProviderTag::OpenAiFamily(OpenAiVariant::Cerebras) => {
            let schema = sanitize_cerebras_schema(&tool.input_schema);
            Ok(openai_shape(tool, schema))
        }
        ProviderTag::OpenAiFamily(_) | ProviderTag::Ollama => {
            Ok(openai_shape(tool, tool.input_schema.clone()))
        }
        ProviderTag::Anthropic => Ok(json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        })),
        ProviderTag::Gemini => Ok(json!({
            "name": tool.name,
            "description": tool.description,
            "parameters": gemini_schema(&tool.input_schema),
        })),
        ProviderTag::Empty => Err(CanonicalError::unsupported(
            "the empty adapter accepts no tools",
        )),
    }
}

fn openai_shape(tool: &ToolDescriptor, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": parameters,
        }
    })
}

/// Cerebras rejects several standard JSON Schema constraint keywords and
/// requires `additionalProperties: false` on every object node. Strip the
/// unsupported keywords recursively and force the flag. Object schemas with
/// neither `properties` nor `anyOf` also need an explicit empty
/// `properties: {}`, or Cerebras rejects the schema outright.
fn sanitize_cerebras_schema(schema: &Value) -> Value {
    const UNSUPPORTED_KEYS: &[&str] = &[
        "minimum",
        "maximum",
        "exclusiveMinimum",
        "exclusiveMaximum",
        "multipleOf",
        "pattern",
        "format",
    ];

    match schema {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                if UNSUPPORTED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key.clone(), sanitize_cerebras_schema(value));
            }
            let is_object_schema = matches!(out.get("type"), Some(Value::String(t)) if t == "object");
            if is_object_schema && !out.contains_key("additionalProperties") {
                out.insert("additionalProperties".into(), Value::Bool(false));
            }
            if is_object_schema && !out.contains_key("properties") && !out.contains_key("anyOf") {
                out.insert("properties".into(), Value::Object(serde_json::Map::new()));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(sanitize_cerebras_schema).collect())
        }
        other => other.clone(),
    }
}

/// Gemini's function-declaration schema expects upper-case `type` enum
/// values (`"STRING"`, `"OBJECT"`, ...) rather than JSON Schema's lower-case
/// ones.
fn gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, value) in map {
                if key == "type" {
                    if let Value::String(t) = value {
                        out.insert(key.clone(), Value::String(t.to_uppercase()));
                        continue;
                    }
                }
                out.insert(key.clone(), gemini_schema(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}
