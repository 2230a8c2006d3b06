//! Backend tool descriptors → canonical function-calling schemas.
//!
//! Output shape:
//! `{"type": "function", "function": {"name", "description", "parameters"}}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::errors::GatewayError;
use super::types::ToolDescriptor;

/// Canonical function schema handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

/// The `function` member of a [`FunctionSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl FunctionSchema {
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Translate one descriptor.
///
/// The parameter schema is passed through as-is, except that a missing
/// schema becomes an empty object schema and an object schema without
/// `required` gets an empty list.
pub fn translate(descriptor: &ToolDescriptor) -> FunctionSchema {
    FunctionSchema {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: normalize_parameters(&descriptor.input_schema),
        },
    }
}

/// Translate a batch, rejecting duplicate names.
pub fn translate_all<'a, I>(descriptors: I) -> Result<Vec<FunctionSchema>, GatewayError>
where
    I: IntoIterator<Item = (&'a str, &'a ToolDescriptor)>,
{
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut schemas = Vec::new();

    for (server, descriptor) in descriptors {
        if let Some(existing) = owners.insert(descriptor.name.as_str(), server) {
            return Err(GatewayError::DuplicateToolName {
                name: descriptor.name.clone(),
                existing: existing.to_string(),
                incoming: server.to_string(),
            });
        }
        schemas.push(translate(descriptor));
    }

    Ok(schemas)
}

fn normalize_parameters(schema: &serde_json::Value) -> serde_json::Value {
    match schema {
        serde_json::Value::Null => serde_json::json!({
            "type": "object",
            "properties": {},
            "required": [],
        }),
        serde_json::Value::Object(obj) => {
            let mut obj = obj.clone();
            let is_object = obj.get("type").map_or(true, |t| t == "object");
            if is_object {
                obj.entry("properties")
                    .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            }
            obj.entry("required")
                .or_insert_with(|| serde_json::Value::Array(Vec::new()));
            serde_json::Value::Object(obj)
        }
        other => other.clone(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(name: &str, schema: serde_json::Value) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: schema,
        }
    }

    #[test]
    fn test_exact_output_shape() {
        let add = descriptor(
            "add",
            json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
        );
        let schema = serde_json::to_value(translate(&add)).unwrap();
        assert_eq!(
            schema,
            json!({
                "type": "function",
                "function": {
                    "name": "add",
                    "description": "add tool",
                    "parameters": {
                        "type": "object",
                        "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                        "required": ["a", "b"]
                    }
                }
            })
        );
    }

    #[test]
    fn test_parameters_not_coerced() {
        let schema = json!({
            "type": "object",
            "properties": {"n": {"type": "integer", "minimum": 0, "x-custom": true}},
            "required": ["n"],
            "additionalProperties": false
        });
        let translated = translate(&descriptor("count", schema.clone()));
        assert_eq!(translated.function.parameters, schema);
    }

    #[test]
    fn test_missing_required_added() {
        let translated = translate(&descriptor(
            "ping",
            json!({"type": "object", "properties": {}}),
        ));
        assert_eq!(translated.function.parameters["required"], json!([]));
    }

    #[test]
    fn test_bare_object_schema_gets_properties() {
        let translated = translate(&descriptor("noop", json!({"type": "object"})));
        assert_eq!(
            translated.function.parameters,
            json!({"type": "object", "properties": {}, "required": []})
        );
    }

    #[test]
    fn test_null_schema_becomes_empty_object() {
        let translated = translate(&descriptor("noop", serde_json::Value::Null));
        assert_eq!(
            translated.function.parameters,
            json!({"type": "object", "properties": {}, "required": []})
        );
    }

    #[test]
    fn test_translate_all_rejects_duplicates() {
        let a = descriptor("search", json!({"type": "object"}));
        let b = descriptor("search", json!({"type": "object"}));
        let err = translate_all([("web", &a), ("docs", &b)]).unwrap_err();
        match err {
            GatewayError::DuplicateToolName {
                name,
                existing,
                incoming,
            } => {
                assert_eq!(name, "search");
                assert_eq!(existing, "web");
                assert_eq!(incoming, "docs");
            }
            other => panic!("expected DuplicateToolName, got {other:?}"),
        }
    }

    #[test]
    fn test_translate_all_distinct() {
        let a = descriptor("add", json!({"type": "object"}));
        let b = descriptor("sub", json!({"type": "object"}));
        let schemas = translate_all([("calc", &a), ("calc", &b)]).unwrap();
        let names: Vec<_> = schemas.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["add", "sub"]);
    }
}
