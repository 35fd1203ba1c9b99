//! JSON-Schema generation for `ApiConfig` and validation of raw YAML
//! documents against it.
//!
//! The schema embeds a `oneOf` over every registered action type so that
//! editors and the `validate` command check action configs field by
//! field.

use crate::fields::FieldInfo;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Schema-facing description of one registered action type.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    /// Registered type tag
    pub name: String,
    /// Human description
    pub description: String,
    /// Configuration fields keyed by field name
    pub fields: BTreeMap<String, FieldInfo>,
}

const STANDARD_METHODS: [&str; 7] =
    ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Generate the JSON Schema for `ApiConfig`, with a `oneOf` over the
/// given registered action types.
pub fn generate_schema(actions: &[ActionSchema]) -> Value {
    let action_variants: Vec<Value> = actions.iter().map(action_variant).collect();
    let action_schema = if action_variants.is_empty() {
        json!({"type": "object"})
    } else {
        json!({"oneOf": action_variants})
    };

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "ApiConfig",
        "type": "object",
        "required": ["id"],
        "additionalProperties": false,
        "properties": {
            "id": {"type": "string", "minLength": 1},
            "http": {
                "type": "object",
                "required": ["listenPath", "method"],
                "properties": {
                    "listenPath": {"type": "string", "minLength": 1},
                    "method": {"type": "string", "enum": STANDARD_METHODS},
                    "next": {"type": "string"},
                    "corsAllowedOrigins": {"type": "array", "items": {"type": "string"}}
                }
            },
            "mcpTool": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "description": {"type": "string"},
                    "next": {"type": "string"},
                    "endValue": {"type": "string"}
                }
            },
            "actions": {
                "type": "object",
                "additionalProperties": action_schema
            },
            "conditionals": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "properties": {
                        "onTrue": {"type": "string"},
                        "onFalse": {"type": "string"},
                        "expression": {"type": "string"},
                        "type": {"type": "string", "enum": ["structured"]},
                        "structure": {
                            "type": "array",
                            "items": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["function", "content"],
                                    "properties": {
                                        "function": {"type": "string"},
                                        "content": {"type": "string"},
                                        "comparison": {"type": "string"},
                                        "title": {"type": "string"}
                                    }
                                }
                            }
                        }
                    }
                }
            },
            "responses": {
                "type": "object",
                "additionalProperties": {
                    "type": "object",
                    "required": ["code"],
                    "properties": {
                        "code": {"type": "integer", "minimum": 100, "maximum": 999},
                        "template": {"type": "string"},
                        "type": {"type": "string", "enum": ["template", "json_object"]},
                        "object": {"$ref": "#/definitions/responseObject"}
                    }
                }
            }
        },
        "definitions": {
            "responseObject": {
                "type": "object",
                "properties": {
                    "value": {"type": "string"},
                    "fields": {
                        "type": "object",
                        "additionalProperties": {"$ref": "#/definitions/responseObject"}
                    }
                }
            }
        }
    })
}

fn action_variant(action: &ActionSchema) -> Value {
    let mut field_props = Map::new();
    let mut required_fields = Vec::new();
    for (name, info) in &action.fields {
        field_props.insert(name.clone(), field_schema(info));
        if info.required {
            required_fields.push(Value::String(name.clone()));
        }
    }

    json!({
        "type": "object",
        "description": action.description,
        "required": ["type"],
        "properties": {
            "type": {"const": action.name},
            "config": {
                "type": "object",
                "properties": Value::Object(field_props),
                "required": required_fields
            },
            "next": {"type": "string"},
            "fail": {"type": "string"}
        }
    })
}

fn field_schema(info: &FieldInfo) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(info.field_type.json_type()));
    schema.insert("description".to_string(), json!(info.label));
    if info.required && info.field_type.json_type() == "string" {
        schema.insert("minLength".to_string(), json!(1));
    }
    if !info.values.is_empty() {
        schema.insert("enum".to_string(), json!(info.values));
    }
    if let Some(default) = &info.default {
        schema.insert("default".to_string(), default.clone());
    }
    Value::Object(schema)
}

/// Validate a raw document against the schema. Returns every violation,
/// not just the first.
pub fn validate_against_schema(schema: &Value, instance: &Value) -> Result<(), Vec<String>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => return Err(vec![format!("invalid schema: {e}")]),
    };
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
