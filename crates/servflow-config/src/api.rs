//! Serde model of a declarative API description.
//!
//! One `ApiConfig` describes one endpoint: maps of action, conditional
//! and response step descriptors, plus either an HTTP listener or an MCP
//! tool declaration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative description of one HTTP endpoint or MCP tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Unique identifier for this API
    pub id: String,

    /// Action step descriptors keyed by ID
    #[serde(default)]
    pub actions: HashMap<String, ActionConfig>,

    /// Conditional step descriptors keyed by ID
    #[serde(default)]
    pub conditionals: HashMap<String, ConditionalConfig>,

    /// Response step descriptors keyed by ID
    #[serde(default)]
    pub responses: HashMap<String, ResponseConfig>,

    /// HTTP listener configuration
    #[serde(default)]
    pub http: Option<HttpConfig>,

    /// MCP tool declaration. An API publishes an HTTP endpoint or an MCP
    /// tool, never both.
    #[serde(default, rename = "mcpTool")]
    pub mcp_tool: Option<McpToolConfig>,
}

impl ApiConfig {
    /// True when both an HTTP listener and an MCP tool are declared,
    /// which is invalid.
    pub fn has_conflicting_surfaces(&self) -> bool {
        self.http.is_some() && self.mcp_tool.is_some()
    }
}

/// HTTP listener settings for an API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Path to listen on, e.g. `hello` or `test/{id}`
    #[serde(rename = "listenPath")]
    pub listen_path: String,

    /// HTTP method, e.g. `GET`
    pub method: String,

    /// Entry step reference for the plan walk
    #[serde(default)]
    pub next: String,

    /// Per-API CORS allow-list; falls back to the engine-wide list when
    /// empty
    #[serde(default, rename = "corsAllowedOrigins")]
    pub cors_allowed_origins: Vec<String>,
}

/// MCP tool declaration for an API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpToolConfig {
    /// Tool name surfaced over MCP
    pub name: String,

    /// Human description surfaced over MCP
    #[serde(default)]
    pub description: String,

    /// Entry step reference for the plan walk
    #[serde(default)]
    pub next: String,

    /// Optional end-value template rendered when the walk terminates
    /// without a response step
    #[serde(default, rename = "endValue")]
    pub end_value: String,
}

/// One action step descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Registered action type tag
    #[serde(rename = "type")]
    pub kind: String,

    /// Action configuration, serialized to JSON for the constructor
    #[serde(default)]
    pub config: serde_json::Value,

    /// Step to follow on success
    #[serde(default)]
    pub next: String,

    /// Step to follow on failure; empty means propagate
    #[serde(default)]
    pub fail: String,
}

/// One conditional step descriptor: a free-form expression or the
/// structured OR-of-ANDs form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionalConfig {
    /// Step to follow when the expression renders `true`
    #[serde(default, rename = "onTrue")]
    pub on_true: String,

    /// Step to follow otherwise
    #[serde(default, rename = "onFalse")]
    pub on_false: String,

    /// Template expression; rendered and compared to the literal `true`
    #[serde(default)]
    pub expression: String,

    /// Set to `structured` to compile `structure` instead of `expression`
    #[serde(default, rename = "type")]
    pub kind: String,

    /// OR of ANDs: the outer list is OR-combined, each inner list
    /// AND-combined
    #[serde(default)]
    pub structure: Vec<Vec<ConditionItem>>,
}

impl ConditionalConfig {
    /// True when this descriptor uses the structured form.
    pub fn is_structured(&self) -> bool {
        self.kind == "structured"
    }
}

/// One leaf of a structured conditional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionItem {
    /// Condition function: `email`, `empty`, `notempty`, `bcrypt`, or a
    /// comparison (`eq`, `ne`, `lt`, `le`, `gt`, `ge`)
    pub function: String,

    /// Left-hand template expression, typically a variable reference
    pub content: String,

    /// Right-hand template expression for two-operand functions
    #[serde(default)]
    pub comparison: Option<String>,

    /// Human label used in validation-error messages
    #[serde(default)]
    pub title: Option<String>,
}

/// One response step descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// HTTP status code, 100..=999
    pub code: u16,

    /// Body template for the template builder
    #[serde(default)]
    pub template: Option<String>,

    /// Builder selector: `template` or `json_object`. Unset picks
    /// `json_object` when `object` is populated, `template` otherwise.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Structured body for the JSON-object builder
    #[serde(default)]
    pub object: Option<ResponseObject>,
}

/// Recursive structured response body: a leaf template expression or a
/// map of named fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseObject {
    /// Leaf template expression
    #[serde(default)]
    pub value: Option<String>,

    /// Branch fields
    #[serde(default)]
    pub fields: HashMap<String, ResponseObject>,
}

impl ResponseObject {
    /// True when neither a value nor any fields are set.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_api() {
        let yaml = r#"
id: hello
http:
  listenPath: hello
  method: GET
  next: action.greet
actions:
  greet:
    type: stub
    config:
      message: "Hello from direct config!"
    next: response.success
responses:
  success:
    code: 200
    template: '{"greeting": "{{ .variable_actions_greet.message }}"}'
"#;
        let config: ApiConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.id, "hello");
        let http = config.http.as_ref().unwrap();
        assert_eq!(http.listen_path, "hello");
        assert_eq!(http.next, "action.greet");
        assert_eq!(config.actions["greet"].kind, "stub");
        assert_eq!(config.responses["success"].code, 200);
        assert!(!config.has_conflicting_surfaces());
    }

    #[test]
    fn deserializes_structured_conditional() {
        let yaml = r#"
onTrue: response.ok
onFalse: response.bad
type: structured
structure:
  - - function: notempty
      content: "{{ .name }}"
      title: Name
    - function: eq
      content: "{{ .age }}"
      comparison: "18"
"#;
        let cond: ConditionalConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cond.is_structured());
        assert_eq!(cond.structure.len(), 1);
        assert_eq!(cond.structure[0].len(), 2);
        assert_eq!(cond.structure[0][0].title.as_deref(), Some("Name"));
        assert_eq!(cond.structure[0][1].comparison.as_deref(), Some("18"));
    }

    #[test]
    fn deserializes_recursive_response_object() {
        let yaml = r#"
code: 200
object:
  fields:
    data:
      fields:
        name:
          value: "{{ jsonraw .name }}"
    count:
      value: "{{ jsonraw .n }}"
"#;
        let resp: ResponseConfig = serde_yaml::from_str(yaml).unwrap();
        let object = resp.object.unwrap();
        assert!(object.value.is_none());
        assert!(object.fields["data"].fields.contains_key("name"));
        assert_eq!(object.fields["count"].value.as_deref(), Some("{{ jsonraw .n }}"));
    }

    #[test]
    fn http_and_mcp_conflict_detected() {
        let config = ApiConfig {
            id: "x".to_string(),
            http: Some(HttpConfig::default()),
            mcp_tool: Some(McpToolConfig::default()),
            ..ApiConfig::default()
        };
        assert!(config.has_conflicting_surfaces());
    }
}
