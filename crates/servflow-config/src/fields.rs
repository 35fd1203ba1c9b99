//! Field metadata describing one action-configuration field.
//!
//! Registered actions expose this metadata so the schema generator can
//! emit editor tooling and the `validate` command can check configs.

use serde::{Deserialize, Serialize};

/// Closed set of configuration field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free-form string (template expressions allowed)
    String,
    /// Boolean flag
    Boolean,
    /// Arbitrary key/value map
    Map,
    /// Reference to a configured integration ID
    Integration,
    /// File reference (`request.<field>` or `action.<name>`)
    File,
    /// Multi-line string
    Textarea,
    /// List of strings
    Array,
}

impl FieldType {
    /// JSON-Schema type name for this field type.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::Integration | Self::File | Self::Textarea => "string",
            Self::Boolean => "boolean",
            Self::Map => "object",
            Self::Array => "array",
        }
    }
}

/// Description of one configuration field of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Human label for editors
    pub label: String,

    /// Placeholder text for editors
    #[serde(default)]
    pub placeholder: String,

    /// Whether the field must be present (and non-empty for strings)
    #[serde(default)]
    pub required: bool,

    /// Default value when omitted
    #[serde(default)]
    pub default: Option<serde_json::Value>,

    /// Closed set of allowed values, when applicable
    #[serde(default)]
    pub values: Vec<String>,
}

impl FieldInfo {
    /// Shorthand for a required string field.
    pub fn required_string(label: impl Into<String>) -> Self {
        Self {
            field_type: FieldType::String,
            label: label.into(),
            placeholder: String::new(),
            required: true,
            default: None,
            values: Vec::new(),
        }
    }

    /// Shorthand for an optional field of the given type.
    pub fn optional(field_type: FieldType, label: impl Into<String>) -> Self {
        Self {
            field_type,
            label: label.into(),
            placeholder: String::new(),
            required: false,
            default: None,
            values: Vec::new(),
        }
    }

    /// Builder-style placeholder text.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Builder-style default value.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Builder-style allowed values.
    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_type_mapping() {
        assert_eq!(FieldType::String.json_type(), "string");
        assert_eq!(FieldType::Integration.json_type(), "string");
        assert_eq!(FieldType::Boolean.json_type(), "boolean");
        assert_eq!(FieldType::Map.json_type(), "object");
        assert_eq!(FieldType::Array.json_type(), "array");
    }

    #[test]
    fn builders_compose() {
        let field = FieldInfo::optional(FieldType::String, "Mode")
            .with_default(serde_json::json!("generate"))
            .with_values(vec!["generate".to_string(), "validate".to_string()]);
        assert!(!field.required);
        assert_eq!(field.values.len(), 2);
    }
}
