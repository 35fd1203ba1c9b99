//! Integrations file model: long-lived connection holders declared once
//! and referenced from action configs by ID.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level integrations file: `{integrations: {<id>: {type, config}}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationsFile {
    /// Declared integrations keyed by operator-chosen ID
    #[serde(default)]
    pub integrations: HashMap<String, IntegrationConfig>,
}

/// One integration declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Registered integration type tag
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific configuration, passed to the constructor as JSON
    #[serde(default)]
    pub config: serde_json::Value,
}
