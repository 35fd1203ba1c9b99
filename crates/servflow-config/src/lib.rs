//! # Servflow Config
//!
//! Declarative configuration model for Servflow APIs.
//!
//! Operators describe endpoints in YAML; this crate owns the serde data
//! model (`ApiConfig` and friends), folder loading, the integrations
//! file, JSON-Schema generation for editor tooling and validation, and
//! the file watcher backing `--watch` hot reload.

mod api;
mod error;
mod fields;
mod integrations;
mod loader;
mod schema;
mod watcher;

pub use api::{
    ActionConfig, ApiConfig, ConditionItem, ConditionalConfig, HttpConfig, McpToolConfig,
    ResponseConfig, ResponseObject,
};
pub use error::{ConfigError, Result};
pub use fields::{FieldInfo, FieldType};
pub use integrations::{IntegrationConfig, IntegrationsFile};
pub use loader::{load_config_dir, load_config_file, load_integrations_file};
pub use schema::{generate_schema, validate_against_schema, ActionSchema};
pub use watcher::watch_config_dir;
