//! Action and integration registries.
//!
//! Process-wide type→constructor maps populated at startup by the
//! executable and integration packages. Reads after init are lock-light
//! and never block request handling. Registration refuses duplicates.

use crate::error::{Error, Result};
use crate::executable::{ActionExecutable, Integration};
use once_cell::sync::Lazy;
use serde_json::Value;
use servflow_config::{ActionSchema, FieldInfo};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Constructor for an action executable from its JSON config.
pub type ActionConstructor = fn(&str) -> Result<Arc<dyn ActionExecutable>>;

/// Constructor for an integration from its declared config.
pub type IntegrationConstructor = fn(&Value) -> Result<Arc<dyn Integration>>;

/// Metadata and constructor for one registered action type.
#[derive(Clone)]
pub struct ActionDescriptor {
    /// Registered type tag
    pub name: String,
    /// Human description, surfaced in the generated schema
    pub description: String,
    /// Configuration field metadata keyed by field name
    pub fields: BTreeMap<String, FieldInfo>,
    /// Constructor invoked at plan compile
    pub constructor: ActionConstructor,
}

/// Registry of action types.
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, ActionDescriptor>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action type. Refuses duplicates.
    pub fn register(&self, descriptor: ActionDescriptor) -> Result<()> {
        let mut actions = self
            .actions
            .write()
            .map_err(|_| Error::generic("action registry lock poisoned"))?;
        if actions.contains_key(&descriptor.name) {
            return Err(Error::config(format!(
                "action type {:?} already registered",
                descriptor.name
            )));
        }
        actions.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Whether the given type tag is registered.
    pub fn has_registered_action_type(&self, kind: &str) -> bool {
        self.actions.read().map(|a| a.contains_key(kind)).unwrap_or(false)
    }

    /// Field metadata for a registered action type, for schema
    /// generation.
    pub fn get_fields_for_action(&self, kind: &str) -> Option<BTreeMap<String, FieldInfo>> {
        self.actions.read().ok()?.get(kind).map(|d| d.fields.clone())
    }

    /// Construct an executable of the given type from its JSON config.
    pub fn get_action_executable(
        &self,
        kind: &str,
        config_json: &str,
    ) -> Result<Arc<dyn ActionExecutable>> {
        let constructor = {
            let actions = self
                .actions
                .read()
                .map_err(|_| Error::generic("action registry lock poisoned"))?;
            actions
                .get(kind)
                .map(|d| d.constructor)
                .ok_or_else(|| Error::config(format!("unknown action type {kind:?}")))?
        };
        constructor(config_json)
    }

    /// Schema-facing dump of every registered action, sorted by name.
    pub fn action_schemas(&self) -> Vec<ActionSchema> {
        let Ok(actions) = self.actions.read() else {
            return Vec::new();
        };
        let mut schemas: Vec<ActionSchema> = actions
            .values()
            .map(|d| ActionSchema {
                name: d.name.clone(),
                description: d.description.clone(),
                fields: d.fields.clone(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

/// Registry of integration types and configured instances.
#[derive(Default)]
pub struct IntegrationRegistry {
    types: RwLock<HashMap<String, IntegrationConstructor>>,
    instances: RwLock<HashMap<String, Arc<dyn Integration>>>,
}

impl IntegrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration type. Refuses duplicates.
    pub fn register_type(&self, kind: &str, constructor: IntegrationConstructor) -> Result<()> {
        let mut types = self
            .types
            .write()
            .map_err(|_| Error::generic("integration registry lock poisoned"))?;
        if types.contains_key(kind) {
            return Err(Error::config(format!(
                "integration type {kind:?} already registered"
            )));
        }
        types.insert(kind.to_string(), constructor);
        Ok(())
    }

    /// Construct one integration instance under an operator-chosen ID.
    /// Init-time only; instances are immutable afterwards.
    pub fn init_instance(&self, id: &str, kind: &str, config: &Value) -> Result<()> {
        let constructor = {
            let types = self
                .types
                .read()
                .map_err(|_| Error::generic("integration registry lock poisoned"))?;
            *types
                .get(kind)
                .ok_or_else(|| Error::integration(format!("unknown integration type {kind:?}")))?
        };
        let instance = constructor(config)?;
        let mut instances = self
            .instances
            .write()
            .map_err(|_| Error::generic("integration registry lock poisoned"))?;
        if instances.contains_key(id) {
            return Err(Error::integration(format!("integration {id:?} already configured")));
        }
        instances.insert(id.to_string(), instance);
        Ok(())
    }

    /// Look up a configured integration by ID.
    pub fn get_integration(&self, id: &str) -> Option<Arc<dyn Integration>> {
        self.instances.read().ok()?.get(id).cloned()
    }
}

static GLOBAL_ACTIONS: Lazy<ActionRegistry> = Lazy::new(ActionRegistry::new);
static GLOBAL_INTEGRATIONS: Lazy<IntegrationRegistry> = Lazy::new(IntegrationRegistry::new);

/// Process-wide action registry.
pub fn global_actions() -> &'static ActionRegistry {
    &GLOBAL_ACTIONS
}

/// Process-wide integration registry.
pub fn global_integrations() -> &'static IntegrationRegistry {
    &GLOBAL_INTEGRATIONS
}
