//! The `store` action: persist a document through a storage-capable
//! integration.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use servflow_config::{FieldInfo, FieldType};
use servflow_core::{
    global_integrations, ActionDescriptor, ActionExecutable, Error, Integration, RequestContext,
    Result, StoreOptions,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct StoreConfig {
    #[serde(default)]
    integration: String,
    collection: String,
    data: Value,
}

struct StoreAction {
    config: String,
    integration: Arc<dyn Integration>,
}

#[async_trait]
impl ActionExecutable for StoreAction {
    fn action_type(&self) -> &str {
        "store"
    }

    fn config_template(&self) -> String {
        self.config.clone()
    }

    async fn execute(&self, _ctx: &RequestContext, rendered_config: &str) -> Result<Value> {
        let config: StoreConfig = serde_json::from_str(rendered_config)
            .map_err(|e| Error::generic(format!("store action: invalid config: {e}")))?;
        let backend = self
            .integration
            .as_store()
            .ok_or_else(|| Error::integration("store action: integration lost store capability"))?;
        backend
            .store(
                config.data.clone(),
                StoreOptions {
                    collection: config.collection.clone(),
                },
            )
            .await?;
        Ok(json!({"stored": true, "collection": config.collection}))
    }
}

fn construct(config: &str) -> Result<Arc<dyn ActionExecutable>> {
    let parsed: StoreConfig = serde_json::from_str(config)
        .map_err(|e| Error::config(format!("store action: invalid config: {e}")))?;
    let integration = global_integrations()
        .get_integration(&parsed.integration)
        .ok_or_else(|| {
            Error::config(format!(
                "store action: integration {:?} not configured",
                parsed.integration
            ))
        })?;
    if integration.as_store().is_none() {
        return Err(Error::config(format!(
            "store action: integration {:?} does not support store",
            parsed.integration
        )));
    }
    Ok(Arc::new(StoreAction {
        config: config.to_string(),
        integration,
    }))
}

pub(crate) fn descriptor() -> ActionDescriptor {
    let mut fields = BTreeMap::new();
    fields.insert(
        "integration".to_string(),
        FieldInfo {
            field_type: FieldType::Integration,
            label: "Integration ID".to_string(),
            placeholder: String::new(),
            required: true,
            default: None,
            values: Vec::new(),
        },
    );
    fields.insert("collection".to_string(), FieldInfo::required_string("Collection to write"));
    fields.insert(
        "data".to_string(),
        FieldInfo::optional(FieldType::Map, "Document to persist"),
    );
    ActionDescriptor {
        name: "store".to_string(),
        description: "Persists a document through a storage integration".to_string(),
        fields,
        constructor: construct,
    }
}
