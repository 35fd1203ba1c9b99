//! The `fetch` action: query documents through a storage-capable
//! integration.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use servflow_config::{FieldInfo, FieldType};
use servflow_core::{
    global_integrations, ActionDescriptor, ActionExecutable, Error, FetchOptions, Integration,
    RequestContext, Result,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct FetchConfig {
    #[serde(default)]
    integration: String,
    collection: String,
    #[serde(default)]
    filters: HashMap<String, Value>,
    #[serde(default)]
    limit: Option<String>,
}

struct FetchAction {
    config: String,
    integration: Arc<dyn Integration>,
}

#[async_trait]
impl ActionExecutable for FetchAction {
    fn action_type(&self) -> &str {
        "fetch"
    }

    fn config_template(&self) -> String {
        self.config.clone()
    }

    async fn execute(&self, _ctx: &RequestContext, rendered_config: &str) -> Result<Value> {
        let config: FetchConfig = serde_json::from_str(rendered_config)
            .map_err(|e| Error::generic(format!("fetch action: invalid config: {e}")))?;
        let fetcher = self
            .integration
            .as_fetcher()
            .ok_or_else(|| Error::integration("fetch action: integration lost fetch capability"))?;
        let limit = match config.limit.as_deref() {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<usize>().map_err(|e| {
                Error::generic(format!("fetch action: invalid limit {raw:?}: {e}"))
            })?),
            _ => None,
        };
        let documents = fetcher
            .fetch(FetchOptions {
                collection: config.collection,
                filters: config.filters,
                limit,
            })
            .await?;
        Ok(Value::Array(documents))
    }
}

fn construct(config: &str) -> Result<Arc<dyn ActionExecutable>> {
    let parsed: FetchConfig = serde_json::from_str(config)
        .map_err(|e| Error::config(format!("fetch action: invalid config: {e}")))?;
    let integration = global_integrations()
        .get_integration(&parsed.integration)
        .ok_or_else(|| {
            Error::config(format!(
                "fetch action: integration {:?} not configured",
                parsed.integration
            ))
        })?;
    if integration.as_fetcher().is_none() {
        return Err(Error::config(format!(
            "fetch action: integration {:?} does not support fetch",
            parsed.integration
        )));
    }
    Ok(Arc::new(FetchAction {
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
    fields.insert("collection".to_string(), FieldInfo::required_string("Collection to query"));
    fields.insert(
        "filters".to_string(),
        FieldInfo::optional(FieldType::Map, "Equality filters on document fields"),
    );
    fields.insert(
        "limit".to_string(),
        FieldInfo::optional(FieldType::String, "Maximum documents to return"),
    );
    ActionDescriptor {
        name: "fetch".to_string(),
        description: "Queries documents from a storage integration".to_string(),
        fields,
        constructor: construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::sqlite::SqliteIntegration;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_round_trips_through_integration() {
        let integration: Arc<dyn Integration> = Arc::new(SqliteIntegration::in_memory().unwrap());
        let store = integration.as_store().unwrap();
        store
            .store(
                json!({"name": "alice", "age": 30}),
                servflow_core::StoreOptions { collection: "users".to_string() },
            )
            .await
            .unwrap();
        store
            .store(
                json!({"name": "bob", "age": 31}),
                servflow_core::StoreOptions { collection: "users".to_string() },
            )
            .await
            .unwrap();

        let action = FetchAction {
            config: String::new(),
            integration,
        };
        let ctx = RequestContext::new("request_test");
        let result = action
            .execute(
                &ctx,
                r#"{"integration": "ignored", "collection": "users", "filters": {"name": "alice"}}"#,
            )
            .await
            .unwrap();
        assert_eq!(result, json!([{"name": "alice", "age": 30}]));
    }

    #[test]
    fn construction_fails_for_unknown_integration() {
        let err = construct(r#"{"integration": "nope", "collection": "users"}"#)
            .err()
            .unwrap();
        assert!(err.to_string().contains("not configured"));
    }
}
