//! The `stub` action: returns its rendered config object unchanged.
//!
//! Useful for wiring endpoints before real actions exist and as the
//! workhorse of integration tests.

use async_trait::async_trait;
use serde_json::Value;
use servflow_core::{ActionDescriptor, ActionExecutable, RequestContext, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

struct StubAction {
    config: String,
}

#[async_trait]
impl ActionExecutable for StubAction {
    fn action_type(&self) -> &str {
        "stub"
    }

    fn config_template(&self) -> String {
        self.config.clone()
    }

    async fn execute(&self, _ctx: &RequestContext, rendered_config: &str) -> Result<Value> {
        if rendered_config.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(rendered_config) {
            Ok(value) => Ok(value),
            // Substituted values can break strict JSON; fall back to the
            // raw string rather than failing the step.
            Err(_) => Ok(Value::String(rendered_config.to_string())),
        }
    }
}

fn construct(config: &str) -> Result<Arc<dyn ActionExecutable>> {
    Ok(Arc::new(StubAction {
        config: config.to_string(),
    }))
}

pub(crate) fn descriptor() -> ActionDescriptor {
    ActionDescriptor {
        name: "stub".to_string(),
        description: "Returns its rendered config object unchanged".to_string(),
        fields: BTreeMap::new(),
        constructor: construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn returns_rendered_config_as_value() {
        let exec = construct(r#"{"message": "{{ .greeting }}"}"#).unwrap();
        assert_eq!(exec.config_template(), r#"{"message": "{{ .greeting }}"}"#);

        let ctx = RequestContext::new("request_test");
        let value = exec.execute(&ctx, r#"{"message": "hello"}"#).await.unwrap();
        assert_eq!(value, json!({"message": "hello"}));
    }

    #[tokio::test]
    async fn empty_config_yields_null() {
        let exec = construct("").unwrap();
        let ctx = RequestContext::new("request_test");
        assert_eq!(exec.execute(&ctx, "  ").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn non_json_render_falls_back_to_string() {
        let exec = construct("whatever").unwrap();
        let ctx = RequestContext::new("request_test");
        let value = exec.execute(&ctx, "not { json").await.unwrap();
        assert_eq!(value, json!("not { json"));
    }
}
