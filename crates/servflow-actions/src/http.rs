//! The `http` action: one outbound HTTP request per execution.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use servflow_config::{FieldInfo, FieldType};
use servflow_core::{ActionDescriptor, ActionExecutable, Error, RequestContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

struct HttpAction {
    config: String,
    client: reqwest::Client,
}

#[async_trait]
impl ActionExecutable for HttpAction {
    fn action_type(&self) -> &str {
        "http"
    }

    fn config_template(&self) -> String {
        self.config.clone()
    }

    async fn execute(&self, ctx: &RequestContext, rendered_config: &str) -> Result<Value> {
        let config: HttpConfig = serde_json::from_str(rendered_config)
            .map_err(|e| Error::generic(format!("http action: invalid config: {e}")))?;

        let method = reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|e| Error::generic(format!("http action: invalid method {:?}: {e}", config.method)))?;

        let mut request = self.client.request(method, &config.url);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &config.body {
            request = match body {
                Value::String(raw) => request.body(raw.clone()),
                other => request.json(other),
            };
        }
        if let Some(secs) = config.timeout_secs {
            request = request.timeout(Duration::from_secs(secs));
        }

        debug!(request_id = %ctx.request_id(), url = %config.url, "http action dispatching");
        let response = request
            .send()
            .await
            .map_err(|e| Error::generic(format!("http action: request failed: {e}")))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| Error::generic(format!("http action: reading body failed: {e}")))?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(json!({
            "status": status,
            "headers": headers,
            "body": body,
        }))
    }
}

fn construct(config: &str) -> Result<Arc<dyn ActionExecutable>> {
    // Presence check only: templated values are validated after
    // substitution at request time.
    let parsed: Value = serde_json::from_str(config)
        .map_err(|e| Error::config(format!("http action: config is not valid JSON: {e}")))?;
    if parsed.get("url").and_then(Value::as_str).is_none_or(str::is_empty) {
        return Err(Error::config("http action: \"url\" is required"));
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::config(format!("http action: building client: {e}")))?;
    Ok(Arc::new(HttpAction {
        config: config.to_string(),
        client,
    }))
}

pub(crate) fn descriptor() -> ActionDescriptor {
    let mut fields = BTreeMap::new();
    fields.insert(
        "url".to_string(),
        FieldInfo::required_string("Request URL").with_placeholder("https://api.example.com/users"),
    );
    fields.insert(
        "method".to_string(),
        FieldInfo::optional(FieldType::String, "HTTP method")
            .with_default(json!("GET"))
            .with_values(
                ["GET", "POST", "PUT", "DELETE", "PATCH"].iter().map(|m| m.to_string()).collect(),
            ),
    );
    fields.insert(
        "headers".to_string(),
        FieldInfo::optional(FieldType::Map, "Request headers"),
    );
    fields.insert(
        "body".to_string(),
        FieldInfo::optional(FieldType::Textarea, "Request body"),
    );
    fields.insert(
        "timeout_secs".to_string(),
        FieldInfo::optional(FieldType::String, "Request timeout in seconds"),
    );
    ActionDescriptor {
        name: "http".to_string(),
        description: "Performs an outbound HTTP request and stores the response".to_string(),
        fields,
        constructor: construct,
    }
}
