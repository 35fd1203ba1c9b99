//! OpenAI-compatible chat-completions integration.
//!
//! Implements the [`LlmProvider`] capability against any endpoint
//! speaking the `/chat/completions` wire format.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use servflow_core::{Error, Integration, LlmProvider, LlmRequest, LlmResponse, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Deserialize)]
struct OpenAiConfig {
    api_key: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

/// OpenAI-compatible LLM client.
pub struct OpenAiIntegration {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Integration for OpenAiIntegration {
    fn integration_type(&self) -> &str {
        "openai"
    }

    fn as_llm_provider(&self) -> Option<&dyn LlmProvider> {
        Some(self)
    }
}

#[async_trait]
impl LlmProvider for OpenAiIntegration {
    async fn provide_response(&self, request: LlmRequest) -> Result<LlmResponse> {
        let mut messages: Vec<Value> = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        for message in &request.messages {
            messages.push(json!({"role": message.role, "content": message.content}));
        }

        let model = request.model.as_deref().unwrap_or(&self.model);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %model, messages = messages.len(), "chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({"model": model, "messages": messages}))
            .send()
            .await
            .map_err(|e| Error::integration(format!("openai: request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::integration(format!("openai: invalid response body: {e}")))?;
        if !status.is_success() {
            let detail = body["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(Error::integration(format!("openai: {status}: {detail}")));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::integration("openai: response has no message content"))?;
        Ok(LlmResponse {
            content: content.to_string(),
        })
    }
}

/// Construct an OpenAI integration from its declared config.
pub fn construct(config: &Value) -> Result<Arc<dyn Integration>> {
    let parsed: OpenAiConfig = serde_json::from_value(config.clone())
        .map_err(|e| Error::config(format!("openai integration: invalid config: {e}")))?;
    if parsed.api_key.is_empty() {
        return Err(Error::config("openai integration: api_key is required"));
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| Error::config(format!("openai integration: building client: {e}")))?;
    Ok(Arc::new(OpenAiIntegration {
        client,
        api_key: parsed.api_key,
        model: parsed.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        base_url: parsed.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    }))
}
