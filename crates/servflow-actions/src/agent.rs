//! The `agent` action: LLM calls with persisted conversation history.
//!
//! A session hydrates prior messages from the append-only log, produces
//! a stream of partial outputs on a bounded channel, and writes every
//! emitted message back to the log. The consumer either concatenates the
//! stream (default) or keeps only the last part; an error on the channel
//! is a terminating event.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use servflow_config::{FieldInfo, FieldType};
use servflow_core::conversation::{Conversation, ConversationMessage};
use servflow_core::{
    default_storage, global_integrations, ActionDescriptor, ActionExecutable, ChatMessage, Error,
    Integration, LlmRequest, RequestContext, Result,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Deserialize)]
struct AgentConfig {
    #[serde(default)]
    integration: String,
    prompt: String,
    #[serde(default)]
    system: String,
    #[serde(default)]
    conversation_id: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default)]
    model: Option<String>,
}

fn default_mode() -> String {
    "concat".to_string()
}

/// One agent run: a provider, optional persisted history, and the
/// channel-producing loop.
pub struct AgentSession {
    provider: Arc<dyn Integration>,
    conversation: Option<Conversation>,
    system: String,
    model: Option<String>,
}

impl AgentSession {
    /// Build a session, hydrating the conversation when an ID is given.
    pub fn new(
        provider: Arc<dyn Integration>,
        conversation_id: &str,
        system: String,
        model: Option<String>,
    ) -> Result<Self> {
        let conversation = if conversation_id.is_empty() {
            None
        } else {
            let storage = default_storage()?;
            let conversation = Conversation::load(storage, conversation_id)?;
            debug!(
                conversation = %conversation_id,
                prior_messages = conversation.messages().len(),
                "hydrated conversation"
            );
            Some(conversation)
        };
        Ok(Self {
            provider,
            conversation,
            system,
            model,
        })
    }

    /// Run the session for one prompt. Partial outputs arrive in order
    /// on the returned channel; the stream is finite and an `Err` item
    /// terminates it.
    pub fn run(mut self, prompt: String) -> mpsc::Receiver<Result<String>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            if let Err(e) = self.step(&tx, prompt).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        rx
    }

    async fn step(&mut self, tx: &mpsc::Sender<Result<String>>, prompt: String) -> Result<()> {
        let mut messages: Vec<ChatMessage> = self
            .conversation
            .as_ref()
            .map(Conversation::chat_messages)
            .unwrap_or_default();
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.clone(),
        });
        if let Some(conversation) = &mut self.conversation {
            conversation.append(ConversationMessage::UserMessage { content: prompt })?;
        }

        let provider = self
            .provider
            .as_llm_provider()
            .ok_or_else(|| Error::integration("agent action: integration is not an LLM provider"))?;
        let response = provider
            .provide_response(LlmRequest {
                system: self.system.clone(),
                messages,
                model: self.model.clone(),
            })
            .await?;

        if let Some(conversation) = &mut self.conversation {
            conversation.append(ConversationMessage::AssistantMessage {
                content: response.content.clone(),
            })?;
        }
        if tx.send(Ok(response.content)).await.is_err() {
            warn!("agent output receiver dropped before completion");
        }
        Ok(())
    }
}

/// Drain a session's output stream: concatenate every part, or keep only
/// the last when `last_only` is set.
pub(crate) async fn collect_output(
    mut rx: mpsc::Receiver<Result<String>>,
    last_only: bool,
) -> Result<String> {
    let mut collected = String::new();
    while let Some(part) = rx.recv().await {
        let part = part?;
        if last_only {
            collected = part;
        } else {
            collected.push_str(&part);
        }
    }
    Ok(collected)
}

struct AgentAction {
    config: String,
    integration: Arc<dyn Integration>,
}

#[async_trait]
impl ActionExecutable for AgentAction {
    fn action_type(&self) -> &str {
        "agent"
    }

    fn config_template(&self) -> String {
        self.config.clone()
    }

    async fn execute(&self, ctx: &RequestContext, rendered_config: &str) -> Result<Value> {
        let config: AgentConfig = serde_json::from_str(rendered_config)
            .map_err(|e| Error::generic(format!("agent action: invalid config: {e}")))?;
        let session = AgentSession::new(
            Arc::clone(&self.integration),
            &config.conversation_id,
            config.system,
            config.model,
        )?;
        debug!(request_id = %ctx.request_id(), mode = %config.mode, "agent run starting");
        let rx = session.run(config.prompt);
        let response = collect_output(rx, config.mode == "last").await?;
        Ok(json!({
            "response": response,
            "conversation_id": config.conversation_id,
        }))
    }
}

fn construct(config: &str) -> Result<Arc<dyn ActionExecutable>> {
    let parsed: AgentConfig = serde_json::from_str(config)
        .map_err(|e| Error::config(format!("agent action: invalid config: {e}")))?;
    match parsed.mode.as_str() {
        "concat" | "last" => {}
        templated if templated.contains("{{") => {}
        other => return Err(Error::config(format!("agent action: unknown mode {other:?}"))),
    }
    let integration = global_integrations()
        .get_integration(&parsed.integration)
        .ok_or_else(|| {
            Error::config(format!(
                "agent action: integration {:?} not configured",
                parsed.integration
            ))
        })?;
    if integration.as_llm_provider().is_none() {
        return Err(Error::config(format!(
            "agent action: integration {:?} is not an LLM provider",
            parsed.integration
        )));
    }
    Ok(Arc::new(AgentAction {
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
            label: "LLM integration ID".to_string(),
            placeholder: String::new(),
            required: true,
            default: None,
            values: Vec::new(),
        },
    );
    fields.insert(
        "prompt".to_string(),
        FieldInfo {
            field_type: FieldType::Textarea,
            label: "Prompt".to_string(),
            placeholder: String::new(),
            required: true,
            default: None,
            values: Vec::new(),
        },
    );
    fields.insert(
        "system".to_string(),
        FieldInfo::optional(FieldType::Textarea, "System prompt"),
    );
    fields.insert(
        "conversation_id".to_string(),
        FieldInfo::optional(FieldType::String, "Conversation ID for persisted history"),
    );
    fields.insert(
        "mode".to_string(),
        FieldInfo::optional(FieldType::String, "Output mode")
            .with_default(json!("concat"))
            .with_values(vec!["concat".to_string(), "last".to_string()]),
    );
    fields.insert(
        "model".to_string(),
        FieldInfo::optional(FieldType::String, "Model override"),
    );
    ActionDescriptor {
        name: "agent".to_string(),
        description: "Calls an LLM provider with persisted conversation history".to_string(),
        fields,
        constructor: construct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use servflow_core::{LlmProvider, LlmResponse};

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn provide_response(&self, request: LlmRequest) -> Result<LlmResponse> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(LlmResponse {
                content: format!("echo: {last} ({} prior)", request.messages.len() - 1),
            })
        }
    }

    struct EchoIntegration;

    impl Integration for EchoIntegration {
        fn integration_type(&self) -> &str {
            "echo"
        }
        fn as_llm_provider(&self) -> Option<&dyn LlmProvider> {
            Some(&EchoProvider)
        }
    }

    #[tokio::test]
    async fn session_streams_in_order_and_terminates() {
        let session =
            AgentSession::new(Arc::new(EchoIntegration), "", String::new(), None).unwrap();
        let rx = session.run("hello".to_string());
        let output = collect_output(rx, false).await.unwrap();
        assert_eq!(output, "echo: hello (0 prior)");
    }

    #[tokio::test]
    async fn action_returns_response_value() {
        let action = AgentAction {
            config: String::new(),
            integration: Arc::new(EchoIntegration),
        };
        let ctx = RequestContext::new("request_test");
        let value = action
            .execute(&ctx, r#"{"integration": "x", "prompt": "hi"}"#)
            .await
            .unwrap();
        assert_eq!(value["response"], json!("echo: hi (0 prior)"));
    }

    #[tokio::test]
    async fn last_mode_keeps_final_part() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("a".to_string())).await.unwrap();
        tx.send(Ok("b".to_string())).await.unwrap();
        drop(tx);
        assert_eq!(collect_output(rx, true).await.unwrap(), "b");

        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("a".to_string())).await.unwrap();
        tx.send(Ok("b".to_string())).await.unwrap();
        drop(tx);
        assert_eq!(collect_output(rx, false).await.unwrap(), "ab");
    }

    #[tokio::test]
    async fn error_terminates_the_stream() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok("partial".to_string())).await.unwrap();
        tx.send(Err(Error::generic("provider down"))).await.unwrap();
        drop(tx);
        let err = collect_output(rx, false).await.unwrap_err();
        assert!(err.to_string().contains("provider down"));
    }

    #[test]
    fn unknown_mode_fails_construction() {
        let err = construct(r#"{"integration": "missing", "prompt": "p", "mode": "stream"}"#)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown mode"));
    }
}
