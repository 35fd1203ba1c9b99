//! Contracts at the engine boundary: action executables and
//! integrations.
//!
//! Executables are the open set of action implementations; integrations
//! are long-lived configured clients (databases, LLM providers, vector
//! stores). Both are trait objects. Integrations expose narrow
//! capabilities through accessor methods that actions probe at
//! construction time.

use crate::context::RequestContext;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// The capability an external action implementation must satisfy.
#[async_trait]
pub trait ActionExecutable: Send + Sync {
    /// Registered type tag.
    fn action_type(&self) -> &str;

    /// Config-template string, frozen at plan compile; may contain
    /// `{{ ... }}` expressions rendered per request.
    fn config_template(&self) -> String;

    /// Run the action against the rendered config. The returned value is
    /// stored under the action's output variable.
    async fn execute(&self, ctx: &RequestContext, rendered_config: &str) -> Result<Value>;
}

/// A long-lived configured client to an external system.
///
/// Integrations are process-wide, immutable after init, and shared
/// across requests. Actions probe for the capability they need via the
/// `as_*` accessors and fail construction when it is absent.
pub trait Integration: Send + Sync {
    /// Registered type tag.
    fn integration_type(&self) -> &str;

    /// LLM capability, when supported.
    fn as_llm_provider(&self) -> Option<&dyn LlmProvider> {
        None
    }

    /// Document-fetch capability, when supported.
    fn as_fetcher(&self) -> Option<&dyn Fetcher> {
        None
    }

    /// Document-store capability, when supported.
    fn as_store(&self) -> Option<&dyn StoreBackend> {
        None
    }
}

/// One chat message exchanged with an LLM provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
}

/// Request passed to an LLM provider.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Optional system prompt
    pub system: String,
    /// Conversation history, oldest first
    pub messages: Vec<ChatMessage>,
    /// Provider-specific model override
    pub model: Option<String>,
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub content: String,
}

/// LLM capability.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce a completion for the given request.
    async fn provide_response(&self, request: LlmRequest) -> Result<LlmResponse>;
}

/// Options for a document fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Collection / table to query
    pub collection: String,
    /// Equality filters on document fields
    pub filters: HashMap<String, Value>,
    /// Maximum number of documents to return
    pub limit: Option<usize>,
}

/// Document-fetch capability.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Return documents matching the filters.
    async fn fetch(&self, opts: FetchOptions) -> Result<Vec<Value>>;
}

/// Options for a document store.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Collection / table to write into
    pub collection: String,
}

/// Document-store capability.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Persist one document.
    async fn store(&self, data: Value, opts: StoreOptions) -> Result<()>;
}
