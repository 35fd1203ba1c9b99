//! # Servflow Core
//!
//! Engine logic for the Servflow declarative API gateway.
//!
//! Operators describe endpoints in YAML; this crate turns each
//! description into an executable graph of typed steps and walks that
//! graph per request:
//!
//! - **Plan compilation**: [`plan::Planner`] resolves `id → step`
//!   references and validates action configurations against the
//!   registry.
//! - **Step execution**: action, conditional and response steps, each
//!   reading and writing the per-request variable scope.
//! - **Templating**: the `{{ ... }}` substitution grammar with a fixed
//!   function library and request-scoped accessors.
//! - **Registries**: process-wide action and integration registries with
//!   field metadata for schema generation.
//! - **Storage**: SQLite-backed key-value store and append-only logs,
//!   including the agent conversation history.

pub mod condition;
pub mod context;
pub mod conversation;
mod error;
pub mod executable;
pub mod files;
pub mod plan;
pub mod registry;
pub mod storage;
pub mod template;

pub use context::{action_variable, RequestContext, ERROR_VARIABLE};
pub use error::{Error, Result};
pub use executable::{
    ActionExecutable, ChatMessage, Fetcher, FetchOptions, Integration, LlmProvider, LlmRequest,
    LlmResponse, StoreBackend, StoreOptions,
};
pub use files::FileValue;
pub use plan::{Plan, Planner, PlanOutput, ResponseBuilder, Step};
pub use registry::{
    global_actions, global_integrations, ActionConstructor, ActionDescriptor, ActionRegistry,
    IntegrationConstructor, IntegrationRegistry,
};
pub use storage::{default_storage, Storage, StorageOptions};
pub use template::{Scope, Template, TemplateFunc};
