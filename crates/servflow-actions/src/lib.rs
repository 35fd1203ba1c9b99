//! # Servflow Actions
//!
//! Built-in action executables and integrations.
//!
//! Every action registers itself with type tag, description and field
//! metadata so the schema generator can describe its configuration.
//! Registration happens once at process start via
//! [`register_builtin_actions`] and [`register_builtin_integrations`].

mod agent;
mod fetch;
mod http;
mod jwt;
mod store;
mod stub;

pub mod integrations;

pub use agent::AgentSession;

use servflow_core::{ActionRegistry, IntegrationRegistry, Result};

/// Register every built-in action type. Call once at process start;
/// duplicate registration is refused by the registry.
pub fn register_builtin_actions(registry: &ActionRegistry) -> Result<()> {
    registry.register(stub::descriptor())?;
    registry.register(http::descriptor())?;
    registry.register(fetch::descriptor())?;
    registry.register(store::descriptor())?;
    registry.register(jwt::descriptor())?;
    registry.register(agent::descriptor())?;
    Ok(())
}

/// Register every built-in integration type. Call once at process start.
pub fn register_builtin_integrations(registry: &IntegrationRegistry) -> Result<()> {
    registry.register_type("openai", integrations::openai::construct)?;
    registry.register_type("sqlite", integrations::sqlite::construct)?;
    Ok(())
}
