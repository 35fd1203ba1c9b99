//! Plan compilation: turn an `ApiConfig` into an immutable step graph.

use super::response::ResponseBuilder;
use super::step::{ActionStep, ConditionalStep, ResponseStep, Step};
use super::{normalize_ref, parse_ref, Plan, StepKind};
use crate::condition::synthesize_expression;
use crate::error::{Error, Result};
use crate::registry::ActionRegistry;
use servflow_config::ApiConfig;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Compiles one `ApiConfig` into a [`Plan`].
///
/// Steps are generated lazily via memoized recursion keyed by prefixed
/// ID, so shared downstream steps compile once. Every failure names the
/// offending ID; a failed compile leaves no plan.
pub struct Planner<'a> {
    config: &'a ApiConfig,
    registry: &'a ActionRegistry,
    steps: HashMap<String, Step>,
    in_progress: HashSet<String>,
}

impl<'a> Planner<'a> {
    /// Create a planner over a config and an action registry.
    pub fn new(config: &'a ApiConfig, registry: &'a ActionRegistry) -> Self {
        Self {
            config,
            registry,
            steps: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Compile every declared step, validating all cross-references.
    pub fn compile(mut self) -> Result<Plan> {
        let mut refs: Vec<String> = Vec::new();
        refs.extend(self.config.actions.keys().map(|id| format!("action.{id}")));
        refs.extend(self.config.conditionals.keys().map(|id| format!("conditional.{id}")));
        refs.extend(self.config.responses.keys().map(|id| format!("response.{id}")));
        refs.sort();

        for reference in refs {
            self.build_ref(&reference)?;
        }
        // Entry references must resolve too.
        let config: &'a ApiConfig = self.config;
        if let Some(http) = &config.http {
            self.build_ref(&http.next)?;
        }
        if let Some(tool) = &config.mcp_tool {
            self.build_ref(&tool.next)?;
        }
        debug!(api = %self.config.id, steps = self.steps.len(), "plan compiled");
        Ok(Plan::new(self.config.id.clone(), self.steps))
    }

    /// Resolve one reference into an edge, generating the target step if
    /// it has not been built yet. Empty references and the terminate tag
    /// resolve to no edge; references to missing steps are fatal.
    fn build_ref(&mut self, raw: &str) -> Result<Option<String>> {
        let Some(reference) = normalize_ref(raw) else {
            return Ok(None);
        };
        let reference = reference.to_string();
        if self.steps.contains_key(&reference) || self.in_progress.contains(&reference) {
            return Ok(Some(reference));
        }

        let (kind, id) = parse_ref(&reference).ok_or_else(|| {
            Error::config(format!(
                "api {:?}: invalid step reference {reference:?}",
                self.config.id
            ))
        })?;
        let id = id.to_string();

        self.in_progress.insert(reference.clone());
        let step = match kind {
            StepKind::Action => self.generate_action(&id)?,
            StepKind::Conditional => self.generate_conditional(&id)?,
            StepKind::Response => self.generate_response(&id)?,
        };
        self.in_progress.remove(&reference);
        self.steps.insert(reference.clone(), step);
        Ok(Some(reference))
    }

    fn generate_action(&mut self, id: &str) -> Result<Step> {
        let config: &'a ApiConfig = self.config;
        let descriptor = config.actions.get(id).ok_or_else(|| {
            Error::config(format!(
                "api {:?}: referenced action {id:?} not found",
                config.id
            ))
        })?;
        if !self.registry.has_registered_action_type(&descriptor.kind) {
            return Err(Error::config(format!(
                "api {:?}: action {id:?} has unknown type {:?}",
                config.id, descriptor.kind
            )));
        }
        let config_json = serde_json::to_string(&descriptor.config)?;
        let exec = self
            .registry
            .get_action_executable(&descriptor.kind, &config_json)
            .map_err(|e| {
                Error::config(format!(
                    "api {:?}: action {id:?} construction failed: {e}",
                    config.id
                ))
            })?;

        let next = self.build_ref(&descriptor.next)?;
        let fail = self.build_ref(&descriptor.fail)?;
        Ok(Step::Action(ActionStep::new(id, exec, next, fail)))
    }

    fn generate_conditional(&mut self, id: &str) -> Result<Step> {
        let config: &'a ApiConfig = self.config;
        let descriptor = config.conditionals.get(id).ok_or_else(|| {
            Error::config(format!(
                "api {:?}: referenced conditional {id:?} not found",
                config.id
            ))
        })?;
        let expression = if descriptor.is_structured() {
            synthesize_expression(&descriptor.structure).map_err(|e| {
                Error::config(format!("api {:?}: conditional {id:?}: {e}", config.id))
            })?
        } else {
            descriptor.expression.clone()
        };

        let on_valid = self.build_ref(&descriptor.on_true)?;
        let on_invalid = self.build_ref(&descriptor.on_false)?;
        Ok(Step::Conditional(ConditionalStep {
            id: id.to_string(),
            expression,
            on_valid,
            on_invalid,
        }))
    }

    fn generate_response(&mut self, id: &str) -> Result<Step> {
        let config: &'a ApiConfig = self.config;
        let descriptor = config.responses.get(id).ok_or_else(|| {
            Error::config(format!(
                "api {:?}: referenced response {id:?} not found",
                config.id
            ))
        })?;
        if !(100..=999).contains(&descriptor.code) {
            return Err(Error::config(format!(
                "api {:?}: response {id:?} code {} outside 100..=999",
                config.id, descriptor.code
            )));
        }

        let object_populated =
            descriptor.object.as_ref().is_some_and(|o| !o.is_empty());
        let builder = match descriptor.kind.as_deref() {
            Some("template") => ResponseBuilder::Template {
                code: descriptor.code,
                template: descriptor.template.clone().unwrap_or_default(),
            },
            Some("json_object") => ResponseBuilder::JsonObject {
                code: descriptor.code,
                object: descriptor.object.clone().unwrap_or_default(),
            },
            Some(other) => {
                return Err(Error::config(format!(
                    "api {:?}: response {id:?} has unknown builder type {other:?}",
                    self.config.id
                )))
            }
            None if object_populated => ResponseBuilder::JsonObject {
                code: descriptor.code,
                object: descriptor.object.clone().unwrap_or_default(),
            },
            None => ResponseBuilder::Template {
                code: descriptor.code,
                template: descriptor.template.clone().unwrap_or_default(),
            },
        };
        Ok(Step::Response(ResponseStep {
            id: id.to_string(),
            builder,
        }))
    }
}
