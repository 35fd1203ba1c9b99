//! Compiled plans and the execution engine.
//!
//! A [`Plan`] is an immutable map of prefixed step IDs
//! (`action.<id>`, `conditional.<id>`, `response.<id>`) to compiled
//! steps, built once per API config and shared read-only across
//! requests. [`Plan::execute`] walks the graph from an entry reference
//! until a response step terminates the request or an edge runs out.

mod planner;
mod response;
mod step;

pub use planner::Planner;
pub use response::{PlanOutput, ResponseBuilder};
pub use step::{ActionStep, ConditionalStep, ResponseStep, Step};

use crate::context::RequestContext;
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

/// Tag that, like the empty reference, terminates the walk.
pub const TERMINATE_TAG: &str = "terminate";

/// The three step kinds a reference can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// `action.<id>`
    Action,
    /// `conditional.<id>`
    Conditional,
    /// `response.<id>`
    Response,
}

/// Normalize a step reference: trim whitespace and strip the legacy `$`
/// prefix. Returns `None` for the empty reference and the terminate tag.
pub fn normalize_ref(raw: &str) -> Option<&str> {
    let trimmed = raw.trim().trim_start_matches('$');
    if trimmed.is_empty() || trimmed == TERMINATE_TAG {
        None
    } else {
        Some(trimmed)
    }
}

/// Split a normalized reference into its kind and bare ID.
pub fn parse_ref(reference: &str) -> Option<(StepKind, &str)> {
    let (prefix, id) = reference.split_once('.')?;
    let kind = match prefix {
        "action" => StepKind::Action,
        "conditional" => StepKind::Conditional,
        "response" => StepKind::Response,
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }
    Some((kind, id))
}

/// Compiled, immutable step graph for one API config.
pub struct Plan {
    api_id: String,
    steps: HashMap<String, Step>,
}

impl Plan {
    pub(crate) fn new(api_id: String, steps: HashMap<String, Step>) -> Self {
        Self { api_id, steps }
    }

    /// ID of the API this plan was compiled from.
    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    /// All prefixed step IDs in this plan.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Look up a compiled step by prefixed ID.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    /// Walk the graph from `entry` until a response step produces output
    /// or an edge runs out.
    ///
    /// When the walk terminates without a response, the optional
    /// `end_value` template is rendered into a zero-status, body-only
    /// output. An unrecovered action failure terminates the walk the
    /// same way: the end-value template is still rendered before the
    /// sentinel surfaces.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        entry: &str,
        end_value: Option<&str>,
    ) -> Result<PlanOutput> {
        let mut current = normalize_ref(entry).map(str::to_string);
        let mut walk_error = None;
        while let Some(id) = current {
            let step = self.steps.get(&id).ok_or_else(|| {
                Error::config(format!("api {:?}: step {id:?} not found in plan", self.api_id))
            })?;
            debug!(request_id = %ctx.request_id(), step = %id, "executing step");
            match step {
                Step::Response(response) => return response.build(ctx),
                Step::Action(action) => match action.execute(ctx).await {
                    Ok(next) => current = next,
                    Err(e) if e.is_action_execution() => {
                        walk_error = Some(e);
                        break;
                    }
                    Err(e) => return Err(e),
                },
                Step::Conditional(conditional) => current = conditional.execute(ctx)?,
            }
        }

        let body = match end_value {
            Some(template) if !template.is_empty() => ctx.render(template)?,
            _ => String::new(),
        };
        if let Some(e) = walk_error {
            return Err(e);
        }
        Ok(PlanOutput::body_only(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_legacy_prefix() {
        assert_eq!(normalize_ref("$action.a"), Some("action.a"));
        assert_eq!(normalize_ref(" action.a "), Some("action.a"));
    }

    #[test]
    fn normalize_terminates_on_empty_and_tag() {
        assert_eq!(normalize_ref(""), None);
        assert_eq!(normalize_ref("  "), None);
        assert_eq!(normalize_ref("terminate"), None);
        assert_eq!(normalize_ref("$terminate"), None);
    }

    #[test]
    fn parse_ref_dispatches_on_prefix() {
        assert_eq!(parse_ref("action.greet"), Some((StepKind::Action, "greet")));
        assert_eq!(parse_ref("conditional.check"), Some((StepKind::Conditional, "check")));
        assert_eq!(parse_ref("response.ok"), Some((StepKind::Response, "ok")));
        assert_eq!(parse_ref("bogus.x"), None);
        assert_eq!(parse_ref("action."), None);
        assert_eq!(parse_ref("noprefix"), None);
    }
}
