//! Compiled step variants and their execution contracts.

use super::response::{PlanOutput, ResponseBuilder};
use crate::context::{action_variable, RequestContext, ERROR_VARIABLE};
use crate::error::{Error, Result};
use crate::executable::ActionExecutable;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// One compiled node of a plan.
pub enum Step {
    /// Invoke an executable, store its output, follow `next` or `fail`
    Action(ActionStep),
    /// Render a boolean expression and branch
    Conditional(ConditionalStep),
    /// Terminal: build the response
    Response(ResponseStep),
}

/// Compiled action step.
pub struct ActionStep {
    /// Bare step ID (no prefix)
    pub id: String,
    /// Config-template string frozen at compile, rendered per request
    pub config_template: String,
    /// The constructed executable
    pub exec: Arc<dyn ActionExecutable>,
    /// Variable the result is stored under
    pub output_variable: String,
    /// Step to follow on success
    pub next: Option<String>,
    /// Step to follow on failure
    pub fail: Option<String>,
}

impl ActionStep {
    pub(crate) fn new(
        id: &str,
        exec: Arc<dyn ActionExecutable>,
        next: Option<String>,
        fail: Option<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            config_template: exec.config_template(),
            exec,
            output_variable: action_variable(id),
            next,
            fail,
        }
    }

    /// Render the config template, run the executable, and return the
    /// next step reference.
    ///
    /// Failures are recovered through the `fail` edge when one exists;
    /// otherwise the action-execution sentinel propagates to the walker.
    pub async fn execute(&self, ctx: &RequestContext) -> Result<Option<String>> {
        let rendered = if self.config_template.is_empty() {
            String::new()
        } else {
            match ctx.render(&self.config_template) {
                Ok(rendered) => rendered,
                Err(e) => {
                    warn!(
                        request_id = %ctx.request_id(),
                        action = %self.id,
                        error = %e,
                        "config template rendering failed"
                    );
                    return match &self.fail {
                        Some(fail) => {
                            self.record_failure(ctx, &e);
                            Ok(Some(fail.clone()))
                        }
                        None => Err(e),
                    };
                }
            }
        };

        match self.exec.execute(ctx, &rendered).await {
            Ok(value) => {
                ctx.set_variable(&self.output_variable, value);
                Ok(self.next.clone())
            }
            Err(e) => {
                warn!(
                    request_id = %ctx.request_id(),
                    action = %self.id,
                    error = %e,
                    "action execution failed"
                );
                if e.is_fatal() {
                    return Err(e);
                }
                self.record_failure(ctx, &e);
                match &self.fail {
                    Some(fail) => Ok(Some(fail.clone())),
                    None => Err(Error::action_execution(self.id.clone(), e.to_string())),
                }
            }
        }
    }

    fn record_failure(&self, ctx: &RequestContext, error: &Error) {
        let message = error.to_string();
        ctx.set_variable(ERROR_VARIABLE, Value::String(message.clone()));
        ctx.set_variable(&self.output_variable, Value::String(message));
    }
}

/// Compiled conditional step.
pub struct ConditionalStep {
    /// Bare step ID (no prefix)
    pub id: String,
    /// Expression template; rendered result is compared to `"true"`
    pub expression: String,
    /// Step to follow on a `true` render
    pub on_valid: Option<String>,
    /// Step to follow otherwise
    pub on_invalid: Option<String>,
}

impl ConditionalStep {
    /// Render the expression and pick an edge. Validation errors
    /// accumulated during rendering are flushed into the `error`
    /// variable before branching.
    pub fn execute(&self, ctx: &RequestContext) -> Result<Option<String>> {
        if self.expression.is_empty() {
            return Ok(self.on_valid.clone());
        }
        let rendered = ctx.render(&self.expression)?;
        ctx.flush_validation_errors();
        if rendered.trim() == "true" {
            Ok(self.on_valid.clone())
        } else {
            Ok(self.on_invalid.clone())
        }
    }
}

/// Compiled response step.
pub struct ResponseStep {
    /// Bare step ID (no prefix)
    pub id: String,
    /// Builder producing the terminal output
    pub builder: ResponseBuilder,
}

impl ResponseStep {
    /// Produce the terminal output for this request.
    pub fn build(&self, ctx: &RequestContext) -> Result<PlanOutput> {
        self.builder.build(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedExec {
        config: String,
        result: std::result::Result<Value, String>,
    }

    #[async_trait]
    impl ActionExecutable for FixedExec {
        fn action_type(&self) -> &str {
            "fixed"
        }
        fn config_template(&self) -> String {
            self.config.clone()
        }
        async fn execute(&self, _ctx: &RequestContext, config: &str) -> Result<Value> {
            match &self.result {
                Ok(v) if v.is_null() && !config.is_empty() => {
                    Ok(serde_json::from_str(config).unwrap_or(Value::String(config.to_string())))
                }
                Ok(v) => Ok(v.clone()),
                Err(msg) => Err(Error::generic(msg.clone())),
            }
        }
    }

    fn ok_step(id: &str, value: Value, next: Option<&str>) -> ActionStep {
        ActionStep::new(
            id,
            Arc::new(FixedExec {
                config: String::new(),
                result: Ok(value),
            }),
            next.map(str::to_string),
            None,
        )
    }

    #[tokio::test]
    async fn success_stores_output_and_returns_next() {
        let ctx = RequestContext::new("request_test");
        let step = ok_step("greet", json!({"message": "hi"}), Some("response.ok"));
        let next = step.execute(&ctx).await.unwrap();
        assert_eq!(next.as_deref(), Some("response.ok"));
        assert_eq!(
            ctx.get_variable("variable_actions_greet"),
            Some(json!({"message": "hi"}))
        );
    }

    #[tokio::test]
    async fn failure_with_fail_edge_records_error() {
        let ctx = RequestContext::new("request_test");
        let step = ActionStep::new(
            "broken",
            Arc::new(FixedExec {
                config: String::new(),
                result: Err("boom".to_string()),
            }),
            Some("response.ok".to_string()),
            Some("response.err".to_string()),
        );
        let next = step.execute(&ctx).await.unwrap();
        assert_eq!(next.as_deref(), Some("response.err"));
        let error = ctx.get_variable(ERROR_VARIABLE).unwrap();
        assert!(error.as_str().unwrap().contains("boom"));
        let output = ctx.get_variable("variable_actions_broken").unwrap();
        assert!(output.as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn failure_without_fail_edge_is_sentinel() {
        let ctx = RequestContext::new("request_test");
        let step = ActionStep::new(
            "broken",
            Arc::new(FixedExec {
                config: String::new(),
                result: Err("boom".to_string()),
            }),
            None,
            None,
        );
        let err = step.execute(&ctx).await.unwrap_err();
        assert!(err.is_action_execution());
    }

    #[tokio::test]
    async fn fatal_error_bypasses_fail_edge() {
        let ctx = RequestContext::new("request_test");
        struct FatalExec;
        #[async_trait]
        impl ActionExecutable for FatalExec {
            fn action_type(&self) -> &str {
                "fatal"
            }
            fn config_template(&self) -> String {
                String::new()
            }
            async fn execute(&self, _ctx: &RequestContext, _config: &str) -> Result<Value> {
                Err(Error::fatal("unrecoverable"))
            }
        }
        let step = ActionStep::new(
            "doomed",
            Arc::new(FatalExec),
            Some("response.ok".to_string()),
            Some("response.err".to_string()),
        );
        let err = step.execute(&ctx).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn config_template_renders_against_context() {
        let ctx = RequestContext::new("request_test");
        ctx.set_variable("who", json!("world"));
        let step = ActionStep::new(
            "echo",
            Arc::new(FixedExec {
                config: r#"{"greeting": "hi {{ .who }}"}"#.to_string(),
                result: Ok(Value::Null),
            }),
            None,
            None,
        );
        step.execute(&ctx).await.unwrap();
        assert_eq!(
            ctx.get_variable("variable_actions_echo"),
            Some(json!({"greeting": "hi world"}))
        );
    }

    #[tokio::test]
    async fn bad_config_template_follows_fail_edge() {
        let ctx = RequestContext::new("request_test");
        let step = ActionStep::new(
            "echo",
            Arc::new(FixedExec {
                config: "{{ bogusfn }}".to_string(),
                result: Ok(Value::Null),
            }),
            Some("response.ok".to_string()),
            Some("response.err".to_string()),
        );
        let next = step.execute(&ctx).await.unwrap();
        assert_eq!(next.as_deref(), Some("response.err"));
    }

    #[test]
    fn empty_conditional_expression_is_valid() {
        let ctx = RequestContext::new("request_test");
        let step = ConditionalStep {
            id: "c".to_string(),
            expression: String::new(),
            on_valid: Some("response.ok".to_string()),
            on_invalid: Some("response.err".to_string()),
        };
        assert_eq!(step.execute(&ctx).unwrap().as_deref(), Some("response.ok"));
    }

    #[test]
    fn conditional_compares_trimmed_render_to_true() {
        let ctx = RequestContext::new("request_test");
        ctx.set_variable("age", json!("18"));
        let step = ConditionalStep {
            id: "c".to_string(),
            expression: r#"  {{ eq .age "18" }}  "#.to_string(),
            on_valid: Some("response.ok".to_string()),
            on_invalid: Some("response.err".to_string()),
        };
        assert_eq!(step.execute(&ctx).unwrap().as_deref(), Some("response.ok"));

        ctx.set_variable("age", json!("21"));
        assert_eq!(step.execute(&ctx).unwrap().as_deref(), Some("response.err"));
    }

    #[test]
    fn conditional_flushes_validation_errors() {
        let ctx = RequestContext::new("request_test");
        ctx.set_variable("name", json!(""));
        let step = ConditionalStep {
            id: "c".to_string(),
            expression: r#"{{ notempty .name "Name" }}"#.to_string(),
            on_valid: Some("response.ok".to_string()),
            on_invalid: Some("response.err".to_string()),
        };
        assert_eq!(step.execute(&ctx).unwrap().as_deref(), Some("response.err"));
        let error = ctx.get_variable(ERROR_VARIABLE).unwrap();
        assert!(error.as_str().unwrap().contains("Name"));
    }
}
