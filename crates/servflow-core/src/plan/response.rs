//! Response builders: plain template bodies and recursive JSON objects.

use crate::context::RequestContext;
use crate::error::Result;
use serde_json::Value;
use servflow_config::ResponseObject;
use std::collections::HashMap;

const CONTENT_TYPE: &str = "Content-Type";
const APPLICATION_JSON: &str = "application/json";

/// Terminal output of a plan walk: status, headers and body.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutput {
    /// HTTP status code; zero for body-only output from an end-value
    /// template
    pub code: u16,
    /// Response body
    pub body: String,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl PlanOutput {
    /// Body-only output with a zero status, produced when a walk
    /// terminates without a response step.
    pub fn body_only(body: String) -> Self {
        Self {
            code: 0,
            body,
            headers: HashMap::new(),
        }
    }
}

/// Renders the terminal output of a plan walk.
pub enum ResponseBuilder {
    /// Render a body template as-is
    Template {
        /// HTTP status code
        code: u16,
        /// Body template
        template: String,
    },
    /// Walk a recursive object description and emit its JSON encoding
    JsonObject {
        /// HTTP status code
        code: u16,
        /// Recursive body description
        object: ResponseObject,
    },
}

impl ResponseBuilder {
    /// Render the response against the request context.
    pub fn build(&self, ctx: &RequestContext) -> Result<PlanOutput> {
        let (code, body) = match self {
            Self::Template { code, template } => (*code, ctx.render(template)?),
            Self::JsonObject { code, object } => {
                let value = build_object(ctx, object)?.unwrap_or(Value::Null);
                (*code, serde_json::to_string(&value)?)
            }
        };
        let mut headers = HashMap::new();
        headers.insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
        Ok(PlanOutput { code, body, headers })
    }
}

/// Recursively build a response object. Leaves render their value
/// template wrapped in `jsonraw` so non-string values survive the trip
/// through text substitution; branches assemble maps, skipping fields
/// that build to nothing.
fn build_object(ctx: &RequestContext, object: &ResponseObject) -> Result<Option<Value>> {
    if let Some(template) = &object.value {
        return build_leaf(ctx, template).map(Some);
    }
    if object.fields.is_empty() {
        return Ok(None);
    }
    let mut map = serde_json::Map::new();
    for (name, child) in &object.fields {
        match build_object(ctx, child)? {
            Some(Value::Null) | None => {}
            Some(value) => {
                map.insert(name.clone(), value);
            }
        }
    }
    Ok(Some(Value::Object(map)))
}

fn build_leaf(ctx: &RequestContext, template: &str) -> Result<Value> {
    let rendered = match ctx.eval_single(&wrap_jsonraw(template))? {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => ctx.render(template)?,
    };
    match serde_json::from_str::<Value>(&rendered) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Ok(Value::String(rendered)),
    }
}

/// Wrap a single-action template's expression in `jsonraw`. Mixed
/// text/action templates are returned unchanged and rendered as text.
fn wrap_jsonraw(template: &str) -> String {
    let trimmed = template.trim();
    let Some(inner) = trimmed.strip_prefix("{{").and_then(|t| t.strip_suffix("}}")) else {
        return template.to_string();
    };
    if inner.contains("{{") || inner.contains("}}") {
        return template.to_string();
    }
    let inner = inner.trim();
    if inner.starts_with("jsonraw ") || inner == "jsonraw" {
        return template.to_string();
    }
    format!("{{{{ jsonraw ({inner}) }}}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(vars: &[(&str, Value)]) -> RequestContext {
        let ctx = RequestContext::new("request_test");
        for (k, v) in vars {
            ctx.set_variable(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn template_builder_renders_body() {
        let ctx = ctx_with(&[("name", json!("alice"))]);
        let builder = ResponseBuilder::Template {
            code: 200,
            template: r#"{"user": "{{ .name }}"}"#.to_string(),
        };
        let output = builder.build(&ctx).unwrap();
        assert_eq!(output.code, 200);
        assert_eq!(output.body, r#"{"user": "alice"}"#);
        assert_eq!(output.headers.get(CONTENT_TYPE).map(String::as_str), Some(APPLICATION_JSON));
    }

    #[test]
    fn json_object_builder_round_trips_types() {
        let ctx = ctx_with(&[("name", json!("alice")), ("n", json!(3))]);
        let object: ResponseObject = serde_json::from_value(json!({
            "fields": {
                "data": {"fields": {"name": {"value": "{{ jsonraw .name }}"}}},
                "count": {"value": "{{ jsonraw .n }}"}
            }
        }))
        .unwrap();
        let builder = ResponseBuilder::JsonObject { code: 200, object };
        let output = builder.build(&ctx).unwrap();
        let parsed: Value = serde_json::from_str(&output.body).unwrap();
        assert_eq!(parsed, json!({"data": {"name": "alice"}, "count": 3}));
    }

    #[test]
    fn bare_value_templates_are_wrapped_automatically() {
        let ctx = ctx_with(&[("n", json!(42))]);
        let object: ResponseObject =
            serde_json::from_value(json!({"value": "{{ .n }}"})).unwrap();
        let builder = ResponseBuilder::JsonObject { code: 200, object };
        let output = builder.build(&ctx).unwrap();
        assert_eq!(output.body, "42");
    }

    #[test]
    fn unparseable_render_falls_back_to_string() {
        let ctx = ctx_with(&[]);
        let object: ResponseObject =
            serde_json::from_value(json!({"value": "plain text"})).unwrap();
        let builder = ResponseBuilder::JsonObject { code: 201, object };
        let output = builder.build(&ctx).unwrap();
        assert_eq!(output.body, r#""plain text""#);
        assert_eq!(output.code, 201);
    }

    #[test]
    fn nil_fields_are_skipped() {
        let ctx = ctx_with(&[("present", json!("yes"))]);
        let object: ResponseObject = serde_json::from_value(json!({
            "fields": {
                "kept": {"value": "{{ jsonraw .present }}"},
                "dropped": {"value": "{{ jsonraw .missing }}"},
                "empty_branch": {}
            }
        }))
        .unwrap();
        let builder = ResponseBuilder::JsonObject { code: 200, object };
        let output = builder.build(&ctx).unwrap();
        let parsed: Value = serde_json::from_str(&output.body).unwrap();
        assert_eq!(parsed, json!({"kept": "yes"}));
    }

    #[test]
    fn wrap_jsonraw_leaves_mixed_templates_alone() {
        assert_eq!(wrap_jsonraw("{{ .x }}"), "{{ jsonraw (.x) }}");
        assert_eq!(wrap_jsonraw("{{ jsonraw .x }}"), "{{ jsonraw .x }}");
        assert_eq!(wrap_jsonraw("a {{ .x }} b"), "a {{ .x }} b");
    }
}
