//! Text-template engine for Servflow
//!
//! Implements the `{{ ... }}` substitution grammar used by action configs,
//! conditional expressions and response bodies:
//!
//! - Dotted variable lookup: `{{ .variable_actions_greet.message }}`
//! - Function calls with arguments: `{{ header "Authorization" }}`
//! - Pipelines: `{{ .items | pluck "name" | join ", " }}`
//! - Boolean combinators and comparisons: `{{ and (notempty .name "Name") (eq .age "18") }}`
//!
//! Templates are compiled per render. Action configs can contain
//! request-dependent values, so nothing is cached across requests.

mod functions;
mod parser;

pub use functions::builtins;

use crate::error::{Error, Result};
use parser::{parse, Node};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named callable usable inside `{{ ... }}` expressions.
///
/// Functions receive already-evaluated arguments and return a JSON value;
/// the renderer stringifies the final value of each action.
pub type TemplateFunc = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Variable and function scope for a single render.
pub struct Scope<'a> {
    /// Named variables, addressed with leading-dot paths
    pub vars: &'a HashMap<String, Value>,
    /// Function table for this invocation
    pub funcs: &'a HashMap<String, TemplateFunc>,
}

/// A compiled template: literal text interleaved with actions.
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Compile a template string.
    pub fn parse(src: &str) -> Result<Self> {
        Ok(Self { nodes: parse(src)? })
    }

    /// Render against the given scope, producing the substituted string.
    pub fn render(&self, scope: &Scope<'_>) -> Result<String> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Action(pipeline) => {
                    let value = parser::eval_pipeline(pipeline, scope)?;
                    out.push_str(&value_to_string(&value));
                }
            }
        }
        Ok(out)
    }

    /// Evaluate a single-action template directly to a value.
    ///
    /// Returns `None` when the template is not exactly one `{{ ... }}`
    /// action with no surrounding text.
    pub fn eval_single(&self, scope: &Scope<'_>) -> Result<Option<Value>> {
        let mut pipeline = None;
        for node in &self.nodes {
            match node {
                Node::Text(t) if t.trim().is_empty() => {}
                Node::Text(_) => return Ok(None),
                Node::Action(p) => {
                    if pipeline.is_some() {
                        return Ok(None);
                    }
                    pipeline = Some(p);
                }
            }
        }
        match pipeline {
            Some(p) => parser::eval_pipeline(p, scope).map(Some),
            None => Ok(None),
        }
    }
}

/// Compile and render in one call.
pub fn render_str(src: &str, scope: &Scope<'_>) -> Result<String> {
    Template::parse(src)?.render(scope)
}

/// Stringify a JSON value the way rendered actions appear in output.
///
/// Strings render raw (no quotes), null renders empty, everything else
/// renders as its JSON encoding.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Truthiness used by `and` / `or` / `not`.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Look up a dotted path in the variable scope.
pub(crate) fn lookup_path(vars: &HashMap<String, Value>, path: &[String]) -> Value {
    if path.is_empty() {
        return Value::Object(vars.clone().into_iter().collect());
    }
    let Some(mut current) = vars.get(&path[0]) else {
        return Value::Null;
    };
    for segment in &path[1..] {
        match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => current = v,
                None => return Value::Null,
            },
            Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(v) => current = v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    current.clone()
}

/// Pipe-syntax error helper shared by the parser.
pub(crate) fn unknown_function(name: &str) -> Error {
    Error::template(format!("function {name:?} not defined"))
}
