//! Titled condition functions and structured-conditional compilation.
//!
//! The titled functions (`email`, `empty`, `notempty`, `bcrypt`) append a
//! descriptive message to the request's validation-error list whenever
//! they detect a failure, so a downstream `{{ .error }}` reference sees
//! why the conditional routed to its invalid edge.

use crate::error::{Error, Result};
use crate::template::{value_to_string, TemplateFunc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use servflow_config::ConditionItem;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[allow(clippy::unwrap_used)]
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap());

type ValidationErrors = Arc<Mutex<Vec<String>>>;

fn record(errors: &ValidationErrors, message: String) {
    if let Ok(mut errs) = errors.lock() {
        errs.push(message);
    }
}

fn title_arg(args: &[Value], index: usize, func: &str) -> Result<String> {
    args.get(index)
        .map(value_to_string)
        .ok_or_else(|| Error::template(format!("{func}: missing title argument")))
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Register the titled condition functions into a template function
/// table, wiring failures to the given validation-error list.
pub fn register_condition_funcs(
    funcs: &mut HashMap<String, TemplateFunc>,
    errors: ValidationErrors,
) {
    let errs = Arc::clone(&errors);
    funcs.insert(
        "email".to_string(),
        Arc::new(move |args: &[Value]| {
            let value = args.first().map(value_to_string).unwrap_or_default();
            let title = title_arg(args, 1, "email")?;
            if EMAIL_RE.is_match(&value) {
                Ok(Value::Bool(true))
            } else {
                record(&errs, format!("{title} is not a valid email address"));
                Ok(Value::Bool(false))
            }
        }),
    );

    let errs = Arc::clone(&errors);
    funcs.insert(
        "empty".to_string(),
        Arc::new(move |args: &[Value]| {
            let title = title_arg(args, 1, "empty")?;
            if args.first().is_none_or(is_empty_value) {
                Ok(Value::Bool(true))
            } else {
                record(&errs, format!("{title} should be empty"));
                Ok(Value::Bool(false))
            }
        }),
    );

    let errs = Arc::clone(&errors);
    funcs.insert(
        "notempty".to_string(),
        Arc::new(move |args: &[Value]| {
            let title = title_arg(args, 1, "notempty")?;
            if args.first().is_some_and(|v| !is_empty_value(v)) {
                Ok(Value::Bool(true))
            } else {
                record(&errs, format!("{title} should not be empty"));
                Ok(Value::Bool(false))
            }
        }),
    );

    let errs = errors;
    funcs.insert(
        "bcrypt".to_string(),
        Arc::new(move |args: &[Value]| {
            let plain = args.first().map(value_to_string).unwrap_or_default();
            let hashed = args.get(1).map(value_to_string).unwrap_or_default();
            let title = title_arg(args, 2, "bcrypt")?;
            match bcrypt::verify(&plain, &hashed) {
                Ok(true) => Ok(Value::Bool(true)),
                _ => {
                    record(&errs, format!("{title} is invalid"));
                    Ok(Value::Bool(false))
                }
            }
        }),
    );
}

const TITLED_FUNCS: [&str; 4] = ["email", "empty", "notempty", "bcrypt"];
const COMPARISON_FUNCS: [&str; 6] = ["eq", "ne", "lt", "le", "gt", "ge"];

/// Compile a structured conditional (OR of ANDs) into a template
/// expression. The empty structure compiles to the literal `false`.
pub fn synthesize_expression(structure: &[Vec<ConditionItem>]) -> Result<String> {
    let groups: Vec<&Vec<ConditionItem>> =
        structure.iter().filter(|group| !group.is_empty()).collect();
    if groups.is_empty() {
        return Ok("false".to_string());
    }

    let mut or_terms = Vec::with_capacity(groups.len());
    for group in groups {
        let mut and_terms = Vec::with_capacity(group.len());
        for item in group {
            and_terms.push(format!("({})", synthesize_item(item)?));
        }
        or_terms.push(format!("(and {})", and_terms.join(" ")));
    }
    Ok(format!("{{{{ or {} }}}}", or_terms.join(" ")))
}

fn synthesize_item(item: &ConditionItem) -> Result<String> {
    let function = item.function.as_str();
    let content = normalize_operand(&item.content);

    if TITLED_FUNCS.contains(&function) {
        let title = item.title.as_deref().filter(|t| !t.is_empty()).ok_or_else(|| {
            Error::config(format!("condition function {function:?} requires a title"))
        })?;
        if function == "bcrypt" {
            let comparison = required_comparison(item)?;
            return Ok(format!("bcrypt {content} {comparison} {title:?}"));
        }
        return Ok(format!("{function} {content} {title:?}"));
    }

    if COMPARISON_FUNCS.contains(&function) {
        let comparison = required_comparison(item)?;
        return Ok(format!("{function} {content} {comparison}"));
    }

    Err(Error::config(format!("unknown condition function {function:?}")))
}

fn required_comparison(item: &ConditionItem) -> Result<String> {
    let comparison = item.comparison.as_deref().filter(|c| !c.trim().is_empty()).ok_or_else(
        || {
            Error::config(format!(
                "condition function {:?} requires a comparison",
                item.function
            ))
        },
    )?;
    Ok(normalize_operand(comparison))
}

/// Turn an operand into an embeddable expression: `{{ ... }}` wrappers
/// are stripped; anything that is not a field reference, parenthesized
/// expression, number or quoted string becomes a string literal.
fn normalize_operand(raw: &str) -> String {
    let mut inner = raw.trim();
    if let Some(stripped) = inner.strip_prefix("{{") {
        inner = stripped.strip_suffix("}}").unwrap_or(stripped).trim();
    }
    if inner.starts_with('.')
        || inner.starts_with('(')
        || inner.starts_with('"')
        || inner.parse::<f64>().is_ok()
    {
        inner.to_string()
    } else {
        format!("{inner:?}")
    }
}
