//! Built-in template function library.
//!
//! These functions are always registered; request-scoped accessors
//! (`header`, `param`, `body`, `urlparam`) and the titled condition
//! functions are added on top per request.

use super::{value_to_string, TemplateFunc};
use crate::error::{Error, Result};
use md5::{Digest, Md5};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Build the base function table.
pub fn builtins() -> HashMap<String, TemplateFunc> {
    let mut funcs: HashMap<String, TemplateFunc> = HashMap::new();
    funcs.insert("strip".to_string(), Arc::new(strip));
    funcs.insert("jsonout".to_string(), Arc::new(jsonout));
    funcs.insert("jsonraw".to_string(), Arc::new(jsonraw));
    funcs.insert("pluck".to_string(), Arc::new(pluck));
    funcs.insert("join".to_string(), Arc::new(join));
    funcs.insert("hash".to_string(), Arc::new(hash));
    funcs.insert("escape".to_string(), Arc::new(escape));
    funcs.insert("stringescape".to_string(), Arc::new(escape));
    funcs.insert("now".to_string(), Arc::new(now));
    funcs.insert("secret".to_string(), Arc::new(secret));
    funcs.insert("eq".to_string(), Arc::new(|args| compare(args, Cmp::Eq)));
    funcs.insert("ne".to_string(), Arc::new(|args| compare(args, Cmp::Ne)));
    funcs.insert("lt".to_string(), Arc::new(|args| compare(args, Cmp::Lt)));
    funcs.insert("le".to_string(), Arc::new(|args| compare(args, Cmp::Le)));
    funcs.insert("gt".to_string(), Arc::new(|args| compare(args, Cmp::Gt)));
    funcs.insert("ge".to_string(), Arc::new(|args| compare(args, Cmp::Ge)));
    funcs
}

fn arg<'a>(args: &'a [Value], index: usize, func: &str) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| Error::template(format!("{func}: missing argument {index}")))
}

/// Trim leading and trailing whitespace.
fn strip(args: &[Value]) -> Result<Value> {
    let v = arg(args, 0, "strip")?;
    Ok(Value::String(value_to_string(v).trim().to_string()))
}

/// JSON-encode a value for embedding inside a JSON string literal.
/// String values lose their outer quotes so `"{{ jsonout .v }}"` stays
/// valid JSON either way.
fn jsonout(args: &[Value]) -> Result<Value> {
    let v = arg(args, 0, "jsonout")?;
    let encoded = serde_json::to_string(v)?;
    let trimmed = match v {
        Value::String(_) => strip_outer_quotes(&encoded).to_string(),
        _ => encoded,
    };
    Ok(Value::String(trimmed))
}

fn strip_outer_quotes(encoded: &str) -> &str {
    encoded
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(encoded)
}

/// Raw JSON encoding of a value, quotes and all.
fn jsonraw(args: &[Value]) -> Result<Value> {
    let v = arg(args, 0, "jsonraw")?;
    Ok(Value::String(serde_json::to_string(v)?))
}

/// Extract one key from every object in an array.
fn pluck(args: &[Value]) -> Result<Value> {
    let key = value_to_string(arg(args, 0, "pluck")?);
    let items = arg(args, 1, "pluck")?;
    let Value::Array(items) = items else {
        return Ok(Value::Array(Vec::new()));
    };
    let plucked = items
        .iter()
        .map(|item| item.get(&key).cloned().unwrap_or(Value::Null))
        .collect();
    Ok(Value::Array(plucked))
}

/// Join array elements with a separator.
fn join(args: &[Value]) -> Result<Value> {
    let sep = value_to_string(arg(args, 0, "join")?);
    let items = arg(args, 1, "join")?;
    let Value::Array(items) = items else {
        return Ok(Value::String(value_to_string(items)));
    };
    let joined = items.iter().map(value_to_string).collect::<Vec<_>>().join(&sep);
    Ok(Value::String(joined))
}

/// MD5 hex digest. Non-string inputs are JSON-canonicalized first so the
/// same structured value always hashes the same.
fn hash(args: &[Value]) -> Result<Value> {
    let v = arg(args, 0, "hash")?;
    let input = match v {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other)?,
    };
    let digest = Md5::new().chain_update(input.as_bytes()).finalize();
    Ok(Value::String(hex::encode(digest)))
}

/// Escape a value for embedding inside a JSON string literal.
fn escape(args: &[Value]) -> Result<Value> {
    let raw = value_to_string(arg(args, 0, "escape")?);
    let encoded = serde_json::to_string(&raw)?;
    Ok(Value::String(strip_outer_quotes(&encoded).to_string()))
}

/// Current UTC timestamp, RFC 3339.
fn now(_args: &[Value]) -> Result<Value> {
    Ok(Value::String(chrono::Utc::now().to_rfc3339()))
}

/// Indirect secret lookup. Secrets come from `SERVFLOW_SECRET_<NAME>`
/// environment entries; the name is upper-cased before lookup.
fn secret(args: &[Value]) -> Result<Value> {
    let name = value_to_string(arg(args, 0, "secret")?);
    let key = format!("SERVFLOW_SECRET_{}", name.to_uppercase());
    match std::env::var(&key) {
        Ok(v) => Ok(Value::String(v)),
        Err(_) => Ok(Value::String(String::new())),
    }
}

#[derive(Clone, Copy)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Compare two values. Numeric when both sides parse as numbers,
/// lexicographic otherwise; mixed string/number comparisons coerce
/// through the string representation.
fn compare(args: &[Value], op: Cmp) -> Result<Value> {
    let a = arg(args, 0, "compare")?;
    let b = arg(args, 1, "compare")?;
    let ordering = match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(value_to_string(a).cmp(&value_to_string(b))),
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        Cmp::Eq => ordering.is_eq(),
        Cmp::Ne => !ordering.is_eq(),
        Cmp::Lt => ordering.is_lt(),
        Cmp::Le => ordering.is_le(),
        Cmp::Gt => ordering.is_gt(),
        Cmp::Ge => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_trims() {
        assert_eq!(strip(&[json!("  x  ")]).unwrap(), json!("x"));
    }

    #[test]
    fn jsonraw_keeps_quotes() {
        assert_eq!(jsonraw(&[json!("alice")]).unwrap(), json!(r#""alice""#));
        assert_eq!(jsonraw(&[json!(3)]).unwrap(), json!("3"));
        assert_eq!(jsonraw(&[json!({"a": 1})]).unwrap(), json!(r#"{"a":1}"#));
    }

    #[test]
    fn jsonout_drops_string_quotes() {
        assert_eq!(jsonout(&[json!("al\"ice")]).unwrap(), json!(r#"al\"ice"#));
        assert_eq!(jsonout(&[json!([1, 2])]).unwrap(), json!("[1,2]"));
    }

    #[test]
    fn pluck_and_join() {
        let users = json!([{"name": "a"}, {"name": "b"}, {"id": 1}]);
        let plucked = pluck(&[json!("name"), users]).unwrap();
        assert_eq!(plucked, json!(["a", "b", null]));
        let joined = join(&[json!("-"), json!(["a", "b"])]).unwrap();
        assert_eq!(joined, json!("a-b"));
    }

    #[test]
    fn hash_is_pure_and_canonical() {
        let a = hash(&[json!("abc")]).unwrap();
        let b = hash(&[json!("abc")]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, json!("900150983cd24fb0d6963f7d28e17f72"));

        let c1 = hash(&[json!({"k": 1})]).unwrap();
        let c2 = hash(&[json!({"k": 1})]).unwrap();
        assert_eq!(c1, c2);
    }

    #[test]
    fn escape_handles_quotes_and_newlines() {
        assert_eq!(escape(&[json!("a\"b\nc")]).unwrap(), json!(r#"a\"b\nc"#));
    }

    #[test]
    fn secret_reads_env() {
        std::env::set_var("SERVFLOW_SECRET_TESTTOKEN", "s3cret");
        assert_eq!(secret(&[json!("testtoken")]).unwrap(), json!("s3cret"));
        assert_eq!(secret(&[json!("missing_secret")]).unwrap(), json!(""));
    }

    #[test]
    fn comparisons_coerce_numbers() {
        assert_eq!(compare(&[json!("18"), json!(18)], Cmp::Eq).unwrap(), json!(true));
        assert_eq!(compare(&[json!(2), json!(10)], Cmp::Lt).unwrap(), json!(true));
        assert_eq!(compare(&[json!("b"), json!("a")], Cmp::Gt).unwrap(), json!(true));
        assert_eq!(compare(&[json!("x"), json!("x")], Cmp::Ne).unwrap(), json!(false));
    }
}
