//! Per-request state: variables, template functions, validation errors
//! and uploaded files.

use crate::error::Result;
use crate::files::FileValue;
use crate::template::{self, Scope, Template, TemplateFunc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Variable key that accumulated validation errors are flushed into.
pub const ERROR_VARIABLE: &str = "error";

/// Reserved variable name for an action step's output.
pub fn action_variable(id: &str) -> String {
    format!("variable_actions_{id}")
}

/// Request-scoped mutable state.
///
/// Owned by exactly one in-flight request. All writes happen on the
/// request's walker, so the interior locks are uncontended; they exist so
/// template functions can share handles into the context.
pub struct RequestContext {
    request_id: String,
    variables: RwLock<HashMap<String, Value>>,
    funcs: RwLock<HashMap<String, TemplateFunc>>,
    validation_errors: Arc<Mutex<Vec<String>>>,
    files: RwLock<HashMap<String, FileValue>>,
}

impl RequestContext {
    /// Create a context for one request. The base template function table
    /// and the titled condition functions are registered immediately;
    /// HTTP-derived accessors are registered by the adapter.
    pub fn new(request_id: impl Into<String>) -> Self {
        let validation_errors = Arc::new(Mutex::new(Vec::new()));
        let mut funcs = template::builtins();
        crate::condition::register_condition_funcs(&mut funcs, Arc::clone(&validation_errors));
        Self {
            request_id: request_id.into(),
            variables: RwLock::new(HashMap::new()),
            funcs: RwLock::new(funcs),
            validation_errors,
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Stable per-request identifier, used in logs.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Write a variable.
    pub fn set_variable(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut vars) = self.variables.write() {
            vars.insert(key.into(), value);
        }
    }

    /// Read a variable.
    pub fn get_variable(&self, key: &str) -> Option<Value> {
        self.variables.read().ok().and_then(|vars| vars.get(key).cloned())
    }

    /// Snapshot the full variable map.
    pub fn variables(&self) -> HashMap<String, Value> {
        self.variables.read().map(|v| v.clone()).unwrap_or_default()
    }

    /// Register a request-scoped template function (`header`, `param`,
    /// `body`, `urlparam`).
    pub fn register_func(&self, name: impl Into<String>, func: TemplateFunc) {
        if let Ok(mut funcs) = self.funcs.write() {
            funcs.insert(name.into(), func);
        }
    }

    /// Append a validation error. Condition functions call this through a
    /// shared handle when they detect a failure.
    pub fn push_validation_error(&self, message: impl Into<String>) {
        if let Ok(mut errs) = self.validation_errors.lock() {
            errs.push(message.into());
        }
    }

    /// Number of accumulated validation errors.
    pub fn validation_error_count(&self) -> usize {
        self.validation_errors.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Drain accumulated validation errors into the `error` variable.
    /// A no-op when nothing has accumulated.
    pub fn flush_validation_errors(&self) {
        let drained: Vec<String> = match self.validation_errors.lock() {
            Ok(mut errs) => errs.drain(..).collect(),
            Err(_) => return,
        };
        if !drained.is_empty() {
            self.set_variable(ERROR_VARIABLE, Value::String(drained.join("; ")));
        }
    }

    /// Store a file under `request.<field>` or `action.<name>`.
    pub fn add_file(&self, key: impl Into<String>, file: FileValue) {
        if let Ok(mut files) = self.files.write() {
            files.insert(key.into(), file);
        }
    }

    /// Look up a stored file.
    pub fn get_file(&self, key: &str) -> Option<FileValue> {
        self.files.read().ok().and_then(|files| files.get(key).cloned())
    }

    /// Compile and render a template against the current variables and
    /// function table.
    pub fn render(&self, src: &str) -> Result<String> {
        let vars = self.variables();
        let funcs = self.funcs.read().map(|f| f.clone()).unwrap_or_default();
        template::render_str(src, &Scope { vars: &vars, funcs: &funcs })
    }

    /// Evaluate a single-action template to a structured value, falling
    /// back to `None` for mixed text/action templates.
    pub fn eval_single(&self, src: &str) -> Result<Option<Value>> {
        let vars = self.variables();
        let funcs = self.funcs.read().map(|f| f.clone()).unwrap_or_default();
        Template::parse(src)?.eval_single(&Scope { vars: &vars, funcs: &funcs })
    }
}
