//! The `start` command: wire registries, compile plans, serve.

use crate::StartArgs;
use servflow_http::{
    build_engine, build_router, EngineOptions, EngineState, IdleTimer, SharedRouter,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 8080;

pub(crate) async fn run(folder: PathBuf, args: StartArgs) -> anyhow::Result<()> {
    let actions = servflow_core::global_actions();
    let integrations = servflow_core::global_integrations();
    servflow_actions::register_builtin_actions(actions)?;
    servflow_actions::register_builtin_integrations(integrations)?;

    if let Some(path) = &args.integrations {
        let file = servflow_config::load_integrations_file(path)?;
        for (id, declared) in &file.integrations {
            let config = expand_config_templates(&declared.config)?;
            integrations.init_instance(id, &declared.kind, &config)?;
            info!(id = %id, kind = %declared.kind, "integration configured");
        }
    }

    let port = args
        .port
        .or_else(|| std::env::var("SERVFLOW_PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(DEFAULT_PORT);
    let env = std::env::var("SERVFLOW_ENV").unwrap_or_else(|_| "development".to_string());
    let debug = args.debug || env != "production";
    let idle = std::env::var("SERVFLOW_IDLE_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| Arc::new(IdleTimer::new(Duration::from_secs(secs))));

    let (state, failures) = load_engine(&folder, idle.clone(), debug, None)?;
    for failure in &failures {
        error!(error = %failure, "config rejected at startup");
    }
    info!(
        endpoints = state.endpoints.len(),
        tools = state.tools.len(),
        env = %env,
        "engine ready"
    );

    let current = Arc::new(Mutex::new(Arc::clone(&state)));
    let shared = SharedRouter::new(build_router(state));

    if args.watch {
        spawn_watcher(folder.clone(), shared.clone(), Arc::clone(&current), idle.clone(), debug);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    servflow_http::serve(addr, shared, idle).await?;
    Ok(())
}

type SharedState = Arc<Mutex<Arc<EngineState>>>;

/// Expand template expressions in integration config values at init.
/// Integrations see no request scope, so only the built-in functions
/// (notably `secret`) are available.
fn expand_config_templates(value: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
    use serde_json::Value;
    use servflow_core::template::{builtins, render_str, Scope};

    Ok(match value {
        Value::String(s) if s.contains("{{") => {
            let vars = std::collections::HashMap::new();
            let funcs = builtins();
            Value::String(render_str(s, &Scope { vars: &vars, funcs: &funcs })?)
        }
        Value::Array(items) => Value::Array(
            items.iter().map(expand_config_templates).collect::<anyhow::Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut expanded = serde_json::Map::new();
            for (key, item) in map {
                expanded.insert(key.clone(), expand_config_templates(item)?);
            }
            Value::Object(expanded)
        }
        other => other.clone(),
    })
}

fn load_engine(
    folder: &Path,
    idle: Option<Arc<IdleTimer>>,
    debug: bool,
    previous: Option<&EngineState>,
) -> anyhow::Result<(Arc<EngineState>, Vec<servflow_core::Error>)> {
    let (configs, load_failures) = servflow_config::load_config_dir(folder)?;
    let cors_allowed_origins = std::env::var("SERVFLOW_CORS_ALLOWED_ORIGINS")
        .map(|raw| raw.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
        .unwrap_or_default();
    let options = EngineOptions {
        cors_allowed_origins,
        idle,
        debug,
    };
    let (state, mut failures) =
        build_engine(&configs, servflow_core::global_actions(), options, previous);
    failures.extend(load_failures.into_iter().map(|e| servflow_core::Error::config(e.to_string())));
    Ok((Arc::new(state), failures))
}

fn spawn_watcher(
    folder: PathBuf,
    shared: SharedRouter,
    current: SharedState,
    idle: Option<Arc<IdleTimer>>,
    debug: bool,
) {
    std::thread::spawn(move || {
        let reload_folder = folder.clone();
        let result = servflow_config::watch_config_dir(&folder, move || {
            let previous = current.lock().ok().map(|guard| Arc::clone(&guard));
            match load_engine(&reload_folder, idle.clone(), debug, previous.as_deref()) {
                Ok((state, failures)) => {
                    for failure in &failures {
                        error!(error = %failure, "config rejected on reload");
                    }
                    info!(endpoints = state.endpoints.len(), "plans reloaded");
                    if let Ok(mut guard) = current.lock() {
                        *guard = Arc::clone(&state);
                    }
                    shared.swap(build_router(state));
                }
                Err(e) => error!(error = %e, "reload failed, keeping previous plans"),
            }
        });
        if let Err(e) = result {
            warn!(error = %e, "config watcher stopped");
        }
    });
}
