//! # Servflow HTTP
//!
//! HTTP adapter for the Servflow engine: builds an axum router from
//! compiled plans, initializes per-request state, enforces CORS,
//! resets the idle shutdown timer, and exposes the built-in surface
//! (`/health`, gated `/debug/*`, `POST /mcp`).
//!
//! The inner router is hot-swappable: reloads compile new plans and
//! swap the router atomically while in-flight requests continue on the
//! router they captured.

mod cors;
mod debug;
mod handler;
mod idle;
mod mcp;

pub use idle::IdleTimer;

use axum::extract::{RawPathParams, Request, State};
use axum::response::Response;
use axum::routing::MethodFilter;
use axum::Router;
use servflow_config::{ApiConfig, HttpConfig, McpToolConfig};
use servflow_core::{ActionRegistry, Error, Plan, Planner};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// One live HTTP endpoint: its listener config and compiled plan.
pub struct Endpoint {
    /// Owning API ID
    pub api_id: String,
    /// Listener configuration
    pub http: HttpConfig,
    /// Compiled plan, shared read-only across requests
    pub plan: Arc<Plan>,
}

/// One MCP tool: its declaration and compiled plan.
pub struct McpTool {
    /// Owning API ID
    pub api_id: String,
    /// Tool declaration
    pub tool: McpToolConfig,
    /// Compiled plan, shared read-only across requests
    pub plan: Arc<Plan>,
}

/// Engine-wide options for building the HTTP surface.
#[derive(Default)]
pub struct EngineOptions {
    /// Fallback CORS allow-list for APIs without their own
    pub cors_allowed_origins: Vec<String>,
    /// Optional idle shutdown timer
    pub idle: Option<Arc<IdleTimer>>,
    /// Expose the `/debug/*` diagnostics routes
    pub debug: bool,
}

/// Immutable state shared by every route of one router generation.
pub struct EngineState {
    /// Live HTTP endpoints
    pub endpoints: Vec<Arc<Endpoint>>,
    /// Declared MCP tools
    pub tools: Vec<Arc<McpTool>>,
    /// Engine-wide CORS allow-list
    pub cors_allowed_origins: Vec<String>,
    /// Idle shutdown timer, reset on every request
    pub idle: Option<Arc<IdleTimer>>,
    /// Whether `/debug/*` routes are exposed
    pub debug: bool,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

/// Compile every API config into endpoints and MCP tools.
///
/// A failed compile never takes the whole engine down: the failure is
/// logged and returned, and when a previous state is given the old plan
/// for that API is retained (the hot-reload contract).
pub fn build_engine(
    configs: &[ApiConfig],
    registry: &ActionRegistry,
    options: EngineOptions,
    previous: Option<&EngineState>,
) -> (EngineState, Vec<Error>) {
    let mut endpoints = Vec::new();
    let mut tools = Vec::new();
    let mut failures = Vec::new();

    for config in configs {
        if config.has_conflicting_surfaces() {
            failures.push(Error::config(format!(
                "api {:?} declares both an HTTP endpoint and an MCP tool",
                config.id
            )));
            continue;
        }
        match Planner::new(config, registry).compile() {
            Ok(plan) => {
                let plan = Arc::new(plan);
                if let Some(http) = &config.http {
                    endpoints.push(Arc::new(Endpoint {
                        api_id: config.id.clone(),
                        http: http.clone(),
                        plan: Arc::clone(&plan),
                    }));
                }
                if let Some(tool) = &config.mcp_tool {
                    tools.push(Arc::new(McpTool {
                        api_id: config.id.clone(),
                        tool: tool.clone(),
                        plan,
                    }));
                }
            }
            Err(e) => {
                error!(api = %config.id, error = %e, "plan compilation failed");
                if let Some(previous) = previous {
                    if let Some(old) = previous.endpoints.iter().find(|ep| ep.api_id == config.id)
                    {
                        warn!(api = %config.id, "retaining previous plan");
                        endpoints.push(Arc::clone(old));
                    }
                    if let Some(old) = previous.tools.iter().find(|t| t.api_id == config.id) {
                        tools.push(Arc::clone(old));
                    }
                }
                failures.push(e);
            }
        }
    }

    let state = EngineState {
        endpoints,
        tools,
        cors_allowed_origins: options.cors_allowed_origins,
        idle: options.idle,
        debug: options.debug,
        started_at: Instant::now(),
    };
    (state, failures)
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method.to_uppercase().as_str() {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "DELETE" => Some(MethodFilter::DELETE),
        "PATCH" => Some(MethodFilter::PATCH),
        "HEAD" => Some(MethodFilter::HEAD),
        _ => None,
    }
}

fn normalize_path(listen_path: &str) -> String {
    if listen_path.starts_with('/') {
        listen_path.to_string()
    } else {
        format!("/{listen_path}")
    }
}

/// Build the router for one engine state generation.
pub fn build_router(state: Arc<EngineState>) -> Router {
    let mut router = Router::new().route("/health", axum::routing::get(|| async { "ok" }));

    // Group endpoints by path so one method router serves each route.
    let mut by_path: HashMap<String, Vec<Arc<Endpoint>>> = HashMap::new();
    for endpoint in &state.endpoints {
        by_path
            .entry(normalize_path(&endpoint.http.listen_path))
            .or_default()
            .push(Arc::clone(endpoint));
    }

    for (path, endpoints) in by_path {
        let mut method_router = axum::routing::MethodRouter::new();
        let mut registered = 0;
        for endpoint in &endpoints {
            let Some(filter) = method_filter(&endpoint.http.method) else {
                warn!(api = %endpoint.api_id, method = %endpoint.http.method, "skipping unsupported method");
                continue;
            };
            let ep = Arc::clone(endpoint);
            let st = Arc::clone(&state);
            method_router = method_router.on(
                filter,
                move |params: RawPathParams, req: Request| {
                    let ep = Arc::clone(&ep);
                    let st = Arc::clone(&st);
                    async move { handler::handle(st, ep, params, req).await }
                },
            );
            registered += 1;
        }
        if registered == 0 {
            continue;
        }
        // Implicit OPTIONS for CORS preflight.
        let st = Arc::clone(&state);
        let eps = endpoints.clone();
        method_router = method_router.options(move |req: Request| {
            let st = Arc::clone(&st);
            let eps = eps.clone();
            async move { cors::preflight(&st, &eps, &req) }
        });
        info!(path = %path, "registered route");
        router = router.route(&path, method_router);
    }

    if state.debug {
        router = router.merge(debug::router(Arc::clone(&state)));
    }
    router = router.merge(mcp::router(Arc::clone(&state)));
    router
}

/// Hot-swappable router handle. Requests dispatch through the current
/// inner router; `swap` replaces it atomically for subsequent requests.
#[derive(Clone)]
pub struct SharedRouter {
    inner: Arc<RwLock<Router>>,
}

impl SharedRouter {
    /// Wrap an initial router.
    pub fn new(router: Router) -> Self {
        Self {
            inner: Arc::new(RwLock::new(router)),
        }
    }

    /// Replace the inner router. In-flight requests keep the one they
    /// captured.
    pub fn swap(&self, router: Router) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = router;
        }
    }

    /// Outer service that forwards every request to the current router.
    pub fn into_service(self) -> Router {
        Router::new().fallback(dispatch).with_state(self)
    }

    fn current(&self) -> Router {
        self.inner.read().map(|r| r.clone()).unwrap_or_default()
    }
}

async fn dispatch(State(shared): State<SharedRouter>, req: Request) -> Response {
    let router = shared.current();
    match router.oneshot(req).await {
        Ok(response) => response,
        Err(infallible) => match infallible {},
    }
}

/// Bind and serve until shutdown: Ctrl-C, or the idle deadline when an
/// idle timer is configured.
pub async fn serve(
    addr: SocketAddr,
    shared: SharedRouter,
    idle: Option<Arc<IdleTimer>>,
) -> std::io::Result<()> {
    let app = shared.into_service().layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(idle))
        .await
}

async fn shutdown_signal(idle: Option<Arc<IdleTimer>>) {
    let idle_expired = async {
        match idle {
            Some(timer) => timer.expired().await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = idle_expired => {
            info!("idle deadline reached, shutting down");
        }
    }
}

/// Error response body for any unrecovered failure. Structured detail
/// goes to the log keyed by request ID, never to the client.
pub(crate) const GENERIC_ERROR_BODY: &str = "error completing request, please reach out to admin";
