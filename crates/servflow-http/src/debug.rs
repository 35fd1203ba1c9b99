//! Diagnostics routes, exposed only when the debug flag is set.

use crate::EngineState;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the `/debug/*` sub-router.
pub(crate) fn router(state: Arc<EngineState>) -> Router {
    Router::new()
        .route("/debug/status", get(status))
        .route("/debug/plans", get(plans))
        .with_state(state)
}

async fn status(State(state): State<Arc<EngineState>>) -> Json<Value> {
    Json(json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "endpoints": state.endpoints.len(),
        "mcp_tools": state.tools.len(),
        "idle_timer": state.idle.is_some(),
    }))
}

async fn plans(State(state): State<Arc<EngineState>>) -> Json<Value> {
    let endpoints: Vec<Value> = state
        .endpoints
        .iter()
        .map(|ep| {
            let mut steps: Vec<&str> = ep.plan.step_ids().collect();
            steps.sort_unstable();
            json!({
                "api": ep.api_id,
                "method": ep.http.method,
                "path": ep.http.listen_path,
                "entry": ep.http.next,
                "steps": steps,
            })
        })
        .collect();
    let tools: Vec<Value> = state
        .tools
        .iter()
        .map(|tool| {
            json!({
                "api": tool.api_id,
                "tool": tool.tool.name,
            })
        })
        .collect();
    Json(json!({"endpoints": endpoints, "tools": tools}))
}
