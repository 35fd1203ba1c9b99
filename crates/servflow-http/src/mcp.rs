//! Streamable-HTTP MCP server for APIs declared as tools.
//!
//! Implements the JSON-RPC 2.0 subset the protocol needs over a single
//! `POST /mcp` route: `initialize`, `tools/list` and `tools/call`.
//! Tool calls walk the declared plan with the tool's end-value seam and
//! surface the result as text content.

use crate::handler::next_request_id;
use crate::{EngineState, McpTool, GENERIC_ERROR_BODY};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use servflow_core::RequestContext;
use std::sync::Arc;
use tracing::{error, info};

const PROTOCOL_VERSION: &str = "2024-11-05";
const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;
const JSONRPC_INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Build the `/mcp` sub-router.
pub(crate) fn router(state: Arc<EngineState>) -> Router {
    Router::new().route("/mcp", post(handle)).with_state(state)
}

async fn handle(State(state): State<Arc<EngineState>>, Json(req): Json<JsonRpcRequest>) -> Response {
    if let Some(idle) = &state.idle {
        idle.reset();
    }

    // Notifications carry no id and expect no body.
    let Some(id) = req.id.clone() else {
        return StatusCode::ACCEPTED.into_response();
    };

    let result = match req.method.as_str() {
        "initialize" => Ok(initialize_result()),
        "tools/list" => Ok(tools_list(&state)),
        "tools/call" => tools_call(&state, &req.params).await,
        "ping" => Ok(json!({})),
        other => Err((JSONRPC_METHOD_NOT_FOUND, format!("method {other:?} not found"))),
    };

    let body = match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }),
    };
    Json(body).into_response()
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {}},
        "serverInfo": {
            "name": "servflow",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn tools_list(state: &EngineState) -> Value {
    let tools: Vec<Value> = state
        .tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.tool.name,
                "description": tool.tool.description,
                "inputSchema": {
                    "type": "object",
                    "additionalProperties": true,
                },
            })
        })
        .collect();
    json!({"tools": tools})
}

async fn tools_call(state: &EngineState, params: &Value) -> Result<Value, (i64, String)> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| (JSONRPC_INVALID_PARAMS, "missing tool name".to_string()))?;
    let tool: &Arc<McpTool> = state
        .tools
        .iter()
        .find(|t| t.tool.name == name)
        .ok_or_else(|| (JSONRPC_INVALID_PARAMS, format!("unknown tool {name:?}")))?;

    let request_id = next_request_id();
    let ctx = RequestContext::new(&request_id);
    if let Some(arguments) = params.get("arguments").and_then(Value::as_object) {
        for (key, value) in arguments {
            ctx.set_variable(key.clone(), value.clone());
        }
    }

    info!(request_id = %request_id, tool = %name, "mcp tool call");
    let end_value = (!tool.tool.end_value.is_empty()).then_some(tool.tool.end_value.as_str());
    match tool.plan.execute(&ctx, &tool.tool.next, end_value).await {
        Ok(output) => Ok(json!({
            "content": [{"type": "text", "text": output.body}],
            "isError": false,
        })),
        Err(e) => {
            error!(request_id = %request_id, tool = %name, error = %e, "mcp tool call failed");
            Ok(json!({
                "content": [{"type": "text", "text": GENERIC_ERROR_BODY}],
                "isError": true,
            }))
        }
    }
}
