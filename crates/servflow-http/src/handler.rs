//! Per-request pipeline: CORS check, idle reset, context init,
//! request-scoped template functions, multipart parse, plan walk.

use crate::{cors, Endpoint, EngineState, GENERIC_ERROR_BODY};
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, RawPathParams, Request};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use once_cell::sync::OnceCell;
use serde_json::Value;
use servflow_core::template::value_to_string;
use servflow_core::{FileValue, PlanOutput, RequestContext};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, Instrument};

/// Whole-body read ceiling for buffered requests.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// The `body` template accessor refuses JSON documents larger than this.
const MAX_TEMPLATE_BODY_BYTES: usize = 1024 * 1024;

/// Stable per-request identifier of form `request_<unix-nanos>`.
pub(crate) fn next_request_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("request_{nanos}")
}

pub(crate) async fn handle(
    state: Arc<EngineState>,
    endpoint: Arc<Endpoint>,
    params: RawPathParams,
    req: Request,
) -> Response {
    let origin = req
        .headers()
        .get(http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allow_list = cors::allow_list(&state, &endpoint.http);
    if !cors::origin_allowed(allow_list, origin.as_deref()) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let cors_origin = origin.filter(|_| !allow_list.is_empty());

    if let Some(idle) = &state.idle {
        idle.reset();
    }

    let request_id = next_request_id();
    let span = tracing::info_span!("request", request_id = %request_id, api = %endpoint.api_id);
    run_plan(endpoint, params, req, request_id, cors_origin)
        .instrument(span)
        .await
}

async fn run_plan(
    endpoint: Arc<Endpoint>,
    params: RawPathParams,
    req: Request,
    request_id: String,
    cors_origin: Option<String>,
) -> Response {
    let ctx = RequestContext::new(&request_id);

    let url_params: HashMap<String, String> =
        params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let headers = req.headers().clone();
    let query_map = parse_pairs(req.uri().query().unwrap_or(""));
    let content_type = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let mut form_map = HashMap::new();
    let mut body_bytes = Bytes::new();
    if content_type.starts_with("multipart/form-data") {
        parse_multipart(req, &ctx, &mut form_map).await;
    } else {
        body_bytes = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "reading request body failed");
                Bytes::new()
            }
        };
        if content_type.starts_with("application/x-www-form-urlencoded") {
            form_map.extend(parse_pairs(&String::from_utf8_lossy(&body_bytes)));
        }
    }

    register_request_funcs(&ctx, headers, query_map, form_map, url_params, body_bytes, content_type);

    info!(path = %endpoint.http.listen_path, "handling request");
    match endpoint.plan.execute(&ctx, &endpoint.http.next, None).await {
        Ok(output) => to_response(output, cors_origin),
        Err(e) => {
            error!(request_id = %request_id, error = %e, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY).into_response()
        }
    }
}

async fn parse_multipart(req: Request<Body>, ctx: &RequestContext, form_map: &mut HashMap<String, String>) {
    let mut multipart = match Multipart::from_request(req, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            error!(error = %e, "multipart parse failed");
            return;
        }
    };
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or("").to_string();
                if name.is_empty() {
                    continue;
                }
                match field.file_name().map(str::to_string) {
                    Some(file_name) => match field.bytes().await {
                        Ok(bytes) => {
                            ctx.add_file(
                                format!("request.{name}"),
                                FileValue::new(file_name, bytes.to_vec()),
                            );
                        }
                        Err(e) => error!(field = %name, error = %e, "reading upload failed"),
                    },
                    None => {
                        if let Ok(text) = field.text().await {
                            form_map.insert(name, text);
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "multipart field error");
                break;
            }
        }
    }
}

fn parse_pairs(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

fn register_request_funcs(
    ctx: &RequestContext,
    headers: HeaderMap,
    query_map: HashMap<String, String>,
    form_map: HashMap<String, String>,
    url_params: HashMap<String, String>,
    body_bytes: Bytes,
    content_type: String,
) {
    let headers = Arc::new(headers);
    ctx.register_func("header", {
        let headers = Arc::clone(&headers);
        Arc::new(move |args: &[Value]| {
            let name = args.first().map(value_to_string).unwrap_or_default();
            let value = headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            Ok(Value::String(value.to_string()))
        })
    });

    let params = Arc::new((query_map, form_map));
    ctx.register_func("param", {
        let params = Arc::clone(&params);
        Arc::new(move |args: &[Value]| {
            let name = args.first().map(value_to_string).unwrap_or_default();
            let value = params
                .0
                .get(&name)
                .or_else(|| params.1.get(&name))
                .cloned()
                .unwrap_or_default();
            Ok(Value::String(value))
        })
    });

    let url_params = Arc::new(url_params);
    ctx.register_func("urlparam", {
        let url_params = Arc::clone(&url_params);
        Arc::new(move |args: &[Value]| {
            let name = args.first().map(value_to_string).unwrap_or_default();
            Ok(Value::String(url_params.get(&name).cloned().unwrap_or_default()))
        })
    });

    // Lazy JSON parse, once per request, capped at 1 MiB. Non-JSON
    // content, oversize bodies and parse failures all read as empty.
    let parsed: Arc<OnceCell<Option<Value>>> = Arc::new(OnceCell::new());
    ctx.register_func("body", {
        Arc::new(move |args: &[Value]| {
            let key = args.first().map(value_to_string).unwrap_or_default();
            let document = parsed.get_or_init(|| {
                if !content_type.contains("json") {
                    return None;
                }
                if body_bytes.len() > MAX_TEMPLATE_BODY_BYTES {
                    return None;
                }
                serde_json::from_slice(&body_bytes).ok()
            });
            let Some(document) = document else {
                return Ok(Value::String(String::new()));
            };
            Ok(lookup_json_path(document, &key))
        })
    });
}

/// Dotted-path lookup into a parsed body; missing keys read as empty.
fn lookup_json_path(document: &Value, path: &str) -> Value {
    if path.is_empty() {
        return document.clone();
    }
    let mut current = document;
    for segment in path.split('.') {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::String(String::new()),
        }
    }
    current.clone()
}

fn to_response(output: PlanOutput, cors_origin: Option<String>) -> Response {
    let status = if output.code == 0 {
        StatusCode::OK
    } else {
        StatusCode::from_u16(output.code).unwrap_or(StatusCode::OK)
    };
    let mut builder = Response::builder().status(status);
    for (name, value) in &output.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(origin) = cors_origin {
        builder = builder.header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    match builder.body(Body::from(output.body)) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "building response failed");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_BODY).into_response()
        }
    }
}
