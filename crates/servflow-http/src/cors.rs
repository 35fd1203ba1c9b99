//! Per-API CORS enforcement.
//!
//! Allowed origins come first from the API's own config, otherwise from
//! the engine-wide list. When an allow-list is in effect, a missing or
//! disallowed origin short-circuits the request with 403 before the
//! plan runs. Without one, requests pass untouched.

use crate::{Endpoint, EngineState};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use servflow_config::HttpConfig;
use std::sync::Arc;

const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// The allow-list in effect for an endpoint.
pub(crate) fn allow_list<'a>(state: &'a EngineState, http: &'a HttpConfig) -> &'a [String] {
    if http.cors_allowed_origins.is_empty() {
        &state.cors_allowed_origins
    } else {
        &http.cors_allowed_origins
    }
}

/// Whether a request passes the allow-list. An empty list admits
/// everything; a non-empty list requires a matching (or wildcard)
/// origin.
pub(crate) fn origin_allowed(list: &[String], origin: Option<&str>) -> bool {
    if list.is_empty() {
        return true;
    }
    match origin {
        Some(origin) => list.iter().any(|allowed| allowed == "*" || allowed == origin),
        None => false,
    }
}

/// Implicit OPTIONS handler for a route: answer preflight for any of the
/// endpoints registered on the path.
pub(crate) fn preflight(
    state: &EngineState,
    endpoints: &[Arc<Endpoint>],
    req: &Request,
) -> Response {
    let origin = req
        .headers()
        .get(http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    let admitted = endpoints
        .iter()
        .any(|ep| origin_allowed(allow_list(state, &ep.http), origin));
    if !admitted {
        return StatusCode::FORBIDDEN.into_response();
    }

    let methods: Vec<String> = endpoints
        .iter()
        .map(|ep| ep.http.method.to_uppercase())
        .chain(std::iter::once("OPTIONS".to_string()))
        .collect();

    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(http::header::ACCESS_CONTROL_ALLOW_METHODS, methods.join(", "))
        .header(http::header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS);
    if let Some(origin) = origin {
        builder = builder.header(http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    builder
        .body(axum::body::Body::empty())
        .unwrap_or_else(|_| StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(origins: &[&str]) -> Vec<String> {
        origins.iter().map(|o| o.to_string()).collect()
    }

    #[test]
    fn empty_list_admits_everything() {
        assert!(origin_allowed(&[], None));
        assert!(origin_allowed(&[], Some("https://evil.example")));
    }

    #[test]
    fn nonempty_list_requires_matching_origin() {
        let allowed = list(&["https://app.example"]);
        assert!(origin_allowed(&allowed, Some("https://app.example")));
        assert!(!origin_allowed(&allowed, Some("https://evil.example")));
        assert!(!origin_allowed(&allowed, None));
    }

    #[test]
    fn wildcard_admits_any_present_origin() {
        let allowed = list(&["*"]);
        assert!(origin_allowed(&allowed, Some("https://anywhere.example")));
        assert!(!origin_allowed(&allowed, None));
    }

    #[test]
    fn api_list_overrides_engine_list() {
        let state = EngineState {
            endpoints: Vec::new(),
            tools: Vec::new(),
            cors_allowed_origins: list(&["https://engine.example"]),
            idle: None,
            debug: false,
            started_at: std::time::Instant::now(),
        };
        let mut http = HttpConfig::default();
        assert_eq!(allow_list(&state, &http), list(&["https://engine.example"]).as_slice());
        http.cors_allowed_origins = list(&["https://api.example"]);
        assert_eq!(allow_list(&state, &http), list(&["https://api.example"]).as_slice());
    }
}
