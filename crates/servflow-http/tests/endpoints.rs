//! End-to-end tests driving the full router in-process.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use servflow_config::ApiConfig;
use servflow_core::ActionRegistry;
use servflow_http::{build_engine, build_router, EngineOptions};
use std::sync::Arc;
use tower::ServiceExt;

static REGISTRY: Lazy<ActionRegistry> = Lazy::new(|| {
    let registry = ActionRegistry::new();
    servflow_actions::register_builtin_actions(&registry).expect("register actions");
    registry
});

fn router_for(yaml: &str) -> Router {
    router_with_options(yaml, EngineOptions::default())
}

fn router_with_options(yaml: &str, options: EngineOptions) -> Router {
    let configs: Vec<ApiConfig> = vec![serde_yaml::from_str(yaml).expect("parse config")];
    let (state, failures) = build_engine(&configs, &REGISTRY, options, None);
    assert!(failures.is_empty(), "compile failures: {failures:?}");
    build_router(Arc::new(state))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn health_route_is_always_registered() {
    let configs: Vec<ApiConfig> = Vec::new();
    let (state, failures) = build_engine(&configs, &REGISTRY, EngineOptions::default(), None);
    assert!(failures.is_empty());
    let router = build_router(Arc::new(state));

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn hello_world_scenario() {
    let router = router_for(
        r#"
id: hello
http:
  listenPath: hello
  method: GET
  next: action.greet
actions:
  greet:
    type: stub
    config:
      message: "Hello from direct config!"
    next: response.success
responses:
  success:
    code: 200
    template: '{"greeting": "{{ .variable_actions_greet.message }}"}'
"#,
    );

    let response = router
        .oneshot(Request::get("/hello").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(
        body_string(response).await,
        r#"{"greeting": "Hello from direct config!"}"#
    );
}

#[tokio::test]
async fn body_echo_scenario() {
    let router = router_for(
        r#"
id: echo
http:
  listenPath: echo
  method: POST
  next: action.echo
actions:
  echo:
    type: stub
    config:
      input: '{{ body "message" }}'
    next: response.out
responses:
  out:
    code: 200
    template: '{"echoed": "{{ .variable_actions_echo.input }}"}'
"#,
    );

    let response = router
        .oneshot(
            Request::post("/echo")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"message":"test echo message"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"echoed": "test echo message"}"#);
}

#[tokio::test]
async fn url_parameter_scenario() {
    let router = router_for(
        r#"
id: urlparams
http:
  listenPath: test/{id}
  method: POST
  next: action.a1
actions:
  a1:
    type: stub
    next: response.finish
responses:
  finish:
    code: 200
    template: '{{ urlparam "id" }}'
"#,
    );

    let response = router
        .oneshot(Request::post("/test/hello").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "hello");
}

#[tokio::test]
async fn failure_routing_scenario() {
    // jwt validation of garbage fails at run time and routes to the
    // fail edge, surfacing the message under the error variable.
    let router = router_for(
        r#"
id: failing
http:
  listenPath: fail
  method: GET
  next: action.check
actions:
  check:
    type: jwt
    config:
      mode: validate
      secret: s3cret
      token: not-a-token
    next: response.ok
    fail: response.err
responses:
  ok:
    code: 200
    template: fine
  err:
    code: 400
    template: '{"error":"{{ .error }}"}'
"#,
    );

    let response = router
        .oneshot(Request::get("/fail").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response).await;
    assert!(body.contains("token invalid"), "{body}");
}

#[tokio::test]
async fn unrecovered_failure_returns_generic_500() {
    let router = router_for(
        r#"
id: failing
http:
  listenPath: fail
  method: GET
  next: action.check
actions:
  check:
    type: jwt
    config:
      mode: validate
      secret: s3cret
      token: not-a-token
    next: response.ok
responses:
  ok:
    code: 200
    template: fine
"#,
    );

    let response = router
        .oneshot(Request::get("/fail").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_string(response).await,
        "error completing request, please reach out to admin"
    );
}

#[tokio::test]
async fn structured_conditional_scenario() {
    let yaml = r#"
id: structured
http:
  listenPath: check
  method: POST
  next: action.seed
actions:
  seed:
    type: stub
    config:
      name: '{{ body "name" }}'
      age: '{{ body "age" }}'
    next: conditional.gate
conditionals:
  gate:
    type: structured
    structure:
      - - function: notempty
          content: "{{ .variable_actions_seed.name }}"
          title: Name
        - function: eq
          content: "{{ .variable_actions_seed.age }}"
          comparison: "18"
    onTrue: response.ok
    onFalse: response.bad
responses:
  ok:
    code: 200
    template: valid
  bad:
    code: 422
    template: '{"error":"{{ .error }}"}'
"#;

    let response = router_for(yaml)
        .oneshot(
            Request::post("/check")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"x","age":"18"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "valid");

    let response = router_for(yaml)
        .oneshot(
            Request::post("/check")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"","age":"18"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_string(response).await;
    assert!(body.contains("Name"), "{body}");
}

#[tokio::test]
async fn object_response_scenario() {
    let router = router_for(
        r#"
id: object
http:
  listenPath: object
  method: GET
  next: action.seed
actions:
  seed:
    type: stub
    config:
      name: alice
      n: 3
    next: response.r
responses:
  r:
    code: 200
    object:
      fields:
        data:
          fields:
            name:
              value: "{{ jsonraw .variable_actions_seed.name }}"
        count:
          value: "{{ jsonraw .variable_actions_seed.n }}"
"#,
    );

    let response = router
        .oneshot(Request::get("/object").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, json!({"data": {"name": "alice"}, "count": 3}));
}

#[tokio::test]
async fn query_and_header_accessors() {
    let router = router_for(
        r#"
id: accessors
http:
  listenPath: accessors
  method: GET
  next: action.grab
actions:
  grab:
    type: stub
    config:
      q: '{{ param "q" }}'
      auth: '{{ header "X-Token" }}'
    next: response.out
responses:
  out:
    code: 200
    template: '{{ .variable_actions_grab.q }}|{{ .variable_actions_grab.auth }}'
"#,
    );

    let response = router
        .oneshot(
            Request::get("/accessors?q=find%20me")
                .header("X-Token", "tok123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "find me|tok123");
}

#[tokio::test]
async fn cors_allow_list_enforced() {
    let yaml = r#"
id: guarded
http:
  listenPath: guarded
  method: GET
  next: response.ok
  corsAllowedOrigins:
    - "https://app.example"
responses:
  ok:
    code: 200
    template: ok
"#;

    // Allowed origin passes and the header is echoed back.
    let response = router_for(yaml)
        .oneshot(
            Request::get("/guarded")
                .header("Origin", "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example"
    );

    // Disallowed origin is rejected before the plan runs.
    let response = router_for(yaml)
        .oneshot(
            Request::get("/guarded")
                .header("Origin", "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Missing origin is rejected when an allow-list is configured.
    let response = router_for(yaml)
        .oneshot(Request::get("/guarded").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Preflight answers with the allowed methods.
    let response = router_for(yaml)
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/guarded")
                .header("Origin", "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let methods = response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("GET"));
}

#[tokio::test]
async fn mcp_list_and_call() {
    let router = router_for(
        r#"
id: tooling
mcpTool:
  name: greeter
  description: Says hello
  next: action.greet
  endValue: '{{ .variable_actions_greet.message }}'
actions:
  greet:
    type: stub
    config:
      message: "Hello {{ .who }}!"
"#,
    );

    let list = router
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let list: Value = serde_json::from_str(&body_string(list).await).unwrap();
    assert_eq!(list["result"]["tools"][0]["name"], json!("greeter"));

    let call = router
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "jsonrpc": "2.0",
                        "id": 2,
                        "method": "tools/call",
                        "params": {"name": "greeter", "arguments": {"who": "world"}},
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let call: Value = serde_json::from_str(&body_string(call).await).unwrap();
    assert_eq!(call["result"]["isError"], json!(false));
    assert_eq!(
        call["result"]["content"][0]["text"],
        json!("Hello world!")
    );
}

#[tokio::test]
async fn debug_routes_are_gated() {
    let yaml = r#"
id: any
http:
  listenPath: any
  method: GET
  next: response.ok
responses:
  ok:
    code: 200
    template: ok
"#;

    let hidden = router_for(yaml)
        .oneshot(Request::get("/debug/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

    let shown = router_with_options(
        yaml,
        EngineOptions {
            debug: true,
            ..EngineOptions::default()
        },
    )
    .oneshot(Request::get("/debug/status").body(Body::empty()).unwrap())
    .await
    .unwrap();
    assert_eq!(shown.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(shown).await).unwrap();
    assert_eq!(body["endpoints"], json!(1));
}
