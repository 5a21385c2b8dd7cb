use axum::body::Body;
use axum::http::{Request, StatusCode};
use code_index_mcp::mcp::http::make_app;
use code_index_mcp::mcp::{build_registry, Dispatcher};
use code_index_mcp::session::{SessionContext, SharedSession};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn make_dispatcher(dir: &TempDir) -> Dispatcher {
    let session = SharedSession::new(SessionContext::new(dir.path().join("settings")));
    Dispatcher::new(build_registry().unwrap(), session)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_execute(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp/execute")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_is_static() {
    let dir = TempDir::new().unwrap();
    let app = make_app(make_dispatcher(&dir));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "service": "code-index-mcp"})
    );
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let dir = TempDir::new().unwrap();
    let app = make_app(make_dispatcher(&dir));
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let body = body_json(app.oneshot(request).await.unwrap()).await;
    assert_eq!(body["name"], "CodeIndexer");
    assert_eq!(body["endpoints"]["health"], "/health");
    assert_eq!(body["endpoints"]["execute"], "/mcp/execute");
}

#[tokio::test]
async fn test_execute_ping_without_handshake() {
    let dir = TempDir::new().unwrap();
    let dispatcher = make_dispatcher(&dir);
    let session = dispatcher.session().clone();
    let app = make_app(dispatcher);

    let response = app.oneshot(post_execute(r#"{"method":"ping"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["result"], json!({}));

    let ctx = session.lock();
    assert!(!ctx.is_torn_down());
    assert_eq!(ctx.base_path(), "");
}

#[tokio::test]
async fn test_execute_dispatches_through_registry() {
    let dir = TempDir::new().unwrap();
    let app = make_app(make_dispatcher(&dir));
    let response = app
        .oneshot(post_execute(r#"{"jsonrpc":"2.0","id":8,"method":"tools/list"}"#))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["id"], 8);
    let tools = body["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "set_project_path"));
}

#[tokio::test]
async fn test_execute_unknown_method_is_structured_error() {
    let dir = TempDir::new().unwrap();
    let app = make_app(make_dispatcher(&dir));
    let response = app
        .oneshot(post_execute(r#"{"jsonrpc":"2.0","id":"x","method":"nope"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "x");
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_execute_malformed_body() {
    let dir = TempDir::new().unwrap();
    let app = make_app(make_dispatcher(&dir));
    let response = app.oneshot(post_execute("not json at all")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], -32700);
    assert!(body["message"].is_string());

    let app = make_app(make_dispatcher(&dir));
    let response = app.oneshot(post_execute("[1, 2]")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], -32600);
}

#[tokio::test]
async fn test_execute_initialize_returns_server_info() {
    let dir = TempDir::new().unwrap();
    let app = make_app(make_dispatcher(&dir));
    let response = app
        .oneshot(post_execute(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["id"], 1);
    assert!(body.get("error").is_none());
    assert_eq!(body["result"]["serverInfo"]["name"], "CodeIndexer");
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
}
