//! End-to-end tests against the axum application, no sockets involved.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use noteconf::{AuthConfig, NoteConfig, StorageBackend, TokenEntry};
use notehub::serve::{app, open_store};
use notehub::{Gatekeeper, ToolRouter};
use notestore::NodeStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ALICE_TOKEN: &str = "alice-token";
const MALLORY_TOKEN: &str = "mallory-token";

fn auth_config() -> AuthConfig {
    AuthConfig {
        allowed_emails: vec!["alice@example.com".to_string()],
        api_base_url: "https://notes.example.com".to_string(),
        issuer_url: "https://auth.example.com".to_string(),
        tokens: vec![
            TokenEntry {
                token: ALICE_TOKEN.to_string(),
                user_id: "alice".to_string(),
                email: "Alice@Example.com".to_string(),
                name: "Alice".to_string(),
            },
            TokenEntry {
                token: MALLORY_TOKEN.to_string(),
                user_id: "mallory".to_string(),
                email: "mallory@example.com".to_string(),
                name: "Mallory".to_string(),
            },
        ],
        ..AuthConfig::default()
    }
}

fn test_app_with(store: NodeStore, auth: &AuthConfig) -> Router {
    let gate = Arc::new(Gatekeeper::from_config(auth));
    app(ToolRouter::new(store), gate, auth)
}

fn test_app() -> Router {
    test_app_with(NodeStore::in_memory(), &auth_config())
}

fn rpc(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

async fn call_tool(app: &Router, id: i64, name: &str, arguments: Value) -> Value {
    let (status, _, body) = send(
        app,
        rpc(
            Some(ALICE_TOKEN),
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": { "name": name, "arguments": arguments }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["result"].clone()
}

fn payload(result: &Value) -> Value {
    serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&test_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn missing_token_is_challenged() {
    let (status, headers, body) = send(
        &test_app(),
        rpc(None, json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    let challenge = headers[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.contains("error=\"invalid_token\""));
    assert!(challenge.contains(
        "resource_metadata=\"https://notes.example.com/.well-known/oauth-protected-resource\""
    ));
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let (status, _, body) = send(
        &test_app(),
        rpc(Some("nope"), json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid or expired token");
}

#[tokio::test]
async fn email_outside_allow_list_is_forbidden() {
    let (status, headers, body) = send(
        &test_app(),
        rpc(Some(MALLORY_TOKEN), json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert!(headers[header::WWW_AUTHENTICATE]
        .to_str()
        .unwrap()
        .contains("insufficient_scope"));
}

#[tokio::test]
async fn initialize_mints_session() {
    let (status, headers, body) = send(
        &test_app(),
        rpc(
            Some(ALICE_TOKEN),
            json!({
                "jsonrpc": "2.0",
                "id": "init-1",
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": { "name": "test", "version": "0" }
                }
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "init-1");
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");
    assert!(!headers["mcp-session-id"].to_str().unwrap().is_empty());
}

#[tokio::test]
async fn session_header_is_echoed() {
    let mut request = rpc(Some(ALICE_TOKEN), json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }));
    request
        .headers_mut()
        .insert("mcp-session-id", "abc-123".parse().unwrap());

    let (_, headers, _) = send(&test_app(), request).await;
    assert_eq!(headers["mcp-session-id"], "abc-123");
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let (status, _, body) = send(
        &test_app(),
        rpc(
            Some(ALICE_TOKEN),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn malformed_body_is_a_parse_error() {
    let request = Request::post("/mcp")
        .header(header::AUTHORIZATION, format!("Bearer {}", ALICE_TOKEN))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&test_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], -32700);
}

#[tokio::test]
async fn unknown_method_is_reported() {
    let (status, _, body) = send(
        &test_app(),
        rpc(
            Some(ALICE_TOKEN),
            json!({ "jsonrpc": "2.0", "id": 9, "method": "sampling/createMessage" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["id"], 9);
}

#[tokio::test]
async fn note_lifecycle_over_http() {
    let app = test_app();

    let created = call_tool(&app, 1, "notes.set", json!({ "path": "personal", "content": "notes" })).await;
    assert_eq!(created["isError"], false);

    let child = call_tool(
        &app,
        2,
        "notes.set",
        json!({ "path": "personal/preferences", "content": "dark mode", "parentRollup": "notes" }),
    )
    .await;
    assert_eq!(payload(&child)["ok"], true);

    let node = payload(&call_tool(&app, 3, "notes.get", json!({ "path": "personal/preferences" })).await);
    assert_eq!(node["content"], "dark mode");
    let version = node["version"].as_str().unwrap().to_string();

    let listed = payload(&call_tool(&app, 4, "notes.list_paths", json!({ "prefix": "personal" })).await);
    assert_eq!(listed["paths"], json!(["personal", "personal/preferences"]));

    let updated = call_tool(
        &app,
        5,
        "notes.set",
        json!({
            "path": "personal/preferences",
            "content": "light mode",
            "ifMatchVersion": version,
            "parentRollup": "notes, prefers light mode"
        }),
    )
    .await;
    assert_eq!(updated["isError"], false);

    let stale = call_tool(
        &app,
        6,
        "notes.set",
        json!({
            "path": "personal/preferences",
            "content": "sepia",
            "ifMatchVersion": version,
            "parentRollup": "notes, prefers sepia"
        }),
    )
    .await;
    assert_eq!(stale["isError"], true);
    assert_eq!(payload(&stale)["error"]["code"], "CONFLICT");

    // failed child write leaves the parent roll-up alone
    let parent = payload(&call_tool(&app, 7, "notes.get", json!({ "path": "personal" })).await);
    assert_eq!(parent["content"], "notes, prefers light mode");

    let deleted = call_tool(&app, 8, "notes.delete", json!({ "path": "personal/preferences" })).await;
    assert_eq!(payload(&deleted), json!({ "ok": true }));
}

#[tokio::test]
async fn sse_stream_sends_ready_event() {
    let app = test_app();

    let request = Request::get("/mcp/sse")
        .header(header::AUTHORIZATION, format!("Bearer {}", ALICE_TOKEN))
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("data: "));
    assert!(text.contains("notifications/initialized"));

    let request = Request::get("/mcp")
        .header(header::AUTHORIZATION, format!("Bearer {}", ALICE_TOKEN))
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn resource_metadata() {
    let request = Request::get("/.well-known/oauth-protected-resource/mcp")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&test_app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resource"], "https://notes.example.com/mcp");
    assert_eq!(body["authorization_servers"], json!(["https://auth.example.com"]));

    let unconfigured = test_app_with(NodeStore::in_memory(), &AuthConfig::default());
    let request = Request::get("/.well-known/oauth-protected-resource")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&unconfigured, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "OAuth configuration not set");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let request = Request::get("/nope").body(Body::empty()).unwrap();
    let (status, _, body) = send(&test_app(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn dev_mode_accepts_anonymous_requests() {
    let auth = AuthConfig {
        dev_mode: true,
        ..AuthConfig::default()
    };
    let app = test_app_with(NodeStore::in_memory(), &auth);

    let (status, _, body) = send(
        &app,
        rpc(None, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn sqlite_store_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NoteConfig::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.db_path = Some(dir.path().join("nested/notes.db"));

    let app = test_app_with(open_store(&config).unwrap(), &auth_config());
    call_tool(&app, 1, "notes.set", json!({ "path": "inbox", "content": "remember milk" })).await;

    let reopened = test_app_with(open_store(&config).unwrap(), &auth_config());
    let node = payload(&call_tool(&reopened, 2, "notes.get", json!({ "path": "inbox" })).await);
    assert_eq!(node["content"], "remember milk");
}
