use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use flowdock_core::{compile, CompileProfile, ComponentDefinition, ComponentId, Document, FlowDefinition};
use flowdock_document_store::{DocumentStorage, FileDocumentStorage, MemoryDocumentStorage, SharedDocument};
use flowdock_server::{api::build_router, EngineError, FlowEngine, FlowdockServer, LocalFlowEngine, ServerConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestContext {
    router: Router,
    server: Arc<FlowdockServer>,
    storage: MemoryDocumentStorage,
    engine: Arc<LocalFlowEngine>,
}

fn test_config() -> ServerConfig {
    ServerConfig {
        port: 0,
        bind_address: "127.0.0.1".to_string(),
        document_store_url: "memory://".to_string(),
        log_level: "debug".to_string(),
        startup_sync_delay_ms: 0,
        ..Default::default()
    }
}

// Helper to set up the test context around an initial document
fn setup_test(initial: Value) -> TestContext {
    let document: Document = serde_json::from_value(initial).unwrap();
    let storage = MemoryDocumentStorage::with_document(document.clone());
    let shared = Arc::new(SharedDocument::new(document, Arc::new(storage.clone())));
    let engine = Arc::new(LocalFlowEngine::new());

    let server = Arc::new(FlowdockServer::new(test_config(), shared, engine.clone()));

    TestContext {
        router: build_router(server.clone()),
        server,
        storage,
        engine,
    }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn api_body(name: &str) -> String {
    let def = ComponentDefinition::new(name, "$.send('output', data)");
    let id = ComponentId::from_name(name);
    compile(&def, &id, CompileProfile::Api).compiled.into_string()
}

#[tokio::test]
async fn test_register_and_list_component() {
    let ctx = setup_test(json!({}));

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "$.send('output', data*2)" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["id"], "double");
    assert_eq!(body["message"], "Component registered successfully");
    assert_eq!(
        body["component"],
        json!({
            "id": "double",
            "name": "double",
            "icon": "ti ti-code",
            "group": "Custom",
            "color": "#ff6600"
        })
    );

    let (status, body) = send(&ctx.router, "GET", "/api/flow/components", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(body["components"][0]["id"], "double");
    assert_eq!(body["components"][0]["author"], "API");
    assert_eq!(body["components"][0]["version"], "1.0.0");

    let stored = ctx.storage.stored().await.unwrap();
    let compiled = stored.component("double").and_then(Value::as_str).unwrap();
    assert!(compiled.starts_with("<script total>"));
    assert!(compiled.contains("$.send(\\'output\\', data*2)"));
    // the compiled body keeps its own group default
    assert!(compiled.contains("exports.group = 'Common';"));
}

#[tokio::test]
async fn test_register_uses_display_name_and_lowercase_id() {
    let ctx = setup_test(json!({}));

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({
            "name": "Double_It",
            "displayName": "Double it",
            "icon": "ti ti-calculator",
            "code": "$.send('output', data*2)"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "double_it");
    assert_eq!(body["component"]["name"], "Double it");
    assert_eq!(body["component"]["icon"], "ti ti-calculator");
}

#[tokio::test]
async fn test_propagates_without_overwriting_flow_copies() {
    let ctx = setup_test(json!({
        "variables": { "token": "abc" },
        "f1": { "name": "First", "components": {} },
        "f2": { "name": "Second", "components": { "double": "flow-local copy" } }
    }));

    let (status, _) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "$.send('output', data*2)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let stored = ctx.storage.stored().await.unwrap();
    let registry_body = stored.component("double").cloned().unwrap();
    assert_eq!(stored.flows["f1"]["components"]["double"], registry_body);
    assert_eq!(stored.flows["f2"]["components"]["double"], "flow-local copy");

    // both flows were reloaded with the runtime settings applied
    assert_eq!(ctx.engine.loaded_count(), 2);
    let f1 = ctx.engine.loaded("f1").unwrap().definition;
    assert_eq!(f1.variables2, Some(json!({ "token": "abc" })));
    assert_eq!(f1.env.as_deref(), Some("dev"));
    assert_eq!(stored.flows["f1"]["env"], "dev");
}

#[tokio::test]
async fn test_register_rejects_invalid_name() {
    let ctx = setup_test(json!({ "f1": { "components": {} } }));

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "bad-name", "code": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Component name must contain only letters, numbers, and underscores"
    );
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_COMPONENT_INVALID_NAME");

    // nothing was written
    assert_eq!(ctx.storage.write_count(), 0);
    assert_eq!(ctx.server.document().revision().await, 0);
}

#[tokio::test]
async fn test_register_requires_name_and_code() {
    let ctx = setup_test(json!({}));

    let (status, body) = send(&ctx.router, "POST", "/api/flow/register", Some(json!({ "code": "x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Component name is required");

    let (status, body) = send(&ctx.router, "POST", "/api/flow/register", Some(json!({ "name": "ok" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Component code is required");

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "", "code": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Component name is required");
}

#[tokio::test]
async fn test_register_rejects_malformed_body() {
    let ctx = setup_test(json!({}));

    let request = Request::builder()
        .method("POST")
        .uri("/api/flow/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = ctx.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["errorDetails"]["errorCode"], "ERR_BAD_REQUEST");
}

#[tokio::test]
async fn test_register_tolerates_unparsable_ports() {
    let ctx = setup_test(json!({}));

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "lenient", "code": "x", "inputs": "not json", "meta": "{broken" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let stored = ctx.server.service().registry().get("lenient").await.unwrap();
    assert!(stored.as_str().contains("exports.inputs = [{'id':'input','name':'Input'}];"));
}

#[tokio::test]
async fn test_register_reports_persist_failure() {
    let ctx = setup_test(json!({}));
    ctx.storage.set_fail_writes(true);

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to register component:"));
}

#[tokio::test]
async fn test_register_survives_unreadable_document() {
    let ctx = setup_test(json!({ "f1": { "components": {} } }));
    ctx.storage.set_fail_reads(true);

    let (status, body) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // reload was aborted, the in-memory document keeps the registration
    assert_eq!(ctx.engine.loaded_count(), 0);
    let document = ctx.server.document().snapshot().await;
    assert!(document.component("double").is_some());
    assert!(document.flows["f1"]["components"]["double"].is_string());
}

#[tokio::test]
async fn test_list_skips_malformed_entries() {
    let ctx = setup_test(json!({
        "components": {
            "good": api_body("good"),
            "markerless": "<script total>exports.icon = 'x';</script>",
            "numeric": 42,
            "empty": ""
        }
    }));

    let (status, body) = send(&ctx.router, "GET", "/api/flow/components", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["components"].as_array().unwrap().len(), 1);
    assert_eq!(body["components"][0]["id"], "good");
}

#[tokio::test]
async fn test_refresh_propagates_api_components_only() {
    let ctx = setup_test(json!({
        "components": {
            "legacy": api_body("legacy"),
            "native": "<script total>exports.id = 'native'; exports.name = 'Native'; exports.author = 'Someone';</script>"
        },
        "f1": { "name": "First" }
    }));

    let (status, body) = send(&ctx.router, "POST", "/api/flow/refresh-components", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "message": "Components refreshed successfully" })
    );

    let stored = ctx.storage.stored().await.unwrap();
    assert!(stored.flows["f1"]["components"]["legacy"].is_string());
    assert!(stored.flows["f1"]["components"].get("native").is_none());
}

#[tokio::test]
async fn test_startup_sync_catches_up_flows() {
    let ctx = setup_test(json!({
        "components": { "legacy": api_body("legacy") },
        "f1": { "components": {} },
        "f2": { "components": null }
    }));

    ctx.server.spawn_startup_sync().await.unwrap();

    let stored = ctx.storage.stored().await.unwrap();
    assert!(stored.flows["f1"]["components"]["legacy"].is_string());
    assert!(stored.flows["f2"]["components"]["legacy"].is_string());
}

#[tokio::test]
async fn test_health_reports_document_state() {
    let ctx = setup_test(json!({
        "components": { "legacy": api_body("legacy") },
        "f1": {},
        "f2": {}
    }));

    let (status, body) = send(&ctx.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
    assert_eq!(body["document"]["flows"], 2);
    assert_eq!(body["document"]["components"], 1);
    assert_eq!(body["document"]["location"], "memory://");
}

#[tokio::test]
async fn test_health_reports_last_reload() {
    let ctx = setup_test(json!({ "f1": {}, "f2": {} }));

    let (_, body) = send(&ctx.router, "GET", "/health", None).await;
    assert_eq!(body["engine"]["loadedFlows"], Value::Null);

    let (status, _) = send(
        &ctx.router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&ctx.router, "GET", "/health", None).await;
    assert_eq!(body["engine"]["loadedFlows"], 2);
    assert_eq!(body["engine"]["failedFlows"], 0);
    assert_eq!(ctx.engine.loaded_count(), 2);
}

// Engine that takes a while per flow
struct SlowEngine {
    delay: Duration,
    loaded: AtomicUsize,
}

#[async_trait]
impl FlowEngine for SlowEngine {
    async fn load(&self, _flow_id: &str, _flow: &FlowDefinition) -> Result<(), EngineError> {
        tokio::time::sleep(self.delay).await;
        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_slow_reload_completes_past_request_timeout() {
    let document: Document = serde_json::from_value(json!({ "f1": {}, "f2": {} })).unwrap();
    let storage = MemoryDocumentStorage::with_document(document.clone());
    let shared = Arc::new(SharedDocument::new(document, Arc::new(storage.clone())));
    let engine = Arc::new(SlowEngine {
        delay: Duration::from_millis(800),
        loaded: AtomicUsize::new(0),
    });
    let config = ServerConfig {
        request_timeout_secs: 1,
        ..test_config()
    };
    let server = Arc::new(FlowdockServer::new(config, shared.clone(), engine.clone()));
    let router = build_router(server);

    let (status, body) = send(
        &router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "x" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(engine.loaded.load(Ordering::SeqCst), 2);
    assert_eq!(shared.persisted_revision().await, shared.revision().await);
    let stored = storage.stored().await.unwrap();
    assert!(stored.flows["f1"]["components"]["double"].is_string());
}

#[tokio::test]
async fn test_register_with_file_backed_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("database.json");
    std::fs::write(&path, json!({ "f1": { "components": {} } }).to_string()).unwrap();

    let storage: Arc<dyn DocumentStorage> = Arc::new(FileDocumentStorage::new(&path));
    let shared = Arc::new(SharedDocument::load(storage).await.unwrap());
    let engine = Arc::new(LocalFlowEngine::new());
    let server = Arc::new(FlowdockServer::new(test_config(), shared, engine.clone()));
    let router = build_router(server);

    let (status, _) = send(
        &router,
        "POST",
        "/api/flow/register",
        Some(json!({ "name": "double", "code": "$.send('output', data*2)" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert!(on_disk["components"]["double"].is_string());
    assert!(on_disk["f1"]["components"]["double"].is_string());
    assert_eq!(engine.loaded_count(), 1);
}
