use flowdock_core::{compile, CompileProfile, CompiledComponent, ComponentDefinition, ComponentId, Document};
use flowdock_document_store::{MemoryDocumentStorage, SharedDocument};
use flowdock_server::{FlowSynchronizer, RegistryStore};
use serde_json::{json, Value};
use std::sync::Arc;

struct Fixture {
    synchronizer: FlowSynchronizer,
    registry: Arc<RegistryStore>,
    shared: Arc<SharedDocument>,
    storage: MemoryDocumentStorage,
}

fn setup(initial: Value) -> Fixture {
    let document: Document = serde_json::from_value(initial).unwrap();
    let storage = MemoryDocumentStorage::with_document(document.clone());
    let shared = Arc::new(SharedDocument::new(document, Arc::new(storage.clone())));
    let registry = Arc::new(RegistryStore::new(shared.clone()));
    Fixture {
        synchronizer: FlowSynchronizer::new(shared.clone(), registry.clone()),
        registry,
        shared,
        storage,
    }
}

fn compiled(name: &str, code: &str) -> CompiledComponent {
    let id = ComponentId::from_name(name);
    compile(&ComponentDefinition::new(name, code), &id, CompileProfile::Api).compiled
}

#[tokio::test]
async fn test_propagate_adds_to_flows_missing_the_component() {
    let fx = setup(json!({
        "variables": {},
        "f1": { "components": {} },
        "f2": { "components": { "double": "flow-local copy" } },
        "f3": { "name": "No components yet" }
    }));
    let body = compiled("double", "$.send('output', data*2)");

    let propagation = fx.synchronizer.propagate("double", &body).await.unwrap();

    assert_eq!(propagation.added, vec!["f1", "f3"]);
    assert_eq!(propagation.skipped, vec!["f2"]);

    let stored = fx.storage.stored().await.unwrap();
    assert_eq!(stored.flows["f1"]["components"]["double"], body.as_str());
    assert_eq!(stored.flows["f2"]["components"]["double"], "flow-local copy");
    assert_eq!(stored.flows["f3"]["components"]["double"], body.as_str());
    assert_eq!(stored.flows["f3"]["name"], "No components yet");
    assert!(stored.variables.is_some());
}

#[tokio::test]
async fn test_propagate_twice_equals_once() {
    let fx = setup(json!({ "f1": {}, "f2": { "components": {} } }));
    let body = compiled("double", "x");

    fx.synchronizer.propagate("double", &body).await.unwrap();
    let once = fx.shared.snapshot().await;

    let second = fx.synchronizer.propagate("double", &body).await.unwrap();
    assert!(second.added.is_empty());
    assert_eq!(fx.shared.snapshot().await, once);
}

#[tokio::test]
async fn test_propagate_never_replaces_existing_copy() {
    let fx = setup(json!({ "f1": {} }));
    let first = compiled("double", "first");
    let second = compiled("double", "second");

    fx.synchronizer.propagate("double", &first).await.unwrap();
    fx.synchronizer.propagate("double", &second).await.unwrap();

    let stored = fx.storage.stored().await.unwrap();
    assert_eq!(stored.flows["f1"]["components"]["double"], first.as_str());
}

#[tokio::test]
async fn test_propagate_all_only_moves_api_components() {
    let fx = setup(json!({
        "components": {
            "native": "exports.id = 'native'; exports.name = 'Native'; exports.author = 'Vendor';",
            "legacy": compiled("legacy", "x").into_string()
        },
        "f1": {},
        "f2": { "components": { "legacy": "kept" } }
    }));

    let added = fx.synchronizer.propagate_all_api_components().await.unwrap();
    assert_eq!(added, 1);

    let stored = fx.storage.stored().await.unwrap();
    assert!(stored.flows["f1"]["components"]["legacy"].is_string());
    assert!(stored.flows["f1"]["components"].get("native").is_none());
    assert_eq!(stored.flows["f2"]["components"]["legacy"], "kept");
}

#[tokio::test]
async fn test_propagate_all_skips_persist_when_nothing_changes() {
    let fx = setup(json!({ "f1": {} }));
    let id = ComponentId::from_name("double");
    let compilation = compile(&ComponentDefinition::new("double", "x"), &id, CompileProfile::Api);
    fx.registry.put(&id, &compilation).await.unwrap();
    fx.synchronizer.propagate_all_api_components().await.unwrap();
    let writes = fx.storage.write_count();

    let added = fx.synchronizer.propagate_all_api_components().await.unwrap();

    assert_eq!(added, 0);
    assert_eq!(fx.storage.write_count(), writes);
}

#[tokio::test]
async fn test_propagate_reports_persist_failure() {
    let fx = setup(json!({ "f1": {} }));
    fx.storage.set_fail_writes(true);

    let result = fx.synchronizer.propagate("double", &compiled("double", "x")).await;

    assert!(result.is_err());
    // the in-memory document still carries the propagated copy
    let document = fx.shared.snapshot().await;
    assert!(document.flows["f1"]["components"]["double"].is_string());
}
