//! HTTP API tests against an in-memory store on an ephemeral port.

use std::fs;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use catalog_search::config::parse_config;
use catalog_search_core::store::memory::InMemoryStore;
use catalog_search_core::store::Store;
use catalog_search::embedding::DisabledProvider;
use catalog_search::server::{router, AppState};

const CATALOG: &str = r#"{
    "tables": [{
        "id": "t-users", "data_source_id": "wh", "name": "users",
        "description": "Registered accounts",
        "columns": [{"id": "c-email", "name": "email", "data_type": "text"}]
    }],
    "sample_queries": [{
        "id": "q-inactive", "data_source_id": "wh",
        "question": "find inactive users", "sql": "SELECT * FROM users WHERE active = false"
    }]
}"#;

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

async fn start() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let catalog_path = tmp.path().join("catalog.json");
    fs::write(&catalog_path, CATALOG).unwrap();

    let config = parse_config(&format!(
        r#"[db]
path = "{}/unused.sqlite"

[catalog]
path = "{}"
"#,
        tmp.path().display(),
        catalog_path.display()
    ))
    .unwrap();

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let app = router(AppState::new(config, store, Arc::new(DisabledProvider)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let server = start().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["embeddings_enabled"], false);
}

#[tokio::test]
async fn test_sync_then_search() {
    let server = start().await;

    let (status, report) = server
        .post("/sync/scope", json!({ "data_source_id": "wh" }))
        .await;
    assert_eq!(status, 200, "{}", report);
    assert_eq!(report["created"], 3);

    let (status, resp) = server
        .post(
            "/search",
            json!({ "query": "inactive users", "method": "SPARSE", "scope": { "data_source_id": "wh" } }),
        )
        .await;
    assert_eq!(status, 200, "{}", resp);
    assert_eq!(resp["method"], "SPARSE");
    assert_eq!(resp["results"][0]["source_id"], "q-inactive");

    let id = resp["results"][0]["id"].as_str().unwrap().to_string();
    let (status, item) = server.get(&format!("/items/{}", id)).await;
    assert_eq!(status, 200);
    assert_eq!(item["item_type"], "SAMPLE_QUERY");
    assert_eq!(item["needs_embedding"], true);
}

#[tokio::test]
async fn test_hybrid_without_provider_is_degraded() {
    let server = start().await;
    server
        .post("/sync/item", json!({ "source_id": "q-inactive", "item_type": "sample_query" }))
        .await;

    let (status, resp) = server.post("/search", json!({ "query": "inactive" })).await;
    assert_eq!(status, 200);
    assert_eq!(resp["method"], "HYBRID");
    assert_eq!(resp["dense_degraded"], true);
    assert_eq!(resp["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_mapping() {
    let server = start().await;

    let (status, body) = server.get("/items/does-not-exist").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = server
        .post("/search", json!({ "query": "users", "top_k": 0 }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server
        .post("/sync/item", json!({ "source_id": "x", "item_type": "widget" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server.post("/embed", json!({})).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "provider_error");
}
