//! End-to-end tests against an in-process mock of the QA Foundry API.
//!
//! The mock implements just enough of the backend contract — collection and
//! app CRUD, data source registration, ingestion runs, signed upload slots,
//! and the SSE answer endpoint — to exercise the client, the tag cache, the
//! batched upload protocol, and the streaming parser without a network.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use docsqa::client::FoundryClient;
use docsqa::config::{BackendConfig, ServerConfig, UploadConfig};
use docsqa::models::{
    AnswerRequest, AssociatedDataSource, Collection, DataSourceType, EmbedderConfig,
    IngestionStatus, ModelConfiguration, RagApp, RagAppConfig,
};
use docsqa::serve::build_router;
use docsqa::stream::AnswerEvent;
use docsqa::upload::upload_directory;

// ============ Mock backend ============

#[derive(Default)]
struct MockState {
    base: String,
    collections: HashMap<String, Value>,
    data_sources: Vec<Value>,
    runs: Vec<Value>,
    apps: HashMap<String, Value>,
    uploads: HashMap<String, Vec<u8>>,
    collections_list_hits: usize,
    data_source_list_hits: usize,
    slot_request_sizes: Vec<usize>,
}

type Shared = Arc<Mutex<MockState>>;

fn mock_router(state: Shared) -> Router {
    Router::new()
        .route(
            "/v1/collections",
            get(list_collections).post(create_collection),
        )
        .route(
            "/v1/collections/{name}",
            get(get_collection).delete(delete_collection),
        )
        .route("/v1/collections/{name}/data-sources", post(link_source))
        .route("/v1/collections/{name}/unlink", post(unlink_source))
        .route("/v1/collections/{name}/ingest", post(trigger_ingest))
        .route("/v1/collections/{name}/ingestion-runs", get(list_runs))
        .route(
            "/v1/collections/{name}/ingestion-runs/{run}",
            get(get_run),
        )
        .route("/v1/data-sources", get(list_sources).post(create_source))
        .route("/v1/data-sources/delete", post(delete_source))
        .route("/v1/models", get(list_models))
        .route("/v1/apps", get(list_apps).post(create_app))
        .route("/v1/apps/{name}", get(get_app).delete(delete_app))
        .route("/v1/uploads/batch", post(upload_slots))
        .route("/upload/{*rest}", put(receive_upload))
        .route("/v1/answer", post(answer))
        .with_state(state)
}

async fn spawn_mock() -> (String, Shared) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let state = Arc::new(Mutex::new(MockState {
        base: base.clone(),
        ..Default::default()
    }));
    let app = mock_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, state)
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": [{ "msg": format!("{} not found", what) }] })),
    )
        .into_response()
}

async fn list_collections(State(state): State<Shared>) -> Json<Value> {
    let mut s = state.lock().unwrap();
    s.collections_list_hits += 1;
    let list: Vec<Value> = s.collections.values().cloned().collect();
    Json(json!({ "collections": list }))
}

async fn create_collection(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut s = state.lock().unwrap();
    if s.collections.contains_key(&name) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "detail": [{ "msg": "collection already exists" }] })),
        )
            .into_response();
    }
    s.collections.insert(name, body.clone());
    Json(body).into_response()
}

async fn get_collection(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    match state.lock().unwrap().collections.get(&name) {
        Some(c) => Json(c.clone()).into_response(),
        None => not_found("collection"),
    }
}

async fn delete_collection(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    match state.lock().unwrap().collections.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found("collection"),
    }
}

async fn link_source(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    match s.collections.get_mut(&name) {
        Some(c) => {
            c["associated_data_sources"]
                .as_array_mut()
                .expect("collection has source list")
                .push(body);
            Json(json!({})).into_response()
        }
        None => not_found("collection"),
    }
}

async fn unlink_source(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    match s.collections.get_mut(&name) {
        Some(c) => {
            c["associated_data_sources"]
                .as_array_mut()
                .expect("collection has source list")
                .retain(|linked| linked["data_source_fqn"] != body["data_source_fqn"]);
            Json(json!({})).into_response()
        }
        None => not_found("collection"),
    }
}

async fn trigger_ingest(
    State(state): State<Shared>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    if !s.collections.contains_key(&name) {
        return not_found("collection");
    }
    let run = json!({
        "name": format!("run-{}", s.runs.len() + 1),
        "collection_name": name,
        "data_source_fqn": body["data_source_fqn"],
        "status": "INITIALIZED",
    });
    s.runs.push(run.clone());
    Json(run).into_response()
}

async fn list_runs(State(state): State<Shared>, Path(name): Path<String>) -> Json<Value> {
    let s = state.lock().unwrap();
    let runs: Vec<Value> = s
        .runs
        .iter()
        .filter(|r| r["collection_name"] == json!(name))
        .cloned()
        .collect();
    Json(json!({ "ingestion_runs": runs }))
}

async fn get_run(
    State(state): State<Shared>,
    Path((_, run)): Path<(String, String)>,
) -> Response {
    let s = state.lock().unwrap();
    match s.runs.iter().find(|r| r["name"] == json!(run)) {
        Some(r) => Json(r.clone()).into_response(),
        None => not_found("ingestion run"),
    }
}

async fn list_sources(State(state): State<Shared>) -> Json<Value> {
    let mut s = state.lock().unwrap();
    s.data_source_list_hits += 1;
    Json(json!({ "data_sources": s.data_sources }))
}

async fn create_source(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let kind = body["type"].as_str().unwrap_or("localdir");
    let uri = body["uri"].as_str().unwrap_or_default();
    let source = json!({
        "fqn": format!("{}::{}", kind, uri),
        "type": kind,
        "uri": uri,
        "metadata": body["metadata"],
    });
    state.lock().unwrap().data_sources.push(source.clone());
    Json(source)
}

async fn delete_source(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut s = state.lock().unwrap();
    let before = s.data_sources.len();
    s.data_sources.retain(|d| d["fqn"] != body["data_source_fqn"]);
    if s.data_sources.len() == before {
        return not_found("data source");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_models() -> Json<Value> {
    Json(json!({
        "models": [
            { "name": "openai-main/gpt-4o-mini", "provider": "openai" },
            { "name": "azure/gpt-4", "provider": "azure" }
        ]
    }))
}

async fn list_apps(State(state): State<Shared>) -> Json<Value> {
    let list: Vec<Value> = state.lock().unwrap().apps.values().cloned().collect();
    Json(json!({ "apps": list }))
}

async fn create_app(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    state.lock().unwrap().apps.insert(name, body.clone());
    Json(body)
}

async fn get_app(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    match state.lock().unwrap().apps.get(&name) {
        Some(app) => Json(app.clone()).into_response(),
        None => not_found("app"),
    }
}

async fn delete_app(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    match state.lock().unwrap().apps.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found("app"),
    }
}

async fn upload_slots(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let upload_name = body["upload_name"].as_str().unwrap_or_default();
    let paths: Vec<String> = body["paths"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut s = state.lock().unwrap();
    s.slot_request_sizes.push(paths.len());
    let urls: Vec<Value> = paths
        .iter()
        .map(|p| {
            json!({
                "path": p,
                "signed_url": format!("{}/upload/{}/{}", s.base, upload_name, p),
            })
        })
        .collect();
    Json(json!({ "upload_urls": urls }))
}

async fn receive_upload(
    State(state): State<Shared>,
    Path(rest): Path<String>,
    body: Bytes,
) -> Response {
    if rest.ends_with("bad.txt") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "signing mismatch").into_response();
    }
    state.lock().unwrap().uploads.insert(rest, body.to_vec());
    StatusCode::OK.into_response()
}

async fn answer(Json(body): Json<Value>) -> Response {
    let query = body["query"].as_str().unwrap_or_default();
    let frames = if query.contains("boom") {
        vec![
            "data: {\"type\":\"answer\",\"content\":\"Partial\"}\n\n".to_string(),
            "event: error\ndata: {\"detail\":[{\"msg\":\"model overloaded\"}]}\n\n".to_string(),
        ]
    } else {
        vec![
            "data: {\"type\":\"answer\",\"content\":\"Deploy with \"}\n\n".to_string(),
            concat!(
                "data: {\"type\":\"docs\",\"content\":",
                "[{\"page_content\":\"guide one\",\"metadata\":{}}]}\n\n"
            )
            .to_string(),
            "data: {\"type\":\"answer\",\"content\":\"dqa serve.\"}\n\n".to_string(),
            concat!(
                "data: {\"type\":\"docs\",\"content\":",
                "[{\"page_content\":\"guide two\",\"metadata\":{}}]}\n\n"
            )
            .to_string(),
            "event: end\ndata: {}\n\n".to_string(),
        ]
    };
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(axum::body::Body::from(frames.concat()))
        .unwrap()
}

// ============ Helpers ============

fn backend(base: &str) -> BackendConfig {
    BackendConfig {
        base_url: base.to_string(),
        // Points at a variable the test environment never sets, so requests
        // go out unauthenticated.
        api_key_env: "DQA_TEST_NO_SUCH_KEY".to_string(),
        timeout_secs: 5,
    }
}

fn sample_collection(name: &str) -> Collection {
    Collection {
        name: name.to_string(),
        description: None,
        embedder_config: EmbedderConfig {
            model: "openai-main/text-embedding-3-small".to_string(),
            chunk_size: Some(512),
        },
        associated_data_sources: Vec::new(),
    }
}

// ============ Tests ============

#[tokio::test]
async fn collection_mutations_invalidate_the_list_cache() {
    let (base, state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    assert!(client.list_collections().await.unwrap().is_empty());
    // Second read is served from cache
    assert!(client.list_collections().await.unwrap().is_empty());
    assert_eq!(state.lock().unwrap().collections_list_hits, 1);

    client
        .create_collection(&sample_collection("docs-a"))
        .await
        .unwrap();

    let listed = client.list_collections().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "docs-a");
    assert_eq!(state.lock().unwrap().collections_list_hits, 2);

    client.delete_collection("docs-a").await.unwrap();
    assert!(client.list_collections().await.unwrap().is_empty());
    assert_eq!(state.lock().unwrap().collections_list_hits, 3);
}

#[tokio::test]
async fn duplicate_collection_surfaces_detail_msg() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    client
        .create_collection(&sample_collection("dup"))
        .await
        .unwrap();
    let err = client
        .create_collection(&sample_collection("dup"))
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("collection already exists"),
        "unexpected error: {}",
        err
    );
}

#[tokio::test]
async fn sync_flow_creates_runs_per_linked_source() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    client
        .create_collection(&sample_collection("kb"))
        .await
        .unwrap();
    let source = client
        .create_data_source(DataSourceType::Web, "https://example.com/docs", json!({}))
        .await
        .unwrap();
    client
        .link_data_source(
            "kb",
            &AssociatedDataSource {
                data_source_fqn: source.fqn.clone(),
                parser_config: json!({}),
            },
        )
        .await
        .unwrap();

    let run = client.trigger_ingestion("kb", &source.fqn).await.unwrap();
    assert_eq!(run.status, IngestionStatus::Initialized);

    let runs = client.list_ingestion_runs("kb").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].data_source_fqn, source.fqn);

    let polled = client.get_ingestion_run("kb", &run.name).await.unwrap();
    assert_eq!(polled.name, run.name);
}

#[tokio::test]
async fn data_source_deletion_invalidates_the_list_cache() {
    let (base, state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    let source = client
        .create_data_source(DataSourceType::Web, "https://example.com/kb", json!({}))
        .await
        .unwrap();

    assert_eq!(client.list_data_sources().await.unwrap().len(), 1);
    // Second read is served from cache
    assert_eq!(client.list_data_sources().await.unwrap().len(), 1);
    assert_eq!(state.lock().unwrap().data_source_list_hits, 1);

    client.delete_data_source(&source.fqn).await.unwrap();
    assert!(client.list_data_sources().await.unwrap().is_empty());
    assert_eq!(state.lock().unwrap().data_source_list_hits, 2);
}

#[tokio::test]
async fn unlink_refetches_the_collection_view() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    client
        .create_collection(&sample_collection("kb-unlink"))
        .await
        .unwrap();
    let source = client
        .create_data_source(DataSourceType::Web, "https://example.com/wiki", json!({}))
        .await
        .unwrap();
    client
        .link_data_source(
            "kb-unlink",
            &AssociatedDataSource {
                data_source_fqn: source.fqn.clone(),
                parser_config: json!({}),
            },
        )
        .await
        .unwrap();

    // This read populates the per-collection cache entry
    let linked = client.get_collection("kb-unlink").await.unwrap();
    assert_eq!(linked.associated_data_sources.len(), 1);

    client
        .unlink_data_source("kb-unlink", &source.fqn)
        .await
        .unwrap();

    // A stale cache would still show the linked source here
    let after = client.get_collection("kb-unlink").await.unwrap();
    assert!(after.associated_data_sources.is_empty());
}

#[tokio::test]
async fn upload_batches_sequentially_and_excludes_failures() {
    let (base, state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
    std::fs::write(tmp.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(tmp.path().join("b.txt"), "beta").unwrap();
    std::fs::write(tmp.path().join("bad.txt"), "rejected upstream").unwrap();
    std::fs::write(tmp.path().join("sub/d.txt"), "delta").unwrap();
    std::fs::write(tmp.path().join("z.txt"), "zeta").unwrap();

    let config = UploadConfig {
        batch_size: 2,
        ..UploadConfig::default()
    };
    let outcome = upload_directory(&client, &config, tmp.path(), Some("fixtures".to_string()))
        .await
        .unwrap();

    // Five paths in batches of two: 2 + 2 + 1, awaited in order
    assert_eq!(state.lock().unwrap().slot_request_sizes, vec![2, 2, 1]);

    assert_eq!(
        outcome.completed,
        vec!["a.txt", "b.txt", "sub/d.txt", "z.txt"]
    );
    assert_eq!(outcome.failed, vec!["bad.txt"]);
    assert_eq!(outcome.data_source.fqn, "localdir::fixtures");

    let s = state.lock().unwrap();
    assert_eq!(s.uploads.len(), 4);
    assert_eq!(s.uploads["fixtures/a.txt"], b"alpha");
    assert_eq!(s.uploads["fixtures/sub/d.txt"], b"delta");
    assert!(!s.uploads.contains_key("fixtures/bad.txt"));
    // Exactly one registration for the whole batch set
    assert_eq!(s.data_sources.len(), 1);
}

#[tokio::test]
async fn upload_rejects_sets_over_the_size_ceiling() {
    let (base, state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("big.bin"), vec![0u8; 2 * 1024 * 1024]).unwrap();

    let config = UploadConfig {
        max_file_mb: 1,
        ..UploadConfig::default()
    };
    let err = upload_directory(&client, &config, tmp.path(), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ceiling"), "got: {}", err);
    // Nothing left the machine
    assert!(state.lock().unwrap().slot_request_sizes.is_empty());
}

fn answer_request(query: &str) -> AnswerRequest {
    AnswerRequest {
        collection_name: "kb".to_string(),
        query: query.to_string(),
        model_configuration: ModelConfiguration {
            name: "openai-main/gpt-4o-mini".to_string(),
        },
        retriever_name: "vectorstore".to_string(),
        retriever_config: json!({ "top_k": 5 }),
        stream: true,
    }
}

#[tokio::test]
async fn streamed_answer_accumulates_in_arrival_order() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    let mut seen = Vec::new();
    let result = client
        .stream_answer(&answer_request("how do I deploy?"), |event| {
            seen.push(match event {
                AnswerEvent::Answer(_) => "answer",
                AnswerEvent::Docs(_) => "docs",
                AnswerEvent::End => "end",
                AnswerEvent::Error(_) => "error",
            });
        })
        .await
        .unwrap();

    assert_eq!(result.answer, "Deploy with dqa serve.");
    assert_eq!(result.docs.len(), 2);
    assert_eq!(result.docs[0].page_content, "guide one");
    assert_eq!(result.docs[1].page_content, "guide two");
    assert!(result.error.is_none());
    assert!(result.is_closed());
    assert_eq!(seen, vec!["answer", "docs", "answer", "docs", "end"]);
}

#[tokio::test]
async fn streamed_error_closes_with_detail_msg() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    let result = client
        .stream_answer(&answer_request("boom"), |_| {})
        .await
        .unwrap();

    assert_eq!(result.answer, "Partial");
    assert_eq!(result.error.as_deref(), Some("model overloaded"));
    assert!(result.is_closed());
}

#[tokio::test]
async fn chat_models_are_listed_and_cached() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    let models = client.list_chat_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].name, "openai-main/gpt-4o-mini");
    assert!(!client.cache.is_empty());
}

#[tokio::test]
async fn app_lifecycle_round_trips_and_invalidates() {
    let (base, _state) = spawn_mock().await;
    let client = FoundryClient::new(&backend(&base)).unwrap();

    assert!(client.list_apps().await.unwrap().is_empty());

    client
        .create_app(&RagApp {
            name: "support-bot".to_string(),
            config: RagAppConfig {
                collection_name: "kb".to_string(),
                model_name: "openai-main/gpt-4o-mini".to_string(),
                retriever_name: "vectorstore".to_string(),
                retriever_config: json!({ "top_k": 10 }),
                system_prompt: Some("Answer from the docs only.".to_string()),
            },
        })
        .await
        .unwrap();

    let apps = client.list_apps().await.unwrap();
    assert_eq!(apps.len(), 1);

    let app = client.get_app("support-bot").await.unwrap();
    assert_eq!(app.config.collection_name, "kb");
    assert_eq!(
        app.config.system_prompt.as_deref(),
        Some("Answer from the docs only.")
    );

    client.delete_app("support-bot").await.unwrap();
    assert!(client.list_apps().await.unwrap().is_empty());
    let err = client.get_app("support-bot").await.unwrap_err();
    assert!(err.to_string().contains("app not found"), "got: {}", err);
}

// ============ Companion server ============

async fn spawn_proxy(server: &ServerConfig) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = build_router(server);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test]
async fn companion_server_proxies_and_serves_static() {
    let (backend_base, _state) = spawn_mock().await;

    let static_dir = tempfile::TempDir::new().unwrap();
    std::fs::write(static_dir.path().join("index.html"), "<html>docsqa</html>").unwrap();
    std::fs::create_dir_all(static_dir.path().join("assets")).unwrap();
    std::fs::write(static_dir.path().join("assets/app.js"), "console.log(1)").unwrap();

    let server = ServerConfig {
        bind: "unused".to_string(),
        static_dir: static_dir.path().to_path_buf(),
        svc_upstream: backend_base.clone(),
        ml_upstream: backend_base.clone(),
        monitoring_upstream: "http://127.0.0.1:9".to_string(),
        build_upstream: backend_base.clone(),
    };
    let proxy_base = spawn_proxy(&server).await;
    let http = reqwest::Client::new();

    // Health endpoints
    let ready: Value = http
        .get(format!("{}/readyz", proxy_base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ready["status"], "ready");
    let live = http
        .get(format!("{}/livez", proxy_base))
        .send()
        .await
        .unwrap();
    assert_eq!(live.status(), reqwest::StatusCode::OK);

    // Proxied API call (prefix stripped, query forwarded)
    let models: Value = http
        .get(format!("{}/api/svc/v1/models?model_type=chat", proxy_base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["models"][0]["name"], "openai-main/gpt-4o-mini");

    // Unreachable upstream maps to 502 with the standard error body
    let down = http
        .get(format!("{}/api/monitoring/metrics", proxy_base))
        .send()
        .await
        .unwrap();
    assert_eq!(down.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = down.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream_unreachable");

    // Static assets, and SPA fallback for client-side routes
    let asset = http
        .get(format!("{}/assets/app.js", proxy_base))
        .send()
        .await
        .unwrap();
    assert_eq!(asset.text().await.unwrap(), "console.log(1)");
    let spa = http
        .get(format!("{}/collections/kb/edit", proxy_base))
        .send()
        .await
        .unwrap();
    assert_eq!(spa.text().await.unwrap(), "<html>docsqa</html>");
}
