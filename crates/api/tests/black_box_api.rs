use std::sync::Arc;

use docembed_api::app::{build_app, AppServices};
use docembed_api::config::AppConfig;
use docembed_core::DocumentId;
use docembed_infra::documents::{DocumentStore, InMemoryDocumentStore};
use docembed_infra::embedding::HashingProvider;
use docembed_infra::jobs::InMemoryJobStore;
use reqwest::StatusCode;
use serde_json::json;

const CRON_SECRET: &str = "test-cron-secret";

struct TestServer {
    base_url: String,
    documents: Arc<InMemoryDocumentStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig {
            cron_secret: CRON_SECRET.to_string(),
            ..AppConfig::default()
        };
        let documents = InMemoryDocumentStore::arc();
        let services = AppServices::new(
            &config,
            InMemoryJobStore::arc(),
            documents.clone(),
            Arc::new(HashingProvider::default()),
        );

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(&config, services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            documents,
            handle,
        }
    }

    fn document(&self, chunks: &[&str]) -> DocumentId {
        let doc = DocumentId::new();
        self.documents.insert_document(doc).unwrap();
        for c in chunks {
            self.documents.add_chunk(doc, *c).unwrap();
        }
        doc
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create_job(client: &reqwest::Client, srv: &TestServer, doc: DocumentId) -> reqwest::Response {
    client
        .post(srv.url("/jobs"))
        .json(&json!({ "documentId": doc.to_string() }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn process_requires_cron_secret() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.post(srv.url("/jobs/process")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = client
        .post(srv.url("/jobs/process"))
        .header("x-cron-secret", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_requires_document_id() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/jobs"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "documentId is required");

    let res = client
        .post(srv.url("/jobs/create"))
        .json(&json!({ "documentId": "not-a-uuid" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_is_idempotent_while_active() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let doc = srv.document(&["hello"]);

    let first = create_job(&client, &srv, doc).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: serde_json::Value = first.json().await.unwrap();
    assert_eq!(first["message"], "Job added to queue");
    assert_eq!(first["status"], "pending");

    let second = create_job(&client, &srv, doc).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second["message"], "Job already in queue");
    assert_eq!(second["jobId"], first["jobId"]);
}

#[tokio::test]
async fn process_then_stats_round_trip() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let doc = srv.document(&["first chunk", "second chunk", "third chunk"]);

    let created: serde_json::Value = create_job(&client, &srv, doc).await.json().await.unwrap();
    let job_id = created["jobId"].as_str().unwrap().to_string();

    let stats: serde_json::Value = client
        .get(srv.url("/jobs/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["total"], 1);

    let res = client
        .post(srv.url("/jobs/process"))
        .header("x-cron-secret", CRON_SECRET)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["processed"], 1);
    assert_eq!(report["failed"], 0);
    assert!(report["durationMs"].is_u64());

    let stats: serde_json::Value = client
        .get(srv.url("/jobs/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["complete"], 1);
    assert_eq!(stats["total"], 1);

    let job: serde_json::Value = client
        .get(srv.url(&format!("/jobs/{job_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(job["status"], "complete");
    assert!(job["completedAt"].is_string());

    let embedded = srv
        .documents
        .chunks(doc)
        .unwrap()
        .iter()
        .filter(|c| c.embedding.is_some())
        .count();
    assert_eq!(embedded, 3);
    assert_eq!(
        srv.documents.embedding_status(doc).await.unwrap().map(|s| s.as_str()),
        Some("complete")
    );
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url(&format!("/jobs/{}", docembed_core::JobId::new())))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn lock_state_reflects_processing_flag() {
    let srv = TestServer::spawn().await;
    let doc = srv.document(&["a"]);

    let body: serde_json::Value = reqwest::get(srv.url(&format!("/documents/{doc}/lock")))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["locked"], false);

    assert!(srv.documents.try_mark_processing(doc).await.unwrap());
    let body: serde_json::Value = reqwest::get(srv.url(&format!("/documents/{doc}/lock")))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["locked"], true);
    assert_eq!(body["documentId"], doc.to_string());
}
