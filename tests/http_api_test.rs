//! Integration tests for the JSON API.
//!
//! Each test serves the router on an ephemeral port and talks to it with a
//! real HTTP client.

use async_trait::async_trait;
use serde_json::{Value, json};
use sql_explorer::auth::AuthConfig;
use sql_explorer::embedding::HashingEmbedder;
use sql_explorer::error::ExplorerResult;
use sql_explorer::llm::LanguageModel;
use sql_explorer::transport::HttpTransport;
use sql_explorer::{Session, Settings};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

struct FixedModel(&'static str);

#[async_trait]
impl LanguageModel for FixedModel {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _prompt: &str) -> ExplorerResult<String> {
        Ok(self.0.to_string())
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    dir: TempDir,
}

impl TestServer {
    async fn start(reply: &'static str, auth: AuthConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.index.dir = dir.path().join("index");
        let session = Session::new(
            Arc::new(settings),
            Arc::new(HashingEmbedder::new(256)),
            Arc::new(FixedModel(reply)),
        );

        let transport = HttpTransport::new(Arc::new(Mutex::new(session)), auth, "127.0.0.1", 0);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = transport.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            dir,
        }
    }

    fn db_url(&self, name: &str) -> String {
        format!("sqlite:{}?mode=rwc", self.dir.path().join(name).display())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    /// Create a `students` table with two rows, then reconnect so it is indexed.
    async fn connect_with_students(&self) -> Value {
        let target = json!({ "target": self.db_url("school.db") });
        let (status, body) = self.post("/connect", target.clone()).await;
        assert_eq!(status, 200);
        assert_eq!(body["index"]["status"], "empty");
        for sql in [
            "CREATE TABLE students (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            "INSERT INTO students (name) VALUES ('Ada'), ('Alan')",
        ] {
            let (status, body) = self.post("/execute", json!({ "sql": sql })).await;
            assert_eq!(status, 200, "{}", body);
        }

        let (status, body) = self.post("/connect", target).await;
        assert_eq!(status, 200);
        body
    }
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_health_and_connect() {
    let server = TestServer::start("SELECT 1", AuthConfig::disabled()).await;

    let health: Value = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["connected"], false);

    let body = server.connect_with_students().await;
    assert_eq!(body["database_id"], "school");
    assert_eq!(body["db_type"], "sqlite");
    assert_eq!(body["tables"], 1);
    assert_eq!(body["index"]["status"], "rebuilt");
    assert_eq!(body["index"]["fragments"], 1);

    let (status, body) = server.post("/connect", json!({ "target": server.db_url("school.db") })).await;
    assert_eq!(status, 200);
    assert_eq!(body["index"]["status"], "reused");

    let schema: Value = server
        .client
        .get(format!("{}/schema", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(schema["tables"][0]["table_name"], "students");

    let (status, body) = server.post("/disconnect", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["disconnected"], true);
}

#[tokio::test]
async fn test_ask_before_connect_is_conflict() {
    let server = TestServer::start("SELECT 1", AuthConfig::disabled()).await;

    let (status, body) = server.post("/ask", json!({ "question": "how many?" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["kind"], "not_connected");
    assert!(body["error"]["suggestion"].is_string());
}

#[tokio::test]
async fn test_blank_question_is_bad_request() {
    let server = TestServer::start("SELECT 1", AuthConfig::disabled()).await;
    server.connect_with_students().await;

    let (status, body) = server.post("/ask", json!({ "question": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["kind"], "invalid_input");
}

// =========================================================================
// Ask and execute
// =========================================================================

#[tokio::test]
async fn test_ask_and_execute_safe_query() {
    let server = TestServer::start("SELECT name FROM students ORDER BY id", AuthConfig::disabled()).await;
    server.connect_with_students().await;

    let (status, body) = server
        .post("/ask", json!({ "question": "list students", "execute": true }))
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["query"]["sql"], "SELECT name FROM students ORDER BY id");
    assert_eq!(body["decision"]["verdict"]["status"], "safe");
    assert_eq!(body["retrieved"][0]["fragment"]["table_name"], "students");
    assert_eq!(body["result"]["row_count"], 2);
    assert_eq!(body["result"]["rows"][0]["name"], "Ada");
}

#[tokio::test]
async fn test_ask_does_not_execute_blocked_query() {
    let server = TestServer::start("DELETE FROM students", AuthConfig::disabled()).await;
    server.connect_with_students().await;

    let (status, body) = server
        .post("/ask", json!({ "question": "remove students", "execute": true }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["decision"]["verdict"]["status"], "blocked");
    assert!(body.get("result").is_none());

    let (_, count) = server
        .post("/execute", json!({ "sql": "SELECT COUNT(*) AS n FROM students" }))
        .await;
    assert_eq!(count["result"]["rows"][0]["n"], 2);
}

#[tokio::test]
async fn test_execute_unsafe_requires_confirm() {
    let server = TestServer::start("SELECT 1", AuthConfig::disabled()).await;
    server.connect_with_students().await;

    let (status, body) = server.post("/execute", json!({ "sql": "DELETE FROM students" })).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["kind"], "query_blocked");
    assert!(
        body["error"]["findings"][0]
            .as_str()
            .unwrap()
            .contains("DELETE without WHERE")
    );

    let (status, body) = server
        .post("/execute", json!({ "sql": "DELETE FROM students", "confirm": true }))
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["decision"]["verdict"]["status"], "confirmed");
    assert_eq!(body["result"]["rows_affected"], 2);
}

#[tokio::test]
async fn test_execution_error_is_unprocessable() {
    let server = TestServer::start("SELECT 1", AuthConfig::disabled()).await;
    server.connect_with_students().await;

    let (status, body) = server.post("/execute", json!({ "sql": "SELECT * FROM ordrs" })).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["kind"], "execution");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no such table: ordrs")
    );
}

// =========================================================================
// Authentication
// =========================================================================

#[tokio::test]
async fn test_auth_required_except_health() {
    let auth = AuthConfig::from_tokens(&["s3cret-token".to_string()]).unwrap();
    let server = TestServer::start("SELECT 1", auth).await;

    let health = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let (status, body) = server.post("/ask", json!({ "question": "hi" })).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["kind"], "unauthorized");

    let response = server
        .client
        .post(format!("{}/ask", server.base))
        .bearer_auth("wrong")
        .json(&json!({ "question": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Valid token gets through to the handler
    let response = server
        .client
        .post(format!("{}/ask", server.base))
        .bearer_auth("s3cret-token")
        .json(&json!({ "question": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}
