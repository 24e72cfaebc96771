//! JSON API over HTTP.
//!
//! | Route | Body | Response |
//! |---|---|---|
//! | `GET /health` | | connection status |
//! | `POST /connect` | `{"target": "sqlite:data/school.db"}` | `ConnectReport` |
//! | `POST /disconnect` | | `{"disconnected": true}` |
//! | `GET /schema` | | fragments of the connected database |
//! | `POST /ask` | `{"question": "...", "execute": false}` | proposal, plus the result when executed |
//! | `POST /execute` | `{"sql": "...", "confirm": false}` | gate decision and result |
//!
//! `/execute` screens the SQL again; an unsafe statement without
//! `"confirm": true` is answered with 409 and the gate's findings.

use super::{SharedSession, Transport, wait_for_signal};
use crate::auth::{AuthConfig, auth_middleware};
use crate::error::{ExplorerError, ExplorerResult};
use crate::models::{ExecutionResult, SchemaFragment};
use crate::pipeline::{ConnectReport, Proposal};
use crate::safety::GateDecision;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Error body: `{"error": {"kind", "message", "suggestion"}}`.
pub struct ApiError(pub ExplorerError);

impl From<ExplorerError> for ApiError {
    fn from(err: ExplorerError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &ExplorerError) -> StatusCode {
    match err {
        ExplorerError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        ExplorerError::QueryBlocked { .. } | ExplorerError::NotConnected => StatusCode::CONFLICT,
        ExplorerError::EmptySchema { .. } | ExplorerError::Execution { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ExplorerError::Generation { .. } | ExplorerError::Embedding { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ExplorerError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ExplorerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ExplorerError::Index { .. }
        | ExplorerError::Config { .. }
        | ExplorerError::FileIo { .. }
        | ExplorerError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let mut body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
                "suggestion": self.0.suggestion(),
            }
        });
        if let ExplorerError::QueryBlocked { reasons } = &self.0 {
            body["error"]["findings"] = json!(reasons);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Connection URL or settings section name
    pub target: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Run the statement when the gate finds it safe
    #[serde(default)]
    pub execute: bool,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    #[serde(flatten)]
    pub proposal: Proposal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
    /// Explicit override for statements the gate blocks
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub decision: GateDecision,
    pub result: ExecutionResult,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub database_id: String,
    pub tables: Vec<SchemaFragment>,
}

async fn health(State(session): State<SharedSession>) -> Json<serde_json::Value> {
    let session = session.lock().await;
    Json(json!({
        "status": "ok",
        "connected": session.is_connected(),
        "database_id": session.database_id(),
        "db_type": session.db_type(),
    }))
}

async fn connect(
    State(session): State<SharedSession>,
    Json(req): Json<ConnectRequest>,
) -> ApiResult<ConnectReport> {
    let mut session = session.lock().await;
    let target = session.settings().resolve_target(&req.target)?;
    Ok(Json(session.connect(target).await?))
}

async fn disconnect(State(session): State<SharedSession>) -> Json<serde_json::Value> {
    session.lock().await.disconnect().await;
    Json(json!({ "disconnected": true }))
}

async fn schema(State(session): State<SharedSession>) -> ApiResult<SchemaResponse> {
    let session = session.lock().await;
    let database_id = session
        .database_id()
        .ok_or(ExplorerError::NotConnected)?
        .to_string();
    Ok(Json(SchemaResponse {
        database_id,
        tables: session.fragments().to_vec(),
    }))
}

async fn ask(
    State(session): State<SharedSession>,
    Json(req): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    let session = session.lock().await;
    let proposal = session.ask(&req.question).await?;

    let result = if req.execute && !proposal.decision.verdict().is_blocked() {
        let approved = proposal.decision.approve()?;
        Some(session.execute(&approved).await?)
    } else {
        None
    };
    Ok(Json(AskResponse { proposal, result }))
}

async fn execute(
    State(session): State<SharedSession>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<ExecuteResponse> {
    let session = session.lock().await;
    let mut decision = session.screen(&req.sql)?;
    if req.confirm {
        decision = decision.confirm();
    }
    let approved = decision.approve()?;
    let result = session.execute(&approved).await?;
    Ok(Json(ExecuteResponse { decision, result }))
}

pub struct HttpTransport {
    session: SharedSession,
    auth: Arc<AuthConfig>,
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(session: SharedSession, auth: AuthConfig, host: impl Into<String>, port: u16) -> Self {
        Self {
            session,
            auth: Arc::new(auth),
            host: host.into(),
            port,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Routes with authentication applied to everything but `/health`.
    pub fn router(&self) -> Router {
        let mut api = Router::new()
            .route("/connect", post(connect))
            .route("/disconnect", post(disconnect))
            .route("/schema", get(schema))
            .route("/ask", post(ask))
            .route("/execute", post(execute));
        if self.auth.is_enabled() {
            api = api.route_layer(middleware::from_fn_with_state(
                self.auth.clone(),
                auth_middleware,
            ));
        }

        Router::new()
            .route("/health", get(health))
            .merge(api)
            .with_state(self.session.clone())
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> ExplorerResult<()> {
        let bind_addr = self.bind_addr();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ExplorerError::config(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        info!(
            addr = %bind_addr,
            auth = self.auth.is_enabled(),
            tokens = self.auth.token_count(),
            "HTTP API listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for_signal())
            .await
            .map_err(|e| ExplorerError::internal(format!("HTTP server error: {}", e)))?;

        self.session.lock().await.disconnect().await;
        info!("HTTP API stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
