//! HTTP surface: REST endpoints and MCP over HTTP.
//!
//! | Method | Path                | Description                              |
//! |--------|---------------------|------------------------------------------|
//! | GET    | `/health`           | Liveness probe                           |
//! | POST   | `/mcp`              | One JSON-RPC request per POST            |
//! | POST   | `/api/authenticate` | `{host?}`: log in to a host              |
//! | GET    | `/api/library`      | `?host=`: fetch the library              |
//! | POST   | `/api/query`        | `{host?, query}`: answer a question      |
//! | POST   | `/api/logout`       | `{host?}`: forget a host's session       |
//!
//! Errors are `{"error", "code"}` bodies with the status of the underlying
//! failure: 401 for authentication, 502/504 for an unreachable or slow
//! host, 404 for an unknown host.

use crate::server::McpServer;
use crate::service::{LibraryService, ServiceError};
use crate::transport::handle_message;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Library access.
    pub service: Arc<LibraryService>,
    /// MCP dispatcher for `/mcp`.
    pub mcp: Arc<McpServer>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// Create state starting the uptime clock now.
    pub fn new(service: Arc<LibraryService>, mcp: Arc<McpServer>) -> Self {
        Self {
            service,
            mcp,
            start_time: Instant::now(),
        }
    }
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

/// Request body naming an optional host.
#[derive(Debug, Default, Deserialize)]
pub struct HostRequest {
    /// Target host; the default host when omitted.
    #[serde(default)]
    pub host: Option<String>,
}

/// Request body for `POST /api/query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Free-text question.
    pub query: String,
    /// Target host; the default host when omitted.
    #[serde(default)]
    pub host: Option<String>,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp", post(mcp))
        .route("/api/authenticate", post(authenticate))
        .route("/api/library", get(library))
        .route("/api/query", post(query))
        .route("/api/logout", post(logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for Ctrl-C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn error_response(e: &ServiceError) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!(status = status.as_u16(), error = %e, "Request failed");
    }
    (
        status,
        Json(json!({
            "error": e.user_message(),
            "code": e.error_code()
        })),
    )
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.service.authenticator().cache().hosts().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "default_host": state.service.default_host(),
        "sessions": sessions
    }))
}

/// `POST /mcp`
async fn mcp(State(state): State<AppState>, body: String) -> Response {
    match handle_message(&state.mcp, body.trim()).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// `POST /api/authenticate`
async fn authenticate(State(state): State<AppState>, Json(req): Json<HostRequest>) -> ApiResult {
    let session = state
        .service
        .authenticate_host(req.host.as_deref())
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({
        "host": session.host,
        "authenticated": true,
        "session": session.fingerprint(),
        "acquired_at": session.acquired_at.to_rfc3339()
    })))
}

/// `GET /api/library?host=`
async fn library(State(state): State<AppState>, Query(req): Query<HostRequest>) -> ApiResult {
    let host = state
        .service
        .resolve_host(req.host.as_deref())
        .map_err(|e| error_response(&e))?;
    let payload = state
        .service
        .get_library_data(Some(&host))
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({
        "host": host,
        "cards": payload.cards,
        "playlists": payload.playlists
    })))
}

/// `POST /api/query`
async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> ApiResult {
    let host = state
        .service
        .resolve_host(req.host.as_deref())
        .map_err(|e| error_response(&e))?;
    let answer = state
        .service
        .query_library(Some(&host), &req.query)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({
        "host": host,
        "query": req.query,
        "answer": answer
    })))
}

/// `POST /api/logout`
async fn logout(State(state): State<AppState>, Json(req): Json<HostRequest>) -> ApiResult {
    let host = state
        .service
        .resolve_host(req.host.as_deref())
        .map_err(|e| error_response(&e))?;
    let had_session = state
        .service
        .logout(Some(&host))
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(json!({
        "host": host,
        "logged_out": had_session
    })))
}
