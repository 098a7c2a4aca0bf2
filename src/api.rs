//! HTTP API endpoints.
//!
//! Read-only views for health checks and displays that poll instead of
//! holding a socket.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.session_count().await,
    })
}

/// Current public snapshot of one session.
///
/// GET /api/sessions/{code}
pub async fn session_snapshot(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.session(&code).await {
        Ok(shared) => {
            let session = shared.lock().await;
            Json(session.snapshot()).into_response()
        }
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(ServerMessage::from_error(&e, false)),
        )
            .into_response(),
    }
}

/// All routes without middleware; `main` adds tracing and CORS
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(health))
        .route("/api/sessions/{code}", get(session_snapshot))
        .with_state(state)
}
