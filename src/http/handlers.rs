//! Axum HTTP handlers for the web server
//!
//! Provides the primary Model Context Protocol endpoint, and general metadata endpoints.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{errors::AppError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
    })
}

/// Logs when the exchange ends, whether it completed, failed or the client
/// went away and the handler future was dropped.
struct CloseGuard {
    session_id: Uuid,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        debug!(session_id = %self.session_id, "request closed");
    }
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    let body = body.map_err(|err| AppError::internal("body_read", err.body_text()))?;
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| AppError::internal("malformed_body", err.to_string()))?;

    let session = state.dispatcher.open_session();
    let _guard = CloseGuard {
        session_id: session.id(),
    };

    let reply = tokio::spawn(session.handle_payload(payload))
        .await
        .map_err(|err| AppError::internal("session_aborted", err.to_string()))?;

    Ok(match reply {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    })
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
