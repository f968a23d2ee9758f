//! HTTP request handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::Uri,
};
use serde::Serialize;
use termrelay_protocol::{EvalRequest, EvalResponse};
use tracing::{info, instrument};

use crate::eval;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Run a program to completion with the supplied stdin.
///
/// POST /run-code
#[instrument(skip_all)]
pub async fn run_code(
    State(state): State<AppState>,
    payload: Result<Json<EvalRequest>, JsonRejection>,
) -> ApiResult<Json<EvalResponse>> {
    let Json(request) = payload?;
    info!(
        code_bytes = request.code.len(),
        stdin_bytes = request.stdin.len(),
        "evaluation requested"
    );

    // Detached so a dropped request still waits out the child and its workspace.
    let sessions = state.sessions.clone();
    let response = tokio::spawn(async move { eval::evaluate(&sessions, &request).await })
        .await
        .map_err(|e| ApiError::internal(format!("evaluation task failed: {e}")))?;

    Ok(Json(response))
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path().to_string())
}
