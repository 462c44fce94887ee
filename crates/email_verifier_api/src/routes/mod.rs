//! API routes
//!
//! - `verify`: the verification endpoint
//! - `health`: health checks and monitoring endpoints

pub mod health;
pub mod verify;

use crate::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Build all API routes with the shared application state.
pub fn build_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/verify", post(verify::verify_handler))
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .route("/metrics", get(health::metrics_handler))
        .route("/admin/cache/clear", post(health::clear_cache_handler))
        .with_state(state)
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub request_id: String,
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_code, message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
        };

        let body = ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            request_id: Uuid::new_v4().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
