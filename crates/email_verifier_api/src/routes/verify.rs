//! Verification route handler

use super::ApiError;
use crate::AppState;
use axum::{extract::State, response::Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use verifier_core::VerificationResult;

/// Longest address we bother examining: 64 octets of local part, the `@`,
/// and 253 octets of domain.
const MAX_EMAIL_LEN: usize = 64 + 1 + 253;

/// Request body for POST /v1/verify
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Address to verify
    pub email: String,
}

/// POST /v1/verify
///
/// Runs the full verification pipeline: syntax, disposable list, DNS
/// existence, MX presence, webmail classification and, when everything
/// before it passes, the live SMTP probe.
#[instrument(skip(state, request), fields(request_id))]
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerificationResult>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", &request_id);

    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::InvalidInput("email cannot be empty".to_string()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::InvalidInput(format!(
            "email too long (max {MAX_EMAIL_LEN} characters)"
        )));
    }

    let result = state.pipeline.verify(email).await;

    info!(
        "Verification completed: domain={} status={:?} server={:?}",
        result.domain, result.email_status, result.mailbox_server_status
    );

    Ok(Json(result))
}
