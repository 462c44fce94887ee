//! Health check and monitoring routes

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use verifier_core::pipeline::PipelineStats;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health
///
/// Liveness check; returns 200 OK with service information.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
}

/// GET /ready
///
/// Runs the pipeline on a deliberately malformed input, which exercises the
/// code path end to end without any network traffic.
pub async fn ready_handler(State(state): State<Arc<AppState>>) -> Json<ReadinessResponse> {
    let result = state.pipeline.verify("readiness-self-check").await;
    let ready = result.email_syntax_format == verifier_core::SyntaxFormat::Invalid;

    Json(ReadinessResponse { ready })
}

/// GET /metrics
///
/// Prometheus-compatible metrics in text exposition format.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> (StatusCode, String) {
    let stats = state.pipeline.stats();

    let metrics = format!(
        "# HELP verifier_disposable_domains_total Domains behind the disposable filter\n\
         # TYPE verifier_disposable_domains_total gauge\n\
         verifier_disposable_domains_total {}\n\
         \n\
         # HELP verifier_webmail_domains_total Domains in the webmail classifier\n\
         # TYPE verifier_webmail_domains_total gauge\n\
         verifier_webmail_domains_total {}\n\
         \n\
         # HELP verifier_dns_cache_entries Live entries in the MX verdict cache\n\
         # TYPE verifier_dns_cache_entries gauge\n\
         verifier_dns_cache_entries {}\n\
         \n\
         # HELP verifier_catch_all_cache_entries Live entries in the catch-all cache\n\
         # TYPE verifier_catch_all_cache_entries gauge\n\
         verifier_catch_all_cache_entries {}\n\
         \n\
         # HELP verifier_build_info Build information\n\
         # TYPE verifier_build_info gauge\n\
         verifier_build_info{{version=\"{}\"}} 1\n",
        stats.disposable_domains_count,
        stats.webmail_domains_count,
        stats.dns_cache_entries,
        stats.catch_all_cache_entries,
        env!("CARGO_PKG_VERSION")
    );

    (StatusCode::OK, metrics)
}

/// Statistics wrapper for admin responses
#[derive(Serialize)]
pub struct CacheResponse {
    pub message: String,
    pub stats: PipelineStats,
}

/// POST /admin/cache/clear
///
/// Drops the DNS and catch-all verdict caches.
pub async fn clear_cache_handler(State(state): State<Arc<AppState>>) -> Json<CacheResponse> {
    state.pipeline.clear_caches();

    info!("Verdict caches cleared by admin request");

    Json(CacheResponse {
        message: "caches cleared".to_string(),
        stats: state.pipeline.stats(),
    })
}
