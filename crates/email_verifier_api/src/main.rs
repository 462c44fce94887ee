//! Email Deliverability Verification API Server
//!
//! Thin axum surface over `verifier_core`: accepts an address, returns the
//! structured verification verdict.

use axum::Router;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use verifier_core::VerificationPipeline;

mod config;
mod routes;

use config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    init_tracing(&config)?;

    info!("Starting email verifier API v{}", env!("CARGO_PKG_VERSION"));

    let pipeline = VerificationPipeline::new(config.verify.clone())
        .map_err(|e| format!("Failed to initialize verification pipeline: {e}"))?;

    let stats = pipeline.stats();
    info!(
        "Pipeline initialized - {} disposable domains known",
        stats.disposable_domains_count
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Verification endpoint: POST http://{}/v1/verify", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    routes::build_routes(Arc::new(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(tower_http::cors::Any),
        )
        .layer(CompressionLayer::new())
}

/// Load configuration: defaults, then an optional Config.toml, then
/// `VERIFIER_`-prefixed environment variables.
fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if std::path::Path::new("Config.toml").exists() {
        figment = figment.merge(Toml::file("Config.toml"));
    }

    figment = figment.merge(Env::prefixed("VERIFIER_").split("__"));

    let config: AppConfig = figment.extract()?;

    Ok(config)
}

/// Initialize tracing and logging
fn init_tracing(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.observability.log_level.clone().into());

    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    Ok(())
}

/// Resolves once the process is asked to stop. Axum then refuses new
/// connections and drains whatever verifications are still in flight;
/// open SMTP sessions finish their QUIT on the way out.
async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("failed to listen for the interrupt signal");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install the SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("interrupt received; draining in-flight verifications"),
        _ = terminate => info!("SIGTERM received; draining in-flight verifications"),
    }
}
