//! Configuration for the verifier API
//!
//! Layered with figment: built-in defaults, then an optional `Config.toml`,
//! then environment variables under the `VERIFIER_` prefix (nesting with a
//! double underscore, e.g. `VERIFIER_SERVER__PORT=3001`,
//! `VERIFIER_VERIFY__DNS_RETRIES=3`).

use serde::{Deserialize, Serialize};
use verifier_core::VerifierConfig;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub verify: VerifierConfig,
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable JSON structured logging
    pub json_logs: bool,
    /// Log level filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            log_level: "info".to_string(),
        }
    }
}
