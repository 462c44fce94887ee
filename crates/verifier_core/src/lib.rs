//! # verifier_core
//!
//! Email deliverability verification library. Given an address string it
//! answers one operational question: is there a deliverable mailbox behind
//! it, and if not, why not?
//!
//! ## Features
//!
//! - **Syntax validation** without any network traffic
//! - **Disposable domain detection** using a Bloom filter
//! - **DNS validation** (A/AAAA existence, MX enumeration) with retry,
//!   backoff and a TTL verdict cache via hickory-resolver
//! - **Live SMTP probing** with STARTTLS, catch-all detection and a
//!   per-server catch-all cache; no message is ever transmitted
//!
//! ## Example
//!
//! ```rust,no_run
//! use verifier_core::{VerificationPipeline, VerifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = VerificationPipeline::new(VerifierConfig::default())?;
//!
//!     let result = pipeline.verify("alice@example.com").await;
//!     println!("status: {:?}", result.email_status);
//!
//!     Ok(())
//! }
//! ```

pub mod disposable;
pub mod dns;
pub mod pipeline;
pub mod role;
pub mod smtp;
pub mod syntax;
pub mod webmail;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration for the verification pipeline and its probing engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Per-query resolver deadline in milliseconds
    pub dns_query_timeout_ms: u64,
    /// Application-level retries for the A/AAAA existence check
    pub dns_retries: u32,
    /// Exponential backoff factor between existence-check retries
    pub dns_retry_factor: u32,
    /// Initial backoff in milliseconds
    pub dns_retry_min_timeout_ms: u64,
    /// Backoff cap in milliseconds
    pub dns_retry_max_timeout_ms: u64,
    /// Deadline for a single SMTP command/reply exchange in milliseconds
    pub smtp_command_timeout_ms: u64,
    /// Deadline for a single TCP connect attempt in milliseconds
    pub smtp_connect_timeout_ms: u64,
    /// Submission ports attempted in order; 465 means implicit TLS
    pub smtp_ports: Vec<u16>,
    /// Hostname announced in EHLO/HELO
    pub helo_host: String,
    /// Envelope sender used for MAIL FROM
    pub envelope_sender: String,
    /// Local part used for the catch-all probe
    pub dummy_local_part: String,
    /// Enforce certificate validation on STARTTLS upgrades
    pub verify_tls_certs: bool,
    /// Path of the webmail classification artifact, relative to the
    /// process working directory
    pub webmail_domains_path: PathBuf,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            dns_query_timeout_ms: 5_000,
            dns_retries: 2,
            dns_retry_factor: 2,
            dns_retry_min_timeout_ms: 1_000,
            dns_retry_max_timeout_ms: 5_000,
            smtp_command_timeout_ms: 10_000,
            smtp_connect_timeout_ms: 10_000,
            smtp_ports: vec![25, 587, 465],
            helo_host: "getastromail.com".to_string(),
            envelope_sender: "relja@getastromail.com".to_string(),
            dummy_local_part: "gibberishasdfasdf".to_string(),
            verify_tls_certs: false,
            webmail_domains_path: PathBuf::from("webmail_domains.json"),
        }
    }
}

/// Final verdict on an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailStatus {
    Valid,
    Invalid,
    #[serde(rename = "Catch-All")]
    CatchAll,
}

/// Outcome of the syntactic check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntaxFormat {
    Valid,
    Invalid,
}

/// Coarse mailbox classification: a consumer mail service or an
/// organization's own mail system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxType {
    Professional,
    Webmail,
}

/// Whether a mail server accepted the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    Valid,
    Invalid,
}

/// The observable technical facts gathered while verifying an address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalDetails {
    pub disposable: bool,
    pub domain_exists: bool,
    pub has_mx_record: bool,
    pub smtp_valid: bool,
    pub catch_all: bool,
}

/// Complete verification result for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// The address as submitted
    pub email_address: String,
    /// Final verdict
    pub email_status: EmailStatus,
    /// Domain part as submitted, before punycode normalization
    pub domain: String,
    /// Outcome of the syntactic check
    pub email_syntax_format: SyntaxFormat,
    /// Webmail vs professional classification
    pub mailbox_type: MailboxType,
    /// Whether a mail server accepted the address
    pub mailbox_server_status: ServerStatus,
    /// Per-stage technical flags
    pub technical_details: TechnicalDetails,
}

impl VerificationResult {
    /// A result with every stage at its conservative default; the pipeline
    /// upgrades fields as stages complete.
    pub(crate) fn new(email_address: &str, domain: &str) -> Self {
        Self {
            email_address: email_address.to_string(),
            email_status: EmailStatus::Invalid,
            domain: domain.to_string(),
            email_syntax_format: SyntaxFormat::Invalid,
            mailbox_type: MailboxType::Professional,
            mailbox_server_status: ServerStatus::Invalid,
            technical_details: TechnicalDetails::default(),
        }
    }
}

/// Errors surfaced by pipeline construction and lower-level components.
///
/// `VerificationPipeline::verify` itself is infallible: stage failures are
/// folded into the result's technical flags instead of propagating.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
    #[error("DNS resolution failed: {0}")]
    DnsResolutionFailed(#[from] hickory_resolver::error::ResolveError),
    #[error("SMTP probe failed: {0}")]
    SmtpProbeFailed(String),
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VerifierError>;

// Re-export main types
pub use dns::{DnsProbe, MxHost};
pub use pipeline::VerificationPipeline;
pub use role::RoleBasedSet;
pub use smtp::{SmtpProbeOutcome, SmtpProber};
