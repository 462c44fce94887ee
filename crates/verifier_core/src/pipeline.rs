//! Verification pipeline
//!
//! Composes the cheap checks and the SMTP engine in a fixed short-circuit
//! order: syntax, punycode normalization, disposable list, domain
//! existence, MX presence, mailbox classification, well-known shortcut and
//! finally the live probe. Each stage either terminates with its verdict or
//! advances; the expensive SMTP step runs last and only when everything
//! before it passed.

use crate::disposable::{DisposableDomainSet, DEFAULT_FALSE_POSITIVE_RATE};
use crate::dns::DnsProbe;
use crate::role::RoleBasedSet;
use crate::smtp::SmtpProber;
use crate::syntax;
use crate::webmail::WebmailClassifier;
use crate::{
    EmailStatus, MailboxType, Result, ServerStatus, SyntaxFormat, VerificationResult,
    VerifierConfig,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Consumer mail hosts whose deliverability is taken on faith; probing them
/// is wasted effort and a good way to get the prober's IP flagged.
const WELL_KNOWN_PROVIDERS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "protonmail.com",
    "proton.me",
    "zoho.com",
    "mail.com",
    "gmx.com",
    "yandex.com",
    "microsoft.com",
    "googlemail.com",
    "live.com",
];

/// Whether the ASCII domain equals or is a subdomain of a well-known
/// provider.
pub(crate) fn is_well_known(ascii_domain: &str) -> bool {
    WELL_KNOWN_PROVIDERS.iter().any(|provider| {
        ascii_domain == *provider || ascii_domain.ends_with(&format!(".{provider}"))
    })
}

/// The verification pipeline and the components it owns
pub struct VerificationPipeline {
    disposable: DisposableDomainSet,
    roles: RoleBasedSet,
    webmail: WebmailClassifier,
    dns: Arc<DnsProbe>,
    smtp: SmtpProber,
}

impl VerificationPipeline {
    pub fn new(config: VerifierConfig) -> Result<Self> {
        info!("Initializing verification pipeline");

        let disposable = DisposableDomainSet::bundled(DEFAULT_FALSE_POSITIVE_RATE)?;
        let roles = RoleBasedSet::new();
        let webmail = WebmailClassifier::new(&config.webmail_domains_path);
        let dns = Arc::new(DnsProbe::new(&config));
        let smtp = SmtpProber::new(&config, dns.clone());

        info!(
            "Verification pipeline initialized with {} disposable domains",
            disposable.domain_count()
        );

        Ok(Self {
            disposable,
            roles,
            webmail,
            dns,
            smtp,
        })
    }

    /// Verify a single address. Infallible by design: stages that cannot
    /// complete leave their flags at the conservative default and the
    /// verdict stays `Invalid`.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn verify(&self, email: &str) -> VerificationResult {
        let Some(parsed) = syntax::parse_address(email) else {
            debug!("address failed the syntax check");
            let domain = email.split_once('@').map(|(_, d)| d).unwrap_or("");
            return VerificationResult::new(email, domain);
        };

        let mut result = VerificationResult::new(email, parsed.domain);
        result.email_syntax_format = SyntaxFormat::Valid;

        // IDN-normalize exactly once; every downstream component sees only
        // the ASCII form.
        let ascii_domain = match idna::domain_to_ascii(parsed.domain) {
            Ok(ascii) => ascii,
            Err(e) => {
                warn!("punycode normalization failed for {}: {}", parsed.domain, e);
                return result;
            }
        };

        if self.roles.contains(parsed.local) {
            debug!("{} is a role-style local part", parsed.local);
        }

        if self.disposable.contains(&ascii_domain) {
            debug!("{} is a disposable domain", ascii_domain);
            result.technical_details.disposable = true;
            result.mailbox_type = MailboxType::Webmail;
            return result;
        }

        if !self.dns.check_domain_exists(&ascii_domain).await {
            debug!("{} does not resolve", ascii_domain);
            return result;
        }
        result.technical_details.domain_exists = true;

        if !self.dns.has_mx_record(&ascii_domain).await {
            debug!("{} is not mail-reachable", ascii_domain);
            return result;
        }
        result.technical_details.has_mx_record = true;

        result.mailbox_type = if self.webmail.is_webmail(&ascii_domain) {
            MailboxType::Webmail
        } else {
            MailboxType::Professional
        };

        if is_well_known(&ascii_domain) {
            debug!("{} is well-known; skipping the SMTP probe", ascii_domain);
            result.technical_details.smtp_valid = true;
            result.mailbox_server_status = ServerStatus::Valid;
            result.email_status = EmailStatus::Valid;
            return result;
        }

        let outcome = self.smtp.probe(&ascii_domain, parsed.local).await;
        result.technical_details.smtp_valid = outcome.smtp_valid;
        result.technical_details.catch_all = outcome.catch_all;
        result.mailbox_server_status = if outcome.smtp_valid {
            ServerStatus::Valid
        } else {
            ServerStatus::Invalid
        };
        result.email_status = if outcome.catch_all {
            EmailStatus::CatchAll
        } else if outcome.smtp_valid {
            EmailStatus::Valid
        } else {
            EmailStatus::Invalid
        };

        result
    }

    /// Statistics for monitoring surfaces
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            disposable_domains_count: self.disposable.domain_count(),
            webmail_domains_count: self.webmail.domain_count(),
            dns_cache_entries: self.dns.cache_len(),
            catch_all_cache_entries: self.smtp.catch_all_cache_len(),
        }
    }

    /// Drop both verdict caches.
    pub fn clear_caches(&self) {
        self.dns.clear_cache();
        self.smtp.clear_cache();
    }
}

/// Point-in-time counters about the pipeline
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStats {
    pub disposable_domains_count: usize,
    pub webmail_domains_count: usize,
    pub dns_cache_entries: usize,
    pub catch_all_cache_entries: usize,
}
