//! DNS probing: domain existence, MX reachability, MX enumeration
//!
//! Built on hickory-resolver with Cloudflare upstreams. Application-level
//! retry and backoff sit on top of a single transport-level attempt, and the
//! derived MX-reachability verdict is cached with a short TTL.

use crate::VerifierConfig;
use dashmap::DashMap;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::{AsyncResolver, TokioAsyncResolver};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Positive MX-reachability verdicts live this long
const MX_CACHE_POSITIVE_TTL: Duration = Duration::from_secs(5 * 60);

/// Negative verdicts expire sooner so a freshly-configured domain is
/// noticed quickly
const MX_CACHE_NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// Retries for the MX reachability query, on top of the first attempt
const MX_RETRIES: u32 = 2;

/// A mail exchanger for a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MxHost {
    pub exchange: String,
    pub priority: u16,
}

struct MxCacheEntry {
    has_mail_reachable_record: bool,
    expires_at: Instant,
}

enum LookupOutcome {
    /// Non-empty answer
    Found,
    /// NXDOMAIN or empty data: decisive, not retried
    Negative,
    /// Transport-level trouble worth retrying
    Transient(ResolveError),
}

/// DNS prober with retry, backoff and a verdict cache
pub struct DnsProbe {
    resolver: TokioAsyncResolver,
    mx_cache: DashMap<String, MxCacheEntry>,
    retries: u32,
    retry_factor: u32,
    retry_min: Duration,
    retry_max: Duration,
}

impl DnsProbe {
    pub fn new(config: &VerifierConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_millis(config.dns_query_timeout_ms);
        // One transport-level try; retries are handled at this layer.
        opts.attempts = 1;

        let resolver = AsyncResolver::tokio(ResolverConfig::cloudflare(), opts);

        debug!(
            "DNS probe initialized - timeout: {}ms, retries: {}",
            config.dns_query_timeout_ms, config.dns_retries
        );

        Self {
            resolver,
            mx_cache: DashMap::new(),
            retries: config.dns_retries,
            retry_factor: config.dns_retry_factor.max(1),
            retry_min: Duration::from_millis(config.dns_retry_min_timeout_ms),
            retry_max: Duration::from_millis(config.dns_retry_max_timeout_ms),
        }
    }

    /// Check whether a domain resolves at all: A first, then AAAA.
    ///
    /// NXDOMAIN and empty answers are decisive negatives and are not
    /// retried; transport errors are retried with exponential backoff and
    /// conservatively yield `false` once attempts are exhausted.
    pub async fn check_domain_exists(&self, domain: &str) -> bool {
        for attempt in 0..=self.retries {
            match self.existence_lookup(domain).await {
                LookupOutcome::Found => return true,
                LookupOutcome::Negative => {
                    debug!("Domain {} has no A or AAAA records", domain);
                    return false;
                }
                LookupOutcome::Transient(e) => {
                    if attempt < self.retries {
                        let backoff = self.exponential_backoff(attempt);
                        debug!(
                            "Existence lookup for {} failed ({}), retrying in {:?}",
                            domain, e, backoff
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        warn!("Existence lookup for {} exhausted retries: {}", domain, e);
                    }
                }
            }
        }
        false
    }

    /// Check whether mail can be routed to the domain: MX, falling back to
    /// A then AAAA when no MX exists. Verdicts are cached (5 min positive,
    /// 1 min negative).
    pub async fn has_mx_record(&self, domain: &str) -> bool {
        let key = domain.to_lowercase();

        if let Some(entry) = self.mx_cache.get(&key) {
            if entry.expires_at > Instant::now() {
                debug!(
                    "MX verdict cache hit for {}: {}",
                    domain, entry.has_mail_reachable_record
                );
                return entry.has_mail_reachable_record;
            }
            drop(entry);
            self.mx_cache.remove(&key);
        }

        let verdict = self.mx_reachability(domain).await;

        let ttl = if verdict {
            MX_CACHE_POSITIVE_TTL
        } else {
            MX_CACHE_NEGATIVE_TTL
        };
        self.mx_cache.insert(
            key,
            MxCacheEntry {
                has_mail_reachable_record: verdict,
                expires_at: Instant::now() + ttl,
            },
        );

        verdict
    }

    /// Enumerate the domain's mail exchangers, priority ascending. Ties
    /// keep the resolver's enumeration order.
    pub async fn resolve_mx(&self, domain: &str) -> Vec<MxHost> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let mut hosts: Vec<MxHost> = lookup
                    .iter()
                    .map(|mx| MxHost {
                        exchange: mx
                            .exchange()
                            .to_ascii()
                            .trim_end_matches('.')
                            .to_string(),
                        priority: mx.preference(),
                    })
                    .collect();
                hosts.sort_by_key(|host| host.priority);
                debug!("Domain {} has {} MX host(s)", domain, hosts.len());
                hosts
            }
            Err(e) => {
                debug!("MX enumeration failed for {}: {}", domain, e);
                Vec::new()
            }
        }
    }

    /// Drop all cached MX verdicts.
    pub fn clear_cache(&self) {
        self.mx_cache.clear();
    }

    /// Number of live entries in the verdict cache
    pub fn cache_len(&self) -> usize {
        self.mx_cache.len()
    }

    async fn mx_reachability(&self, domain: &str) -> bool {
        for attempt in 1..=MX_RETRIES + 1 {
            match self.resolver.mx_lookup(domain).await {
                Ok(lookup) => {
                    if lookup.iter().next().is_some() {
                        debug!("Domain {} has MX records", domain);
                        return true;
                    }
                    // Empty MX answer: a host record still makes the
                    // domain mail-reachable.
                    return matches!(self.existence_lookup(domain).await, LookupOutcome::Found);
                }
                Err(e) => match e.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        return matches!(self.existence_lookup(domain).await, LookupOutcome::Found);
                    }
                    _ => {
                        if attempt <= MX_RETRIES {
                            let backoff = self.retry_min * attempt;
                            debug!(
                                "MX lookup for {} failed ({}), retrying in {:?}",
                                domain, e, backoff
                            );
                            tokio::time::sleep(backoff).await;
                        } else {
                            warn!("MX lookup for {} exhausted retries: {}", domain, e);
                        }
                    }
                },
            }
        }
        false
    }

    async fn existence_lookup(&self, domain: &str) -> LookupOutcome {
        match self.resolver.ipv4_lookup(domain).await {
            Ok(lookup) if lookup.iter().next().is_some() => return LookupOutcome::Found,
            Ok(_) => {}
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {}
                _ => return LookupOutcome::Transient(e),
            },
        }

        match self.resolver.ipv6_lookup(domain).await {
            Ok(lookup) if lookup.iter().next().is_some() => LookupOutcome::Found,
            Ok(_) => LookupOutcome::Negative,
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => LookupOutcome::Negative,
                _ => LookupOutcome::Transient(e),
            },
        }
    }

    fn exponential_backoff(&self, attempt: u32) -> Duration {
        let factor = self.retry_factor.saturating_pow(attempt);
        (self.retry_min * factor).min(self.retry_max)
    }
}
