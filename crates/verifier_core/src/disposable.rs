//! Disposable domain detection using Bloom filters
//!
//! Fast, memory-efficient membership test against the bundled list of
//! throwaway-mail domains. Purely in-memory; no I/O after construction.

use anyhow::Result;
use fastbloom::BloomFilter;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Bundled disposable-domain list, one domain per line.
const DISPOSABLE_LIST: &str = include_str!("../../../disposable_domains.txt");

/// Default false positive rate for the membership filter
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.0001;

/// Case-insensitive membership test for disposable mail domains
pub struct DisposableDomainSet {
    bloom_filter: BloomFilter,
    domain_count: usize,
}

impl DisposableDomainSet {
    /// Build a set from an iterator of domains.
    ///
    /// # Arguments
    /// * `domains` - Domains to add to the filter
    /// * `false_positive_rate` - Desired false positive rate (e.g., 0.0001)
    pub fn new<I>(domains: I, false_positive_rate: f64) -> Result<Self>
    where
        I: Iterator<Item = String>,
    {
        let domains: Vec<String> = domains.map(|d| d.to_lowercase()).collect();
        let domain_count = domains.len();

        if domain_count == 0 {
            return Err(anyhow::anyhow!("No domains provided for disposable detection"));
        }

        let bloom_filter = BloomFilter::with_false_pos(false_positive_rate).items(domains);

        info!(
            "Disposable domain set initialized with {} domains, {:.4}% false positive rate",
            domain_count,
            false_positive_rate * 100.0
        );

        Ok(Self {
            bloom_filter,
            domain_count,
        })
    }

    /// Build the set from the bundled list.
    pub fn bundled(false_positive_rate: f64) -> Result<Self> {
        let domains = parse_domain_list(DISPOSABLE_LIST)?;
        Self::new(domains.into_iter(), false_positive_rate)
    }

    /// Check whether a domain is on the disposable list.
    ///
    /// Returns `true` when the domain might be disposable (false positives
    /// are possible at the configured rate), `false` when it is definitely
    /// not listed.
    pub fn contains(&self, domain: &str) -> bool {
        let normalized = domain.trim().to_lowercase();
        let hit = self.bloom_filter.contains(&normalized);

        if hit {
            debug!("Domain '{}' flagged as disposable", domain);
        }

        hit
    }

    /// Number of domains behind the filter
    pub fn domain_count(&self) -> usize {
        self.domain_count
    }
}

/// Parse a domain list: one domain per line, `#` comments and blank lines
/// skipped, malformed entries dropped with a warning.
fn parse_domain_list(content: &str) -> Result<HashSet<String>> {
    let mut domains = HashSet::new();
    let mut invalid_count = 0usize;

    for (line_no, line) in content.lines().enumerate() {
        let domain = line.trim();

        if domain.is_empty() || domain.starts_with('#') {
            continue;
        }

        if is_plausible_domain(domain) {
            domains.insert(domain.to_lowercase());
        } else {
            invalid_count += 1;
            if invalid_count <= 10 {
                warn!("Invalid domain at line {}: '{}'", line_no + 1, domain);
            }
        }
    }

    if invalid_count > 10 {
        warn!("... and {} more invalid domain entries", invalid_count - 10);
    }

    if domains.is_empty() {
        return Err(anyhow::anyhow!("No valid domains found in list"));
    }

    Ok(domains)
}

fn is_plausible_domain(domain: &str) -> bool {
    if domain.len() > 253 || !domain.contains('.') {
        return false;
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
