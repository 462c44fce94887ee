//! Role-style local part detection
//!
//! Addresses like `postmaster@` or `billing@` belong to a function rather
//! than a person. Membership is case-insensitive against a curated list.

use std::collections::HashSet;
use tracing::debug;

/// Local parts conventionally owned by a role or team
const ROLE_LOCAL_PARTS: &[&str] = &[
    "abuse",
    "accounting",
    "admin",
    "administrator",
    "billing",
    "careers",
    "contact",
    "customerservice",
    "dev",
    "devops",
    "enquiries",
    "feedback",
    "finance",
    "ftp",
    "help",
    "helpdesk",
    "hostmaster",
    "hr",
    "info",
    "inquiries",
    "it",
    "jobs",
    "legal",
    "mail",
    "mailer-daemon",
    "marketing",
    "media",
    "newsletter",
    "no-reply",
    "noc",
    "noreply",
    "office",
    "ops",
    "orders",
    "postmaster",
    "press",
    "privacy",
    "root",
    "sales",
    "security",
    "service",
    "spam",
    "staff",
    "subscribe",
    "support",
    "team",
    "unsubscribe",
    "webmaster",
];

/// Membership test for role-style local parts
pub struct RoleBasedSet {
    locals: HashSet<&'static str>,
}

impl RoleBasedSet {
    pub fn new() -> Self {
        let locals: HashSet<&'static str> = ROLE_LOCAL_PARTS.iter().copied().collect();
        debug!("Role-based set initialized with {} local parts", locals.len());
        Self { locals }
    }

    /// Check whether a local part is role-style. Case-insensitive.
    pub fn contains(&self, local: &str) -> bool {
        self.locals.contains(local.trim().to_lowercase().as_str())
    }
}

impl Default for RoleBasedSet {
    fn default() -> Self {
        Self::new()
    }
}
