//! Syntactic validation of address strings
//!
//! A pure check with no DNS involvement: exactly one `@` separating a
//! non-empty local part from a dotted domain, no whitespace, and the usual
//! length bounds.

/// Maximum length of the local part in octets
pub const MAX_LOCAL_LEN: usize = 64;

/// Maximum length of the domain in octets
pub const MAX_DOMAIN_LEN: usize = 253;

/// An address split into its local and domain parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAddress<'a> {
    pub local: &'a str,
    pub domain: &'a str,
}

/// Split and validate an address string.
///
/// Returns `None` when the string is not a syntactically plausible address;
/// no reason is surfaced, mirroring the Valid/Invalid contract of the
/// pipeline's first stage.
pub fn parse_address(input: &str) -> Option<ParsedAddress<'_>> {
    if input.chars().any(char::is_whitespace) {
        return None;
    }

    let mut parts = input.split('@');
    let local = parts.next()?;
    let domain = parts.next()?;
    if parts.next().is_some() {
        // more than one '@'
        return None;
    }

    if local.is_empty() || local.len() > MAX_LOCAL_LEN {
        return None;
    }
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return None;
    }
    if !domain.contains('.') {
        return None;
    }

    Some(ParsedAddress { local, domain })
}
