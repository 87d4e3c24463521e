//! Input validation and the immutable per-request probe target.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// One DNS label: letters, digits and inner hyphens, 1-63 characters.
#[allow(clippy::unwrap_used)]
static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

/// Top-level label: at least two letters.
#[allow(clippy::unwrap_used)]
static TLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{2,63}$").unwrap());

/// DKIM selectors may contain `_` and several dot-separated labels.
#[allow(clippy::unwrap_used)]
static SELECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?(?:\.[a-z0-9_](?:[a-z0-9_-]{0,61}[a-z0-9_])?)*$")
        .unwrap()
});

/// Selector used when the caller supplies none.
pub const DEFAULT_DKIM_SELECTOR: &str = "default";

/// Validate and normalise a mail domain.
///
/// Trims whitespace, strips a single trailing root dot and lowercases. The
/// result has at least two labels, each made of letters, digits and inner
/// hyphens, and ends in an alphabetic TLD of two or more characters.
pub fn validate_domain(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let domain = trimmed.strip_suffix('.').unwrap_or(trimmed).to_ascii_lowercase();
    let malformed = || ValidationError::Malformed(trimmed.to_string());

    if domain.len() > 253 {
        return Err(malformed());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(malformed());
    }
    let Some((tld, rest)) = labels.split_last() else {
        return Err(malformed());
    };
    if !TLD_RE.is_match(tld) || !rest.iter().all(|label| LABEL_RE.is_match(label)) {
        return Err(malformed());
    }

    Ok(domain)
}

/// Validate a host override: an IP literal or a host name.
pub fn validate_host(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }
    validate_domain(trimmed)
}

/// Whether `selector` can be prefixed to `._domainkey.<domain>`.
pub(crate) fn is_valid_selector(selector: &str) -> bool {
    selector.len() <= 253 && SELECTOR_RE.is_match(&selector.to_ascii_lowercase())
}

/// The validated input of one diagnostic request.
///
/// A `ProbeTarget` can only be built through the validator, so every check can
/// assume a well-formed lowercase domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    domain: String,
    host_override: Option<String>,
    selectors: Vec<String>,
}

impl ProbeTarget {
    /// Validate `domain` and build a target with default selectors.
    pub fn parse(domain: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            domain: validate_domain(domain)?,
            host_override: None,
            selectors: vec![DEFAULT_DKIM_SELECTOR.to_string()],
        })
    }

    /// Replace the MX-derived host used by the port and TLS checks.
    ///
    /// A blank override is treated as absent.
    pub fn with_host_override(mut self, host: Option<&str>) -> Result<Self, ValidationError> {
        self.host_override = match host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(h) => Some(validate_host(h)?),
            None => None,
        };
        Ok(self)
    }

    /// Set the DKIM selectors.
    ///
    /// Blank entries are dropped and duplicates removed, keeping the first
    /// occurrence. An empty list falls back to `["default"]`.
    #[must_use]
    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for selector in selectors {
            let selector = selector.as_ref().trim();
            if !selector.is_empty() && !unique.iter().any(|s| s == selector) {
                unique.push(selector.to_string());
            }
        }
        if unique.is_empty() {
            unique.push(DEFAULT_DKIM_SELECTOR.to_string());
        }
        self.selectors = unique;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn host_override(&self) -> Option<&str> {
        self.host_override.as_deref()
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }
}
