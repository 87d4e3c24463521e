//! Error taxonomy shared by every check.
//!
//! Validation errors reject the input before any network access. Everything
//! else ends up as the `error` string of a [`CheckEnvelope`](crate::CheckEnvelope),
//! so each `Display` impl must read as a categorised, human-facing message
//! rather than a raw transport error.

use serde::Serialize;
use thiserror::Error;

/// Input rejected by the domain validator.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum ValidationError {
    /// Nothing (or only whitespace) was supplied.
    #[error("Domain name is required")]
    Empty,

    /// The input is not a syntactically valid host name.
    #[error("Invalid domain name: {0}")]
    Malformed(String),
}

/// Failure reported by the resolver facade after its retry budget is spent.
///
/// A record that genuinely does not exist is *not* an error: the facade
/// returns an empty record set for NXDOMAIN / NODATA.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum ResolverError {
    /// No answer within the per-query timeout.
    #[error("DNS query timed out")]
    Timeout,

    /// The upstream server answered SERVFAIL or REFUSED.
    #[error("DNS server failure (SERVFAIL)")]
    ServerFailure,

    /// No nameserver could be reached.
    #[error("DNS server unreachable: {0}")]
    Unreachable(String),

    /// The answer could not be understood.
    #[error("Malformed DNS response: {0}")]
    Malformed(String),
}

impl ResolverError {
    /// Whether the facade may retry the query.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// Why a TCP connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectFailure {
    Refused,
    TimedOut,
    Reset,
    HostUnreachable,
    NetworkUnreachable,
    Other,
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refused => write!(f, "connection refused"),
            Self::TimedOut => write!(f, "filtered (timed out)"),
            Self::Reset => write!(f, "connection reset"),
            Self::HostUnreachable => write!(f, "host unreachable"),
            Self::NetworkUnreachable => write!(f, "network unreachable"),
            Self::Other => write!(f, "connection failed"),
        }
    }
}

impl From<&std::io::Error> for ConnectFailure {
    fn from(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => Self::Reset,
            ErrorKind::HostUnreachable => Self::HostUnreachable,
            ErrorKind::NetworkUnreachable => Self::NetworkUnreachable,
            _ => Self::Other,
        }
    }
}

/// Envelope-level failure of a check.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum ToolboxError {
    /// A DNS query failed for a reason other than "record absent".
    #[error("{0}")]
    Resolver(#[from] ResolverError),

    /// The probed host has no A/AAAA record.
    #[error("No IP address found for {0}")]
    NoAddress(String),

    /// The TCP connection needed by the check could not be opened.
    #[error("Cannot connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: ConnectFailure,
    },

    /// The SMTP server broke the expected dialogue.
    #[error("SMTP protocol error: {0}")]
    Smtp(String),

    /// The TLS upgrade failed.
    #[error("TLS negotiation failed: {0}")]
    Tls(String),
}

/// Toolbox Result type alias.
pub type ToolboxResult<T> = std::result::Result<T, ToolboxError>;
