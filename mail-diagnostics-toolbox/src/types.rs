//! Public types returned by check operations.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::ToolboxResult;

/// DNS record types routed through the resolver facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsQueryType {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Mail exchange record.
    Mx,
    /// Text record.
    Txt,
    /// Pointer record (reverse DNS).
    Ptr,
}

impl fmt::Display for DnsQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Mx => write!(f, "MX"),
            Self::Txt => write!(f, "TXT"),
            Self::Ptr => write!(f, "PTR"),
        }
    }
}

/// A single answer record as seen by the resolver facade.
///
/// Domain names are returned without the trailing root dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Mx { preference: u16, exchange: String },
    /// All character-strings of one TXT record, concatenated.
    Txt(String),
    Ptr(String),
}

/// Uniform result wrapper returned by every check.
///
/// `ok == true` implies `error` is `None`; `ok == false` implies `data` is
/// `None` and `error` is populated. Both fields are always serialised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEnvelope<T> {
    /// Whether the check produced a result.
    pub ok: bool,
    /// Check-specific payload.
    pub data: Option<T>,
    /// Human-readable failure, categorised by kind.
    pub error: Option<String>,
}

impl<T> CheckEnvelope<T> {
    /// Create a successful envelope.
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create a failed envelope.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T> From<ToolboxResult<T>> for CheckEnvelope<T> {
    fn from(result: ToolboxResult<T>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}

/// One MX record. Sequences are always sorted by ascending preference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MxRecord {
    /// Lower value = higher priority (RFC 5321).
    pub preference: u16,
    /// Exchange host, lowercase, no trailing dot.
    pub host: String,
}

/// SPF check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpfResult {
    /// The selected `v=spf1` record, or `""` when none exists.
    pub raw: String,
    /// Advisory findings.
    pub issues: Vec<String>,
}

/// DKIM lookup result for one selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkimEntry {
    /// Selector as requested.
    pub selector: String,
    /// Value of the `p=` tag.
    pub pubkey: Option<String>,
    /// Why no key was returned.
    pub error: Option<String>,
}

/// DMARC check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmarcResult {
    /// The `v=DMARC1` record at `_dmarc.<domain>`, or `""` when absent.
    pub raw: String,
}

/// A mail service probed by the port check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailService {
    /// Service name (e.g. `"submission"`).
    pub name: String,
    /// TCP port.
    pub port: u16,
}

impl MailService {
    #[must_use]
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            port,
        }
    }
}

/// Reachability of one mail service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortResult {
    /// Service name; the merge key for concurrent results.
    pub service: String,
    /// Probed TCP port.
    pub port: u16,
    /// Whether the TCP connect succeeded.
    pub reachable: bool,
    /// Failure refinement (e.g. `"connection refused"`).
    pub note: Option<String>,
}

/// STARTTLS check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsResult {
    /// Probed host.
    pub host: String,
    /// Probed port.
    pub port: u16,
    /// Whether a TLS session was negotiated via STARTTLS.
    pub starttls: bool,
    /// Whether the server advertised STARTTLS in its EHLO reply.
    pub starttls_offered: bool,
    /// Negotiated protocol version (e.g. `"TLSv1.3"`), empty without TLS.
    pub min_version: String,
    /// Negotiated cipher suite.
    pub cipher_suite: Option<String>,
    /// Leaf certificate Common Name, empty without TLS.
    #[serde(rename = "certCN")]
    pub cert_cn: String,
    /// Whether the chain verified against the webpki root store.
    pub cert_valid: Option<bool>,
    /// Verification failure, when `cert_valid` is `Some(false)`.
    pub cert_error: Option<String>,
    /// Days until the leaf certificate expires (negative if expired).
    pub days_remaining: Option<i64>,
    /// 1 if the negotiated suite matches the weak-cipher denylist, else 0.
    ///
    /// Only the suite this client negotiated is inspected. The client never
    /// offers export, RC4, 3DES or NULL suites, so 0 does not mean the server
    /// refuses them.
    pub weak_ciphers: u32,
}

impl TlsResult {
    /// Result for a server that did not upgrade to TLS.
    #[must_use]
    pub fn plaintext(host: &str, port: u16, starttls_offered: bool) -> Self {
        Self {
            host: host.to_string(),
            port,
            starttls: false,
            starttls_offered,
            min_version: String::new(),
            cipher_suite: None,
            cert_cn: String::new(),
            cert_valid: None,
            cert_error: None,
            days_remaining: None,
            weak_ciphers: 0,
        }
    }
}

/// Status of one DNSBL zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsblListEntry {
    /// Zone name (e.g. `"zen.spamhaus.org"`).
    pub name: String,
    /// Whether the IP is listed. Always `false` when `error` is set.
    pub listed: bool,
    /// Listing return code (e.g. `"127.0.0.2"`).
    pub response: Option<String>,
    /// Why the zone gave no definitive answer.
    pub error: Option<String>,
}

/// DNSBL check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsblResult {
    /// IP address that was looked up.
    pub ip: String,
    /// Zones that gave a definitive answer (listed or clean).
    pub checked: u32,
    /// Zones that list the IP.
    pub listed: u32,
    /// Per-zone results, in configuration order.
    pub lists: Vec<DnsblListEntry>,
    /// Zones that errored; never counted in `checked`.
    pub unreachable: Vec<String>,
}

/// PTR check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtrResult {
    /// Address of the domain.
    pub ip: String,
    /// Reverse host name, `None` if no PTR record exists.
    pub ptr: Option<String>,
    /// Whether the PTR host name resolves back to `ip`.
    pub forward_confirmed: bool,
}
