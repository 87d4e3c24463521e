//! Resolver facade: the single path every check uses for DNS.
//!
//! The facade owns the timeout/retry policy. The [`DnsTransport`] underneath
//! performs exactly one query and reports what happened; the production
//! transport wraps a hickory [`TokioResolver`] built per facade instance, so
//! no answer cache outlives the check invocation that created it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    ResolveError, TokioResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::{
        ProtoErrorKind,
        op::ResponseCode,
        rr::{RData, RecordType},
    },
};
use log::{debug, trace, warn};
use tokio::time::timeout;

use crate::config::ProbeSettings;
use crate::error::{ResolverError, ToolboxError, ToolboxResult};
use crate::types::{DnsQueryType, RecordData};

/// Outcome of a single query that produced no records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// NXDOMAIN or NODATA: the record genuinely does not exist.
    NotFound,
    /// Anything else.
    Failed(ResolverError),
}

/// One DNS query, no retry and no timeout of its own.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn query(
        &self,
        name: &str,
        record_type: DnsQueryType,
    ) -> Result<Vec<RecordData>, TransportError>;
}

/// Transport backed by hickory-resolver.
pub struct HickoryTransport {
    resolver: TokioResolver,
}

impl HickoryTransport {
    /// Build a resolver for `settings.nameserver`, or the system configuration
    /// when unset.
    ///
    /// Hickory's own retry loop is disabled (one attempt) and its timeout is
    /// aligned with the facade's, so the facade alone decides when to retry.
    pub fn new(settings: &ProbeSettings) -> Self {
        let timeout = settings.dns_timeout();
        let resolver = match settings.nameserver {
            Some(ns_ip) => {
                let config = ResolverConfig::from_parts(
                    None,
                    vec![],
                    NameServerConfigGroup::from_ips_clear(&[ns_ip], 53, true),
                );
                TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
                    .with_options(single_attempt_opts(ResolverOpts::default(), timeout))
                    .build()
            }
            None => build_system_resolver(timeout),
        };
        Self { resolver }
    }
}

fn single_attempt_opts(mut opts: ResolverOpts, timeout: Duration) -> ResolverOpts {
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    opts
}

/// Build a resolver using the host system DNS configuration (with fallback).
fn build_system_resolver(timeout: Duration) -> TokioResolver {
    #[cfg(any(unix, target_os = "windows"))]
    {
        match TokioResolver::builder_tokio() {
            Ok(mut builder) => {
                let opts = single_attempt_opts(builder.options_mut().clone(), timeout);
                *builder.options_mut() = opts;
                return builder.build();
            }
            Err(e) => {
                warn!("[DNS] Failed to load system DNS configuration, falling back to defaults: {e}");
            }
        }
    }

    TokioResolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
        .with_options(single_attempt_opts(ResolverOpts::default(), timeout))
        .build()
}

#[async_trait]
impl DnsTransport for HickoryTransport {
    async fn query(
        &self,
        name: &str,
        record_type: DnsQueryType,
    ) -> Result<Vec<RecordData>, TransportError> {
        // Fully qualified so search domains are never appended.
        let fqdn = format!("{}.", name.trim_end_matches('.'));
        let rtype = match record_type {
            DnsQueryType::A => RecordType::A,
            DnsQueryType::Aaaa => RecordType::AAAA,
            DnsQueryType::Mx => RecordType::MX,
            DnsQueryType::Txt => RecordType::TXT,
            DnsQueryType::Ptr => RecordType::PTR,
        };

        let lookup = self
            .resolver
            .lookup(fqdn.as_str(), rtype)
            .await
            .map_err(|e| classify_resolve_error(&e))?;

        let records = lookup
            .record_iter()
            .filter_map(|record| match record.data() {
                RData::A(a) if record_type == DnsQueryType::A => Some(RecordData::A(a.0)),
                RData::AAAA(aaaa) if record_type == DnsQueryType::Aaaa => {
                    Some(RecordData::Aaaa(aaaa.0))
                }
                RData::MX(mx) if record_type == DnsQueryType::Mx => Some(RecordData::Mx {
                    preference: mx.preference(),
                    exchange: trim_root(&mx.exchange().to_string()),
                }),
                RData::TXT(txt) if record_type == DnsQueryType::Txt => Some(RecordData::Txt(
                    txt.iter()
                        .map(|data| String::from_utf8_lossy(data).to_string())
                        .collect::<String>(),
                )),
                RData::PTR(ptr) if record_type == DnsQueryType::Ptr => {
                    Some(RecordData::Ptr(trim_root(&ptr.0.to_string())))
                }
                // CNAME chain links and unrelated data
                _ => None,
            })
            .collect();

        Ok(records)
    }
}

/// Map a hickory error onto the facade's taxonomy.
fn classify_resolve_error(err: &ResolveError) -> TransportError {
    if err.is_no_records_found() || err.is_nx_domain() {
        let code = err.proto().and_then(|proto| match proto.kind() {
            ProtoErrorKind::NoRecordsFound { response_code, .. } => Some(*response_code),
            _ => None,
        });
        return match code {
            Some(ResponseCode::ServFail | ResponseCode::Refused) => {
                TransportError::Failed(ResolverError::ServerFailure)
            }
            _ => TransportError::NotFound,
        };
    }

    if let Some(proto) = err.proto() {
        return TransportError::Failed(match proto.kind() {
            ProtoErrorKind::Timeout => ResolverError::Timeout,
            ProtoErrorKind::Io(_) | ProtoErrorKind::NoConnections => {
                ResolverError::Unreachable(proto.to_string())
            }
            _ => ResolverError::Malformed(proto.to_string()),
        });
    }

    let message = err.to_string();
    if message.to_lowercase().contains("timed out") {
        TransportError::Failed(ResolverError::Timeout)
    } else {
        TransportError::Failed(ResolverError::Unreachable(message))
    }
}

fn trim_root(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Build the reverse-lookup name for `ip`, without a trailing dot.
///
/// IPv4 octets are reversed under `in-addr.arpa`; IPv6 uses the nibble format
/// under `ip6.arpa`.
pub fn reverse_name(ip: IpAddr) -> String {
    format!("{}.{}", reversed_labels(ip), reverse_zone(ip))
}

/// DNSBL query name: the reversed address labels under `zone`.
pub fn dnsbl_query_name(ip: IpAddr, zone: &str) -> String {
    format!("{}.{}", reversed_labels(ip), zone.trim_end_matches('.'))
}

fn reverse_zone(ip: IpAddr) -> &'static str {
    match ip {
        IpAddr::V4(_) => "in-addr.arpa",
        IpAddr::V6(_) => "ip6.arpa",
    }
}

fn reversed_labels(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}")
        }
        IpAddr::V6(v6) => v6
            .octets()
            .iter()
            .rev()
            .flat_map(|byte| [byte & 0x0f, byte >> 4])
            .map(|nibble| format!("{nibble:x}"))
            .collect::<Vec<_>>()
            .join("."),
    }
}

/// The facade injected into every check.
pub struct Resolver {
    transport: Arc<dyn DnsTransport>,
    timeout: Duration,
    retries: u32,
}

impl Resolver {
    /// Facade over a fresh hickory transport configured from `settings`.
    pub fn new(settings: &ProbeSettings) -> Self {
        Self::with_transport(Arc::new(HickoryTransport::new(settings)), settings)
    }

    /// Facade over an arbitrary transport, using the policy from `settings`.
    pub fn with_transport(transport: Arc<dyn DnsTransport>, settings: &ProbeSettings) -> Self {
        Self {
            transport,
            timeout: settings.dns_timeout(),
            retries: settings.dns_retries,
        }
    }

    /// Query `name`, retrying transient failures.
    ///
    /// NXDOMAIN / NODATA yields an empty set. Timeout, SERVFAIL and unreachable
    /// servers are retried up to `dns_retries` times; malformed answers are not.
    pub async fn lookup(
        &self,
        name: &str,
        record_type: DnsQueryType,
    ) -> Result<Vec<RecordData>, ResolverError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            trace!("[DNS] {record_type} {name} (attempt {attempt})");

            let outcome = timeout(self.timeout, self.transport.query(name, record_type))
                .await
                .unwrap_or(Err(TransportError::Failed(ResolverError::Timeout)));

            match outcome {
                Ok(records) => return Ok(records),
                Err(TransportError::NotFound) => {
                    debug!("[DNS] {record_type} {name}: not found");
                    return Ok(Vec::new());
                }
                Err(TransportError::Failed(e)) if e.is_transient() && attempt <= self.retries => {
                    debug!("[DNS] {record_type} {name}: {e}, retrying");
                }
                Err(TransportError::Failed(e)) => {
                    warn!("[DNS] {record_type} {name} failed after {attempt} attempt(s): {e}");
                    return Err(e);
                }
            }
        }
    }

    /// MX records as `(preference, exchange)`, unsorted.
    pub async fn mx(&self, domain: &str) -> Result<Vec<(u16, String)>, ResolverError> {
        Ok(self
            .lookup(domain, DnsQueryType::Mx)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                RecordData::Mx {
                    preference,
                    exchange,
                } => Some((preference, exchange)),
                _ => None,
            })
            .collect())
    }

    /// TXT records, one string per record.
    pub async fn txt(&self, name: &str) -> Result<Vec<String>, ResolverError> {
        Ok(self
            .lookup(name, DnsQueryType::Txt)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                RecordData::Txt(text) => Some(text),
                _ => None,
            })
            .collect())
    }

    pub async fn ipv4(&self, name: &str) -> Result<Vec<Ipv4Addr>, ResolverError> {
        Ok(self
            .lookup(name, DnsQueryType::A)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                RecordData::A(ip) => Some(ip),
                _ => None,
            })
            .collect())
    }

    pub async fn ipv6(&self, name: &str) -> Result<Vec<Ipv6Addr>, ResolverError> {
        Ok(self
            .lookup(name, DnsQueryType::Aaaa)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                RecordData::Aaaa(ip) => Some(ip),
                _ => None,
            })
            .collect())
    }

    /// A records, falling back to AAAA when there are none.
    ///
    /// An A-query failure is only reported if the AAAA query yields nothing.
    pub async fn addresses(&self, name: &str) -> Result<Vec<IpAddr>, ResolverError> {
        let v4 = self.ipv4(name).await;
        if let Ok(ips) = &v4
            && !ips.is_empty()
        {
            return Ok(ips.iter().copied().map(IpAddr::V4).collect());
        }

        match self.ipv6(name).await {
            Ok(ips) if !ips.is_empty() => Ok(ips.into_iter().map(IpAddr::V6).collect()),
            v6 => match v4 {
                Err(e) => Err(e),
                Ok(_) => v6.map(|_| Vec::new()),
            },
        }
    }

    /// Resolve a probe host: IP literals pass through, names go through DNS.
    pub async fn resolve_host(&self, host: &str) -> ToolboxResult<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        let ips = self.addresses(host).await?;
        if ips.is_empty() {
            return Err(ToolboxError::NoAddress(host.to_string()));
        }
        Ok(ips)
    }

    /// PTR host names for `ip`.
    pub async fn ptr(&self, ip: IpAddr) -> Result<Vec<String>, ResolverError> {
        Ok(self
            .lookup(&reverse_name(ip), DnsQueryType::Ptr)
            .await?
            .into_iter()
            .filter_map(|record| match record {
                RecordData::Ptr(name) => Some(name),
                _ => None,
            })
            .collect())
    }
}
