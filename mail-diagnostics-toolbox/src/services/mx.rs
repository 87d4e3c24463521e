//! MX record check.

use log::debug;

use super::resolver::Resolver;
use crate::error::{ResolverError, ToolboxResult};
use crate::types::MxRecord;

/// Fetch MX records sorted by `(preference, host)`.
///
/// Returns an empty list when the domain publishes no MX. A null MX
/// (RFC 7505, exchange `.`) is kept as an empty host.
pub async fn check_mx(resolver: &Resolver, domain: &str) -> ToolboxResult<Vec<MxRecord>> {
    debug!("[MX] Looking up {domain}");
    let records = sorted_mx(resolver, domain).await?;
    debug!("[MX] {domain}: {} record(s)", records.len());
    Ok(records)
}

/// Host of the highest-priority MX, if any. Null MX entries are skipped.
pub async fn primary_mx_host(
    resolver: &Resolver,
    domain: &str,
) -> Result<Option<String>, ResolverError> {
    Ok(sorted_mx(resolver, domain)
        .await?
        .into_iter()
        .map(|mx| mx.host)
        .find(|host| !host.is_empty()))
}

async fn sorted_mx(resolver: &Resolver, domain: &str) -> Result<Vec<MxRecord>, ResolverError> {
    let mut records: Vec<MxRecord> = resolver
        .mx(domain)
        .await?
        .into_iter()
        .map(|(preference, host)| MxRecord {
            preference,
            host: host.trim_end_matches('.').to_ascii_lowercase(),
        })
        .collect();
    records.sort();
    records.dedup();
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_utils::{MockTransport, fast_settings};
    use crate::types::DnsQueryType;

    fn resolver(transport: Arc<MockTransport>) -> Resolver {
        Resolver::with_transport(transport, &fast_settings())
    }

    #[tokio::test]
    async fn test_check_mx_sorted_by_preference() {
        let transport = Arc::new(MockTransport::new());
        transport.add_mx(
            "example.com",
            &[
                (30, "mx3.example.com"),
                (10, "MX1.Example.com."),
                (20, "mx2.example.com"),
            ],
        );

        let records = check_mx(&resolver(transport), "example.com").await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.preference).collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(records[0].host, "mx1.example.com");
    }

    #[tokio::test]
    async fn test_check_mx_equal_preference_sorted_by_host() {
        let transport = Arc::new(MockTransport::new());
        transport.add_mx("example.com", &[(10, "b.example.com"), (10, "a.example.com")]);

        let records = check_mx(&resolver(transport), "example.com").await.unwrap();
        assert_eq!(records[0].host, "a.example.com");
        assert_eq!(records[1].host, "b.example.com");
    }

    #[tokio::test]
    async fn test_check_mx_removes_exact_duplicates() {
        let transport = Arc::new(MockTransport::new());
        transport.add_mx("example.com", &[(10, "mx.example.com"), (10, "MX.example.com.")]);

        let records = check_mx(&resolver(transport), "example.com").await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_check_mx_none_is_not_an_error() {
        let transport = Arc::new(MockTransport::new());
        let records = check_mx(&resolver(transport), "example.com").await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_check_mx_server_failure_is_an_error() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("example.com", DnsQueryType::Mx, ResolverError::ServerFailure);

        let err = check_mx(&resolver(transport), "example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "DNS server failure (SERVFAIL)");
    }

    #[tokio::test]
    async fn test_primary_mx_host_skips_null_mx() {
        let transport = Arc::new(MockTransport::new());
        transport.add_mx("example.com", &[(0, "."), (10, "mx.example.com")]);

        let host = primary_mx_host(&resolver(transport), "example.com").await.unwrap();
        assert_eq!(host.as_deref(), Some("mx.example.com"));
    }
}
