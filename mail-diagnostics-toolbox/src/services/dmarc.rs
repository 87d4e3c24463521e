//! DMARC record check.

use log::debug;

use super::resolver::Resolver;
use crate::error::ToolboxResult;
use crate::types::DmarcResult;

/// Raw `v=DMARC1` record at `_dmarc.<domain>`, or an empty string.
///
/// Policy interpretation is left to the summary classifier.
pub async fn check_dmarc(resolver: &Resolver, domain: &str) -> ToolboxResult<DmarcResult> {
    let name = format!("_dmarc.{domain}");
    debug!("[DMARC] Looking up {name}");

    let raw = resolver
        .txt(&name)
        .await?
        .into_iter()
        .find(|txt| is_dmarc_record(txt))
        .unwrap_or_default();

    debug!("[DMARC] {domain}: {}", if raw.is_empty() { "absent" } else { "present" });
    Ok(DmarcResult { raw })
}

fn is_dmarc_record(txt: &str) -> bool {
    txt.trim_start()
        .get(..8)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("v=DMARC1"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ResolverError;
    use crate::test_utils::{MockTransport, fast_settings};
    use crate::types::DnsQueryType;

    #[tokio::test]
    async fn test_check_dmarc_present() {
        let transport = Arc::new(MockTransport::new());
        transport.add_txt(
            "_dmarc.example.com",
            &["unrelated", "v=DMARC1; p=reject; rua=mailto:d@example.com"],
        );
        let resolver = Resolver::with_transport(transport, &fast_settings());

        let result = check_dmarc(&resolver, "example.com").await.unwrap();
        assert_eq!(result.raw, "v=DMARC1; p=reject; rua=mailto:d@example.com");
    }

    #[tokio::test]
    async fn test_check_dmarc_absent_is_empty() {
        let transport = Arc::new(MockTransport::new());
        let resolver = Resolver::with_transport(transport, &fast_settings());

        let result = check_dmarc(&resolver, "example.com").await.unwrap();
        assert_eq!(result.raw, "");
    }

    #[tokio::test]
    async fn test_check_dmarc_resolver_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.fail("_dmarc.example.com", DnsQueryType::Txt, ResolverError::ServerFailure);
        let resolver = Resolver::with_transport(transport, &fast_settings());

        assert!(check_dmarc(&resolver, "example.com").await.is_err());
    }

    #[test]
    fn test_is_dmarc_record() {
        assert!(is_dmarc_record("v=dmarc1; p=none"));
        assert!(!is_dmarc_record("v=spf1 -all"));
        assert!(!is_dmarc_record("v=DM"));
    }
}
