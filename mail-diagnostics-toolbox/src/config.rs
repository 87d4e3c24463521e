//! Tunables shared by every check.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::MailService;

/// Default DNSBL zones queried by the reputation check.
pub const DEFAULT_DNSBL_ZONES: [&str; 5] = [
    "zen.spamhaus.org",
    "bl.spamcop.net",
    "b.barracudacentral.org",
    "dnsbl.sorbs.net",
    "psbl.surriel.com",
];

/// Probe configuration.
///
/// Durations are expressed in milliseconds so the struct maps directly onto a
/// flat TOML table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProbeSettings {
    /// Per-attempt DNS query timeout.
    pub dns_timeout_ms: u64,
    /// Extra attempts after a transient DNS failure.
    pub dns_retries: u32,
    /// Upstream nameserver; `None` uses the system configuration.
    pub nameserver: Option<IpAddr>,
    /// TCP connect timeout for port and TLS checks.
    pub connect_timeout_ms: u64,
    /// Timeout for each SMTP reply.
    pub smtp_timeout_ms: u64,
    /// TLS handshake timeout.
    pub tls_timeout_ms: u64,
    /// Port used for the STARTTLS dialogue.
    pub starttls_port: u16,
    /// Identity sent with `EHLO`.
    pub ehlo_name: String,
    /// Services probed by the port check.
    pub services: Vec<MailService>,
    /// Zones queried by the DNSBL check.
    pub dnsbl_zones: Vec<String>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            dns_timeout_ms: 4_000,
            dns_retries: 2,
            nameserver: None,
            connect_timeout_ms: 5_000,
            smtp_timeout_ms: 10_000,
            tls_timeout_ms: 5_000,
            starttls_port: 25,
            ehlo_name: "mail-diagnostics.invalid".to_string(),
            services: default_services(),
            dnsbl_zones: DEFAULT_DNSBL_ZONES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ProbeSettings {
    #[must_use]
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_millis(self.smtp_timeout_ms)
    }

    #[must_use]
    pub fn tls_timeout(&self) -> Duration {
        Duration::from_millis(self.tls_timeout_ms)
    }
}

/// Well-known mail ports, in probe order.
fn default_services() -> Vec<MailService> {
    vec![
        MailService::new("smtp", 25),
        MailService::new("submission", 587),
        MailService::new("smtps", 465),
        MailService::new("imap", 143),
        MailService::new("imaps", 993),
        MailService::new("pop3", 110),
        MailService::new("pop3s", 995),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fail_fast() {
        let settings = ProbeSettings::default();
        assert!(settings.dns_timeout() <= Duration::from_secs(5));
        assert!(settings.dns_retries <= 3);
        assert_eq!(settings.starttls_port, 25);
    }

    #[test]
    fn test_default_services_cover_mail_ports() {
        let ports: Vec<u16> = ProbeSettings::default()
            .services
            .iter()
            .map(|s| s.port)
            .collect();
        assert_eq!(ports, vec![25, 587, 465, 143, 993, 110, 995]);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: ProbeSettings =
            serde_json::from_str(r#"{"dns_retries": 0, "nameserver": "1.1.1.1"}"#).unwrap();
        assert_eq!(settings.dns_retries, 0);
        assert_eq!(settings.nameserver, Some("1.1.1.1".parse().unwrap()));
        assert_eq!(settings.dnsbl_zones.len(), DEFAULT_DNSBL_ZONES.len());
    }
}
