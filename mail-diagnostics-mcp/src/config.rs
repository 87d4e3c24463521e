//! Server configuration.
//!
//! Read from the TOML file named by `MAIL_DIAGNOSTICS_CONFIG`; without it the
//! built-in defaults apply.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use mail_diagnostics_toolbox::ProbeSettings;
use serde::Deserialize;

/// Environment variable holding the config file path.
pub const CONFIG_ENV: &str = "MAIL_DIAGNOSTICS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine tunables, passed to every check.
    pub probe: ProbeSettings,
    /// Outer limits on each tool call.
    pub timeouts: ToolTimeouts,
}

/// Outer per-tool timeouts, in milliseconds.
///
/// These bound a whole tool call, on top of the per-operation timeouts in
/// [`ProbeSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolTimeouts {
    /// MX, SPF, DKIM, DMARC and PTR.
    pub dns_check_ms: u64,
    pub ports_ms: u64,
    pub tls_ms: u64,
    pub dnsbl_ms: u64,
    pub run_all_ms: u64,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            dns_check_ms: 30_000,
            ports_ms: 20_000,
            tls_ms: 45_000,
            dnsbl_ms: 30_000,
            run_all_ms: 90_000,
        }
    }
}

impl ToolTimeouts {
    pub fn dns_check(&self) -> Duration {
        Duration::from_millis(self.dns_check_ms)
    }

    pub fn ports(&self) -> Duration {
        Duration::from_millis(self.ports_ms)
    }

    pub fn tls(&self) -> Duration {
        Duration::from_millis(self.tls_ms)
    }

    pub fn dnsbl(&self) -> Duration {
        Duration::from_millis(self.dnsbl_ms)
    }

    pub fn run_all(&self) -> Duration {
        Duration::from_millis(self.run_all_ms)
    }
}

/// Load the configuration named by [`CONFIG_ENV`], or the defaults.
///
/// A path that is set but unreadable is an error, not a silent fallback.
pub fn load() -> anyhow::Result<AppConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => load_from(Path::new(&path)),
        None => Ok(AppConfig::default()),
    }
}

pub fn load_from(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn parse(text: &str) -> anyhow::Result<AppConfig> {
    Ok(toml::from_str(text)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_config_overrides_selected_fields() {
        let config = parse(
            r#"
            [probe]
            dns_timeout_ms = 3000
            nameserver = "9.9.9.9"
            dnsbl_zones = ["zen.spamhaus.org"]

            [[probe.services]]
            name = "smtp"
            port = 25

            [timeouts]
            tls_ms = 60000
            "#,
        )
        .unwrap();

        assert_eq!(config.probe.dns_timeout_ms, 3000);
        assert_eq!(config.probe.dns_retries, ProbeSettings::default().dns_retries);
        assert_eq!(config.probe.nameserver, Some("9.9.9.9".parse().unwrap()));
        assert_eq!(config.probe.services.len(), 1);
        assert_eq!(config.probe.dnsbl_zones, vec!["zen.spamhaus.org"]);
        assert_eq!(config.timeouts.tls(), Duration::from_secs(60));
        assert_eq!(config.timeouts.ports(), ToolTimeouts::default().ports());
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(parse("[probe]\ndns_retries = \"many\"").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = std::env::temp_dir().join("mail-diagnostics-missing-config.toml");
        let error = load_from(&path).unwrap_err();
        assert!(error.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn config_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "mail-diagnostics-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[timeouts]\nrun_all_ms = 1000\n").unwrap();
        let config = load_from(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.timeouts.run_all(), Duration::from_secs(1));
    }
}
