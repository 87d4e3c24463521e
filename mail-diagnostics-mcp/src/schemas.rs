//! MCP tool parameter schemas
//!
//! All structs derive `Debug`, `Deserialize`, and `JsonSchema` as required by rmcp.

use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for the single-domain DNS checks (`check_mx`, `check_spf`,
/// `check_dmarc`, `check_dnsbl`, `check_ptr`).
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DomainParams {
    /// The mail domain to check.
    #[schemars(description = "The mail domain to check (e.g. example.com)")]
    pub domain: String,
}

/// Parameters for `check_dkim`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DkimParams {
    /// The mail domain to check.
    #[schemars(description = "The mail domain to check (e.g. example.com)")]
    pub domain: String,

    /// DKIM selectors to look up.
    #[schemars(description = "DKIM selectors to look up (default: [\"default\"])")]
    pub selectors: Option<Vec<String>>,
}

/// Parameters for `check_ports` and `check_tls`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HostCheckParams {
    /// The mail domain to check.
    #[schemars(description = "The mail domain to check (e.g. example.com)")]
    pub domain: String,

    /// Host to probe instead of the primary MX host.
    #[schemars(
        description = "Optional host name or IP to probe instead of the domain's primary MX host"
    )]
    pub host: Option<String>,
}

/// Parameters for `run_all_checks`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunAllParams {
    /// The mail domain to check.
    #[schemars(description = "The mail domain to check (e.g. example.com)")]
    pub domain: String,

    #[schemars(
        description = "Optional host name or IP to probe instead of the domain's primary MX host"
    )]
    pub host: Option<String>,

    #[schemars(description = "DKIM selectors to look up (default: [\"default\"])")]
    pub selectors: Option<Vec<String>>,
}
