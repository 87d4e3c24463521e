//! MCP Server implementation for Mail Diagnostics.
//!
//! Exposes one tool per check plus `run_all_checks`.

use async_trait::async_trait;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tokio::time::{Duration, timeout};

use mail_diagnostics_toolbox::{
    CheckEnvelope, DefaultPolicyClassifier, DkimEntry, DmarcResult, DnsblResult, MxRecord,
    PolicyClassifier, PortResult, ProbeSettings, ProbeTarget, PtrResult, SpfResult, TlsResult,
    ToolboxService, ValidationError,
};

use crate::config::ToolTimeouts;
use crate::report::run_all;
use crate::schemas::{DkimParams, DomainParams, HostCheckParams, RunAllParams};

/// The checks as seen by the server; swapped for a mock in tests.
#[async_trait]
pub(crate) trait CheckGateway: Send + Sync {
    async fn check_mx(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<MxRecord>>;
    async fn check_spf(&self, target: &ProbeTarget) -> CheckEnvelope<SpfResult>;
    async fn check_dkim(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<DkimEntry>>;
    async fn check_dmarc(&self, target: &ProbeTarget) -> CheckEnvelope<DmarcResult>;
    async fn check_ports(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<PortResult>>;
    async fn check_tls(&self, target: &ProbeTarget) -> CheckEnvelope<TlsResult>;
    async fn check_dnsbl(&self, target: &ProbeTarget) -> CheckEnvelope<DnsblResult>;
    async fn check_ptr(&self, target: &ProbeTarget) -> CheckEnvelope<PtrResult>;
}

struct DefaultCheckGateway {
    service: ToolboxService,
}

#[async_trait]
impl CheckGateway for DefaultCheckGateway {
    async fn check_mx(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<MxRecord>> {
        self.service.check_mx(target).await
    }

    async fn check_spf(&self, target: &ProbeTarget) -> CheckEnvelope<SpfResult> {
        self.service.check_spf(target).await
    }

    async fn check_dkim(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<DkimEntry>> {
        self.service.check_dkim(target).await
    }

    async fn check_dmarc(&self, target: &ProbeTarget) -> CheckEnvelope<DmarcResult> {
        self.service.check_dmarc(target).await
    }

    async fn check_ports(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<PortResult>> {
        self.service.check_ports(target).await
    }

    async fn check_tls(&self, target: &ProbeTarget) -> CheckEnvelope<TlsResult> {
        self.service.check_tls(target).await
    }

    async fn check_dnsbl(&self, target: &ProbeTarget) -> CheckEnvelope<DnsblResult> {
        self.service.check_dnsbl(target).await
    }

    async fn check_ptr(&self, target: &ProbeTarget) -> CheckEnvelope<PtrResult> {
        self.service.check_ptr(target).await
    }
}

/// Sanitize error messages to prevent sensitive information leakage.
///
/// Logs the full error to stderr but returns a generic message to the client.
fn sanitize_internal_error(error: impl std::fmt::Display, context: &str) -> McpError {
    log::error!("{context} error: {error}");
    McpError::internal_error(
        format!("{context} failed - check server logs for details"),
        None,
    )
}

fn invalid_params(error: &ValidationError) -> McpError {
    McpError::invalid_params(error.to_string(), None)
}

/// Validate tool input into a probe target.
fn parse_target(
    domain: &str,
    host: Option<&str>,
    selectors: Option<Vec<String>>,
) -> Result<ProbeTarget, McpError> {
    let target = ProbeTarget::parse(domain)
        .and_then(|target| target.with_host_override(host))
        .map_err(|e| invalid_params(&e))?;
    Ok(match selectors {
        Some(selectors) => target.with_selectors(selectors),
        None => target,
    })
}

/// Bound a check by `duration`; expiry becomes a failed envelope.
///
/// Dropping the check future on expiry closes whatever sockets it held.
pub(crate) async fn bounded<T>(
    duration: Duration,
    future: impl std::future::Future<Output = CheckEnvelope<T>>,
    tool_name: &str,
) -> CheckEnvelope<T> {
    match timeout(duration, future).await {
        Ok(envelope) => envelope,
        Err(_) => {
            log::warn!("{tool_name} timed out after {duration:?}");
            CheckEnvelope::failure(format!("{tool_name} timed out"))
        }
    }
}

/// Execute a check with timeout and JSON serialization.
async fn run_check_tool<T: serde::Serialize>(
    duration: Duration,
    future: impl std::future::Future<Output = CheckEnvelope<T>>,
    tool_name: &str,
) -> Result<CallToolResult, McpError> {
    let envelope = bounded(duration, future, tool_name).await;
    if let Some(error) = &envelope.error {
        log::debug!("{tool_name}: {error}");
    }

    let json = serde_json::to_string_pretty(&envelope)
        .map_err(|e| sanitize_internal_error(e, &format!("Serialize {tool_name} result")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// MCP Server for Mail Diagnostics.
///
/// Provides AI agents with mail-domain health checks through the Model
/// Context Protocol.
#[derive(Clone)]
pub struct MailDiagnosticsMcp {
    /// Check gateway.
    checks: Arc<dyn CheckGateway>,
    /// Interprets SPF/DMARC records for the `run_all_checks` summary.
    classifier: Arc<dyn PolicyClassifier>,
    /// Timeout configuration for tool calls.
    timeouts: ToolTimeouts,
    /// Tool router generated by macro.
    tool_router: ToolRouter<Self>,
}

impl MailDiagnosticsMcp {
    /// Create a new MCP server instance.
    #[must_use]
    pub fn new(settings: ProbeSettings, timeouts: ToolTimeouts) -> Self {
        Self::with_checks_and_timeouts(
            Arc::new(DefaultCheckGateway {
                service: ToolboxService::new(settings),
            }),
            timeouts,
        )
    }

    fn with_checks_and_timeouts(checks: Arc<dyn CheckGateway>, timeouts: ToolTimeouts) -> Self {
        Self {
            checks,
            classifier: Arc::new(DefaultPolicyClassifier),
            timeouts,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl MailDiagnosticsMcp {
    /// Check MX records.
    #[tool(description = "List a domain's MX records sorted by preference (lowest first)")]
    async fn check_mx(
        &self,
        Parameters(params): Parameters<DomainParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, None, None)?;
        run_check_tool(
            self.timeouts.dns_check(),
            self.checks.check_mx(&target),
            "check_mx",
        )
        .await
    }

    /// Check the SPF record.
    #[tool(
        description = "Fetch a domain's SPF record and report issues (missing/duplicate record, permissive all, lookup limit)"
    )]
    async fn check_spf(
        &self,
        Parameters(params): Parameters<DomainParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, None, None)?;
        run_check_tool(
            self.timeouts.dns_check(),
            self.checks.check_spf(&target),
            "check_spf",
        )
        .await
    }

    /// Check DKIM keys.
    #[tool(
        description = "Look up DKIM public keys for one or more selectors at <selector>._domainkey.<domain>"
    )]
    async fn check_dkim(
        &self,
        Parameters(params): Parameters<DkimParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, None, params.selectors)?;
        run_check_tool(
            self.timeouts.dns_check(),
            self.checks.check_dkim(&target),
            "check_dkim",
        )
        .await
    }

    /// Check the DMARC record.
    #[tool(description = "Fetch the raw DMARC record at _dmarc.<domain>")]
    async fn check_dmarc(
        &self,
        Parameters(params): Parameters<DomainParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, None, None)?;
        run_check_tool(
            self.timeouts.dns_check(),
            self.checks.check_dmarc(&target),
            "check_dmarc",
        )
        .await
    }

    /// Check mail port reachability.
    #[tool(
        description = "Test TCP reachability of SMTP, submission, SMTPS, IMAP(S) and POP3(S) ports on the primary MX host or a given host"
    )]
    async fn check_ports(
        &self,
        Parameters(params): Parameters<HostCheckParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, params.host.as_deref(), None)?;
        run_check_tool(
            self.timeouts.ports(),
            self.checks.check_ports(&target),
            "check_ports",
        )
        .await
    }

    /// Check STARTTLS.
    #[tool(
        description = "Negotiate STARTTLS with the primary MX host (or a given host) and report protocol version, certificate CN and weak ciphers"
    )]
    async fn check_tls(
        &self,
        Parameters(params): Parameters<HostCheckParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, params.host.as_deref(), None)?;
        run_check_tool(
            self.timeouts.tls(),
            self.checks.check_tls(&target),
            "check_tls",
        )
        .await
    }

    /// Check DNS blocklists.
    #[tool(description = "Check the mail server IP against DNS blocklists (Spamhaus, SpamCop, ...)")]
    async fn check_dnsbl(
        &self,
        Parameters(params): Parameters<DomainParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, None, None)?;
        run_check_tool(
            self.timeouts.dnsbl(),
            self.checks.check_dnsbl(&target),
            "check_dnsbl",
        )
        .await
    }

    /// Check reverse DNS.
    #[tool(
        description = "Resolve the domain's IP, its PTR record, and whether the PTR name resolves back"
    )]
    async fn check_ptr(
        &self,
        Parameters(params): Parameters<DomainParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, None, None)?;
        run_check_tool(
            self.timeouts.dns_check(),
            self.checks.check_ptr(&target),
            "check_ptr",
        )
        .await
    }

    /// Run every check.
    #[tool(
        description = "Run all eight checks concurrently and return every result plus a pass/warn/fail summary"
    )]
    async fn run_all_checks(
        &self,
        Parameters(params): Parameters<RunAllParams>,
    ) -> Result<CallToolResult, McpError> {
        let target = parse_target(&params.domain, params.host.as_deref(), params.selectors)?;
        run_check_tool(
            self.timeouts.run_all(),
            async {
                CheckEnvelope::success(
                    run_all(
                        self.checks.as_ref(),
                        self.classifier.as_ref(),
                        &target,
                        &self.timeouts,
                    )
                    .await,
                )
            },
            "run_all_checks",
        )
        .await
    }
}

#[tool_handler]
impl ServerHandler for MailDiagnosticsMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Mail Diagnostics MCP Server - Check the mail setup of a domain. \
                 DNS checks: check_mx, check_spf, check_dkim, check_dmarc, check_dnsbl, check_ptr. \
                 Network checks: check_ports and check_tls (optionally against an explicit host). \
                 Use run_all_checks for a complete report with a summary. \
                 Every tool returns an envelope {ok, data, error}."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
#[path = "test_mocks.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
pub(crate) mod test_mocks;

#[cfg(test)]
#[path = "server_tests.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests;

#[cfg(test)]
#[path = "client_integration_tests.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
mod client_integration_tests;
