//! MCP Server entry point for Mail Diagnostics
//!
//! Serves the diagnostic checks over stdio. Configuration is read from the
//! TOML file named by `MAIL_DIAGNOSTICS_CONFIG`, if set.

mod config;
mod report;
mod schemas;
mod server;

use std::process::ExitCode;

use rmcp::ServiceExt;
use server::MailDiagnosticsMcp;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing to stderr (MCP uses stdout for protocol)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_ansi(false),
        )
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    tracing::info!("Starting Mail Diagnostics MCP Server");

    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        "Probe settings: DNS timeout {}ms x{} attempts, {} DNSBL zone(s), {} mail service(s)",
        config.probe.dns_timeout_ms,
        config.probe.dns_retries + 1,
        config.probe.dnsbl_zones.len(),
        config.probe.services.len()
    );

    let mcp_server = MailDiagnosticsMcp::new(config.probe, config.timeouts);

    tracing::info!("MCP server initialized with 9 tools");

    // Start serving via stdio
    tracing::info!("Starting MCP server on stdio transport");
    let service = match mcp_server.serve(rmcp::transport::stdio()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start MCP server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Wait for the server to complete
    if let Err(e) = service.waiting().await {
        tracing::error!("MCP server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
