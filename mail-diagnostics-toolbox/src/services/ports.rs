//! TCP reachability of the well-known mail ports.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, trace, warn};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::mx::primary_mx_host;
use super::resolver::Resolver;
use crate::config::ProbeSettings;
use crate::error::{ConnectFailure, ToolboxError, ToolboxResult};
use crate::target::ProbeTarget;
use crate::types::{MailService, PortResult};

/// Host probed by the port and TLS checks.
///
/// The override wins, then the highest-priority MX host, then the bare
/// domain. An MX lookup failure falls back to the domain.
pub async fn probe_host(resolver: &Resolver, target: &ProbeTarget) -> String {
    if let Some(host) = target.host_override() {
        return host.to_string();
    }
    match primary_mx_host(resolver, target.domain()).await {
        Ok(Some(host)) => host,
        Ok(None) => target.domain().to_string(),
        Err(e) => {
            warn!(
                "[PORTS] MX lookup for {} failed ({e}), probing the domain itself",
                target.domain()
            );
            target.domain().to_string()
        }
    }
}

/// Open a TCP connection, classifying failures.
pub async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream, ConnectFailure> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => {
            trace!("[PORTS] {addr}: {e}");
            Err(ConnectFailure::from(&e))
        }
        Err(_) => Err(ConnectFailure::TimedOut),
    }
}

/// Connect to every configured service on the probe host.
///
/// Only the failure to resolve the host is an envelope error; each port
/// reports its own outcome.
pub async fn check_ports(
    resolver: &Resolver,
    settings: &ProbeSettings,
    target: &ProbeTarget,
) -> ToolboxResult<Vec<PortResult>> {
    let host = probe_host(resolver, target).await;
    let ip = first_address(resolver, &host).await?;
    debug!("[PORTS] Probing {host} ({ip}), {} service(s)", settings.services.len());

    let probes = settings
        .services
        .iter()
        .map(|service| probe_service(ip, service, settings.connect_timeout()));
    let results = join_all(probes).await;

    let reachable = results.iter().filter(|r| r.reachable).count();
    debug!("[PORTS] {host}: {reachable}/{} reachable", results.len());
    Ok(results)
}

pub(crate) async fn first_address(resolver: &Resolver, host: &str) -> ToolboxResult<IpAddr> {
    resolver
        .resolve_host(host)
        .await?
        .first()
        .copied()
        .ok_or_else(|| ToolboxError::NoAddress(host.to_string()))
}

async fn probe_service(ip: IpAddr, service: &MailService, limit: Duration) -> PortResult {
    let addr = SocketAddr::new(ip, service.port);
    let (reachable, note) = match connect(addr, limit).await {
        // the stream is dropped here, closing the connection
        Ok(_stream) => (true, None),
        Err(failure) => (false, Some(failure.to_string())),
    };
    PortResult {
        service: service.name.clone(),
        port: service.port,
        reachable,
        note,
    }
}
