//! Reverse DNS check with forward confirmation.

use std::net::IpAddr;

use log::{debug, warn};

use super::resolver::Resolver;
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::PtrResult;

pub async fn check_ptr(resolver: &Resolver, domain: &str) -> ToolboxResult<PtrResult> {
    let ip = resolver
        .addresses(domain)
        .await?
        .first()
        .copied()
        .ok_or_else(|| ToolboxError::NoAddress(domain.to_string()))?;

    let ptr = resolver.ptr(ip).await?.into_iter().next();
    let forward_confirmed = match &ptr {
        Some(name) => forward_confirms(resolver, name, ip).await,
        None => false,
    };

    debug!("[PTR] {domain} -> {ip} -> {ptr:?} (confirmed={forward_confirmed})");
    Ok(PtrResult {
        ip: ip.to_string(),
        ptr,
        forward_confirmed,
    })
}

/// Whether `name` resolves back to `ip`. Lookup failures count as unconfirmed.
async fn forward_confirms(resolver: &Resolver, name: &str, ip: IpAddr) -> bool {
    let forward = match ip {
        IpAddr::V4(_) => resolver
            .ipv4(name)
            .await
            .map(|ips| ips.into_iter().map(IpAddr::V4).collect::<Vec<_>>()),
        IpAddr::V6(_) => resolver
            .ipv6(name)
            .await
            .map(|ips| ips.into_iter().map(IpAddr::V6).collect::<Vec<_>>()),
    };
    match forward {
        Ok(ips) => ips.contains(&ip),
        Err(e) => {
            warn!("[PTR] Forward lookup of {name} failed: {e}");
            false
        }
    }
}
