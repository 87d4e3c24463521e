//! DNS blocklist reputation check.

use std::net::{IpAddr, Ipv4Addr};

use futures::future::join_all;
use log::{debug, warn};

use super::mx::primary_mx_host;
use super::ports::first_address;
use super::resolver::{Resolver, dnsbl_query_name};
use crate::error::ToolboxResult;
use crate::types::{DnsblListEntry, DnsblResult};

/// Query every zone for the mail IP of `domain`.
///
/// The IP is the first address of the highest-priority MX host, or of the
/// domain when it has no MX. Zones that fail are reported in `unreachable`
/// and never counted as checked.
pub async fn check_dnsbl(
    resolver: &Resolver,
    domain: &str,
    zones: &[String],
) -> ToolboxResult<DnsblResult> {
    let host = primary_mx_host(resolver, domain)
        .await?
        .unwrap_or_else(|| domain.to_string());
    let ip = first_address(resolver, &host).await?;
    debug!("[DNSBL] Checking {ip} ({host}) against {} list(s)", zones.len());

    let lists = join_all(zones.iter().map(|zone| query_zone(resolver, ip, zone))).await;
    Ok(tally(ip, lists))
}

async fn query_zone(resolver: &Resolver, ip: IpAddr, zone: &str) -> DnsblListEntry {
    let name = dnsbl_query_name(ip, zone);
    let mut entry = DnsblListEntry {
        name: zone.to_string(),
        listed: false,
        response: None,
        error: None,
    };

    match resolver.ipv4(&name).await {
        Ok(answers) => classify_answers(&answers, &mut entry),
        Err(e) => entry.error = Some(e.to_string()),
    }
    if let Some(error) = &entry.error {
        warn!("[DNSBL] {zone}: {error}");
    }
    entry
}

/// Interpret the A answers for one zone.
///
/// No answer means clean. Codes in `127.0.0.0/8` are listings, except
/// `127.255.255.0/24`, which lists use to refuse the query.
fn classify_answers(answers: &[Ipv4Addr], entry: &mut DnsblListEntry) {
    let Some(first) = answers.first() else {
        return;
    };

    if let Some(refusal) = answers.iter().find(|ip| is_refusal_code(**ip)) {
        entry.error = Some(format!("query refused by list ({refusal})"));
    } else if let Some(odd) = answers.iter().find(|ip| !ip.is_loopback()) {
        entry.error = Some(format!("unexpected answer {odd}"));
    } else {
        entry.listed = true;
        entry.response = Some(first.to_string());
    }
}

fn is_refusal_code(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    (a, b, c) == (127, 255, 255)
}

fn tally(ip: IpAddr, lists: Vec<DnsblListEntry>) -> DnsblResult {
    let unreachable: Vec<String> = lists
        .iter()
        .filter(|entry| entry.error.is_some())
        .map(|entry| entry.name.clone())
        .collect();
    let count = |pred: fn(&DnsblListEntry) -> bool| {
        u32::try_from(lists.iter().filter(|e| pred(e)).count()).unwrap_or(u32::MAX)
    };

    DnsblResult {
        ip: ip.to_string(),
        checked: count(|e| e.error.is_none()),
        listed: count(|e| e.listed),
        unreachable,
        lists,
    }
}
