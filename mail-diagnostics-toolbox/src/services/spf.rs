//! SPF record check.
//!
//! Static checks on the published record only; include chains are not
//! expanded.

use std::net::IpAddr;

use log::debug;

use super::resolver::Resolver;
use crate::error::ToolboxResult;
use crate::types::SpfResult;

/// RFC 7208 section 4.6.4 limit on DNS-querying terms.
const MAX_LOOKUP_TERMS: usize = 10;

/// Mechanisms and modifiers that cost a DNS lookup.
const LOOKUP_TERMS: [&str; 6] = ["include", "a", "mx", "ptr", "exists", "redirect"];

pub async fn check_spf(resolver: &Resolver, domain: &str) -> ToolboxResult<SpfResult> {
    debug!("[SPF] Looking up {domain}");
    let records: Vec<String> = resolver
        .txt(domain)
        .await?
        .into_iter()
        .filter(|txt| is_spf_record(txt))
        .collect();

    let Some(raw) = records.first().cloned() else {
        debug!("[SPF] {domain}: no record");
        return Ok(SpfResult {
            raw: String::new(),
            issues: vec!["no SPF record found".to_string()],
        });
    };

    let mut issues = Vec::new();
    if records.len() > 1 {
        issues.push(format!(
            "multiple SPF records found ({}); only one is allowed",
            records.len()
        ));
    }
    issues.extend(analyze_record(&raw));

    debug!("[SPF] {domain}: {} issue(s)", issues.len());
    Ok(SpfResult { raw, issues })
}

/// Whether a TXT string is an SPF version 1 record.
fn is_spf_record(txt: &str) -> bool {
    txt.split_whitespace()
        .next()
        .is_some_and(|term| term.eq_ignore_ascii_case("v=spf1"))
}

/// Split a term into its qualifier and lowercase name.
fn split_term(term: &str) -> (char, String) {
    let (qualifier, rest) = match term.chars().next() {
        Some(q @ ('+' | '-' | '~' | '?')) => (q, &term[1..]),
        _ => ('+', term),
    };
    let name = rest
        .split([':', '/', '='])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    (qualifier, name)
}

/// Whether `term` is a passing `ip4`/`ip6` mechanism with a zero-length prefix.
fn allows_every_address(term: &str) -> bool {
    let rest = match term.chars().next() {
        Some('+') => &term[1..],
        Some('-' | '~' | '?') => return false,
        _ => term,
    };
    let Some((name, network)) = rest.split_once(':') else {
        return false;
    };
    if !name.eq_ignore_ascii_case("ip4") && !name.eq_ignore_ascii_case("ip6") {
        return false;
    }
    network
        .rsplit_once('/')
        .is_some_and(|(addr, len)| len == "0" && addr.parse::<IpAddr>().is_ok())
}

/// Coarse findings for a single record, excluding duplicate detection.
fn analyze_record(raw: &str) -> Vec<String> {
    let terms: Vec<(char, String)> = raw.split_whitespace().skip(1).map(split_term).collect();
    let mut issues = Vec::new();

    let all = terms.iter().find(|(_, name)| name == "all");
    let has_redirect = terms.iter().any(|(_, name)| name == "redirect");

    match all {
        None if !has_redirect => {
            issues.push("no 'all' mechanism; end the record with -all or ~all".to_string());
        }
        Some(('+', _)) => {
            issues.push("'+all' allows any host to send mail for this domain".to_string());
        }
        Some(('?', _)) => {
            issues.push("'?all' is neutral and does not protect the domain".to_string());
        }
        _ => {}
    }

    for term in raw.split_whitespace().skip(1) {
        if allows_every_address(term) {
            issues.push(format!(
                "'{term}' allows any host to send mail for this domain"
            ));
        }
    }

    let lookups = terms
        .iter()
        .filter(|(_, name)| LOOKUP_TERMS.contains(&name.as_str()))
        .count();
    if lookups > MAX_LOOKUP_TERMS {
        issues.push(format!(
            "too many DNS-lookup terms ({lookups} > {MAX_LOOKUP_TERMS})"
        ));
    }

    issues
}
