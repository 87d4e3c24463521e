//! DKIM public-key check across several selectors.

use futures::future::join_all;
use log::{debug, warn};

use super::resolver::Resolver;
use crate::target::is_valid_selector;
use crate::types::DkimEntry;

/// Look up every selector concurrently.
///
/// Always yields one entry per selector, in input order. Per-selector failures
/// are recorded in the entry; this function itself cannot fail.
pub async fn check_dkim(resolver: &Resolver, domain: &str, selectors: &[String]) -> Vec<DkimEntry> {
    debug!("[DKIM] Checking {} selector(s) for {domain}", selectors.len());
    let lookups = selectors
        .iter()
        .map(|selector| lookup_selector(resolver, domain, selector));
    join_all(lookups).await
}

async fn lookup_selector(resolver: &Resolver, domain: &str, selector: &str) -> DkimEntry {
    if !is_valid_selector(selector) {
        return DkimEntry::failed(selector, "invalid selector".to_string());
    }

    let name = format!("{selector}._domainkey.{domain}");
    let records = match resolver.txt(&name).await {
        Ok(records) => records,
        Err(e) => {
            warn!("[DKIM] {name}: {e}");
            return DkimEntry::failed(selector, e.to_string());
        }
    };

    if records.is_empty() {
        return DkimEntry::failed(selector, "not found".to_string());
    }

    // First record carrying a p= tag wins.
    match records.iter().find_map(|record| public_key_tag(record)) {
        Some(key) if key.is_empty() => {
            DkimEntry::failed(selector, "key revoked (empty p= tag)".to_string())
        }
        Some(key) => DkimEntry {
            selector: selector.to_string(),
            pubkey: Some(key),
            error: None,
        },
        None => DkimEntry::failed(selector, "no public key (p=) tag".to_string()),
    }
}

/// Value of the `p=` tag with folding whitespace removed.
fn public_key_tag(record: &str) -> Option<String> {
    record.split(';').find_map(|tag| {
        let (name, value) = tag.split_once('=')?;
        (name.trim() == "p").then(|| value.chars().filter(|c| !c.is_whitespace()).collect::<String>())
    })
}

impl DkimEntry {
    fn failed(selector: &str, error: String) -> Self {
        Self {
            selector: selector.to_string(),
            pubkey: None,
            error: Some(error),
        }
    }
}
