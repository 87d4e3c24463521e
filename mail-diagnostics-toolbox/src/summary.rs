//! Consumer-side rollup of check envelopes.
//!
//! The checks never call into this module. Policy interpretation of SPF and
//! DMARC records is delegated to a [`PolicyClassifier`] so callers can swap in
//! stricter rules.

use serde::{Deserialize, Serialize};

use crate::types::{
    CheckEnvelope, DkimEntry, DmarcResult, DnsblResult, MxRecord, PortResult, PtrResult,
    SpfResult, TlsResult,
};

/// `all` mechanism qualifier of an SPF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpfPolicy {
    /// `-all`
    HardFail,
    /// `~all`
    SoftFail,
    /// `?all`
    Neutral,
    /// `+all`
    PassAll,
    /// Record without an `all` mechanism.
    NoAll,
    /// No SPF record.
    Absent,
}

/// `p=` tag of a DMARC record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DmarcPolicy {
    Reject,
    Quarantine,
    None,
    /// Record present but the policy could not be read.
    Unknown,
    /// No DMARC record.
    Absent,
}

/// Interprets raw policy records.
pub trait PolicyClassifier: Send + Sync {
    fn spf_policy(&self, raw: &str) -> SpfPolicy;
    fn dmarc_policy(&self, raw: &str) -> DmarcPolicy;
}

/// Substring matching on the raw record text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicyClassifier;

impl PolicyClassifier for DefaultPolicyClassifier {
    fn spf_policy(&self, raw: &str) -> SpfPolicy {
        let record = raw.to_ascii_lowercase();
        if record.trim().is_empty() {
            SpfPolicy::Absent
        } else if record.contains("-all") {
            SpfPolicy::HardFail
        } else if record.contains("~all") {
            SpfPolicy::SoftFail
        } else if record.contains("?all") {
            SpfPolicy::Neutral
        } else if record.split_whitespace().any(|term| term == "all" || term == "+all") {
            SpfPolicy::PassAll
        } else {
            SpfPolicy::NoAll
        }
    }

    fn dmarc_policy(&self, raw: &str) -> DmarcPolicy {
        let record: String = raw
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if record.is_empty() {
            return DmarcPolicy::Absent;
        }
        // `sp=` must not be read as `p=`.
        let policy = record
            .split(';')
            .find_map(|tag| tag.strip_prefix("p="));
        match policy {
            Some("reject") => DmarcPolicy::Reject,
            Some("quarantine") => DmarcPolicy::Quarantine,
            Some("none") => DmarcPolicy::None,
            _ => DmarcPolicy::Unknown,
        }
    }
}

/// The envelopes of a full run, one per check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub domain: String,
    pub mx: CheckEnvelope<Vec<MxRecord>>,
    pub spf: CheckEnvelope<SpfResult>,
    pub dkim: CheckEnvelope<Vec<DkimEntry>>,
    pub dmarc: CheckEnvelope<DmarcResult>,
    pub ports: CheckEnvelope<Vec<PortResult>>,
    pub tls: CheckEnvelope<TlsResult>,
    pub dnsbl: CheckEnvelope<DnsblResult>,
    pub ptr: CheckEnvelope<PtrResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Pass,
    Warn,
    Fail,
    /// The check itself could not run.
    Error,
}

/// One line of the rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryItem {
    pub check: String,
    pub status: SummaryStatus,
    pub message: String,
}

impl SummaryItem {
    fn new(check: &str, status: SummaryStatus, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            status,
            message: message.into(),
        }
    }
}

/// Roll the report up into one item per check, in check order.
pub fn summarize(report: &DiagnosticReport, classifier: &dyn PolicyClassifier) -> Vec<SummaryItem> {
    vec![
        judge("mx", &report.mx, |mx| summarize_mx(mx)),
        judge("spf", &report.spf, |spf| summarize_spf(spf, classifier)),
        judge("dkim", &report.dkim, |dkim| summarize_dkim(dkim)),
        judge("dmarc", &report.dmarc, |dmarc| summarize_dmarc(dmarc, classifier)),
        judge("ports", &report.ports, |ports| summarize_ports(ports)),
        judge("tls", &report.tls, summarize_tls),
        judge("dnsbl", &report.dnsbl, summarize_dnsbl),
        judge("ptr", &report.ptr, summarize_ptr),
    ]
}

fn judge<T>(
    check: &str,
    envelope: &CheckEnvelope<T>,
    rule: impl FnOnce(&T) -> (SummaryStatus, String),
) -> SummaryItem {
    match (&envelope.data, &envelope.error) {
        (Some(data), None) if envelope.ok => {
            let (status, message) = rule(data);
            SummaryItem::new(check, status, message)
        }
        (_, error) => SummaryItem::new(
            check,
            SummaryStatus::Error,
            error.clone().unwrap_or_else(|| "check failed".to_string()),
        ),
    }
}

fn summarize_mx(records: &[MxRecord]) -> (SummaryStatus, String) {
    match records.first() {
        None => (SummaryStatus::Fail, "no MX records; the domain cannot receive mail".to_string()),
        Some(primary) => (
            SummaryStatus::Pass,
            format!("{} MX record(s), primary {}", records.len(), primary.host),
        ),
    }
}

fn summarize_spf(spf: &SpfResult, classifier: &dyn PolicyClassifier) -> (SummaryStatus, String) {
    let (status, message) = match classifier.spf_policy(&spf.raw) {
        SpfPolicy::Absent => return (SummaryStatus::Fail, "no SPF record".to_string()),
        SpfPolicy::HardFail => (SummaryStatus::Pass, "SPF policy -all"),
        SpfPolicy::SoftFail => (SummaryStatus::Pass, "SPF policy ~all"),
        SpfPolicy::Neutral => (SummaryStatus::Warn, "SPF policy ?all is neutral"),
        SpfPolicy::NoAll => (SummaryStatus::Warn, "SPF record has no all mechanism"),
        SpfPolicy::PassAll => (SummaryStatus::Fail, "SPF policy +all allows any sender"),
    };
    if status == SummaryStatus::Pass && !spf.issues.is_empty() {
        return (
            SummaryStatus::Warn,
            format!("{message}; {}", spf.issues.join("; ")),
        );
    }
    (status, message.to_string())
}

fn summarize_dkim(entries: &[DkimEntry]) -> (SummaryStatus, String) {
    let found: Vec<&str> = entries
        .iter()
        .filter(|e| e.pubkey.is_some())
        .map(|e| e.selector.as_str())
        .collect();
    if found.is_empty() {
        (
            SummaryStatus::Warn,
            "no DKIM key found for the requested selector(s)".to_string(),
        )
    } else {
        (SummaryStatus::Pass, format!("DKIM key found for {}", found.join(", ")))
    }
}

fn summarize_dmarc(dmarc: &DmarcResult, classifier: &dyn PolicyClassifier) -> (SummaryStatus, String) {
    match classifier.dmarc_policy(&dmarc.raw) {
        DmarcPolicy::Reject => (SummaryStatus::Pass, "DMARC policy reject".to_string()),
        DmarcPolicy::Quarantine => (SummaryStatus::Pass, "DMARC policy quarantine".to_string()),
        DmarcPolicy::None => (
            SummaryStatus::Warn,
            "DMARC policy none only monitors".to_string(),
        ),
        DmarcPolicy::Unknown => (
            SummaryStatus::Warn,
            "DMARC record without a readable policy".to_string(),
        ),
        DmarcPolicy::Absent => (SummaryStatus::Fail, "no DMARC record".to_string()),
    }
}

fn summarize_ports(ports: &[PortResult]) -> (SummaryStatus, String) {
    let open: Vec<String> = ports
        .iter()
        .filter(|p| p.reachable)
        .map(|p| format!("{}:{}", p.service, p.port))
        .collect();
    if open.is_empty() {
        (SummaryStatus::Fail, "no mail port reachable".to_string())
    } else {
        (
            SummaryStatus::Pass,
            format!("{}/{} reachable ({})", open.len(), ports.len(), open.join(", ")),
        )
    }
}

fn summarize_tls(tls: &TlsResult) -> (SummaryStatus, String) {
    if !tls.starttls_offered {
        return (SummaryStatus::Fail, "STARTTLS not offered".to_string());
    }
    if !tls.starttls {
        return (
            SummaryStatus::Warn,
            "STARTTLS offered but not negotiated".to_string(),
        );
    }
    if tls.weak_ciphers > 0 {
        return (
            SummaryStatus::Warn,
            format!("{} with a weak cipher suite", tls.min_version),
        );
    }
    if tls.cert_valid == Some(false) {
        return (
            SummaryStatus::Warn,
            format!("{}, certificate not trusted", tls.min_version),
        );
    }
    (SummaryStatus::Pass, format!("{}, CN {}", tls.min_version, tls.cert_cn))
}

fn summarize_dnsbl(dnsbl: &DnsblResult) -> (SummaryStatus, String) {
    if dnsbl.listed > 0 {
        let names: Vec<&str> = dnsbl
            .lists
            .iter()
            .filter(|l| l.listed)
            .map(|l| l.name.as_str())
            .collect();
        return (
            SummaryStatus::Fail,
            format!("{} listed on {}", dnsbl.ip, names.join(", ")),
        );
    }
    if !dnsbl.unreachable.is_empty() {
        return (
            SummaryStatus::Warn,
            format!(
                "clean on {} list(s), {} unreachable",
                dnsbl.checked,
                dnsbl.unreachable.len()
            ),
        );
    }
    (
        SummaryStatus::Pass,
        format!("{} clean on {} list(s)", dnsbl.ip, dnsbl.checked),
    )
}

fn summarize_ptr(ptr: &PtrResult) -> (SummaryStatus, String) {
    match &ptr.ptr {
        None => (SummaryStatus::Fail, format!("no PTR record for {}", ptr.ip)),
        Some(name) if !ptr.forward_confirmed => (
            SummaryStatus::Warn,
            format!("{} -> {name}, which does not resolve back", ptr.ip),
        ),
        Some(name) => (SummaryStatus::Pass, format!("{} -> {name}", ptr.ip)),
    }
}
