//! `run_all_checks` orchestration.

use mail_diagnostics_toolbox::{
    DiagnosticReport, PolicyClassifier, ProbeTarget, SummaryItem, summarize,
};
use serde::Serialize;

use crate::config::ToolTimeouts;
use crate::server::{CheckGateway, bounded};

/// Every envelope of one run plus the rollup.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FullReport {
    #[serde(flatten)]
    pub report: DiagnosticReport,
    pub summary: Vec<SummaryItem>,
}

/// Run the eight checks concurrently, each under its own tool timeout.
///
/// One slow or failing check never holds back the others: a check that hits
/// its timeout contributes a failed envelope.
pub(crate) async fn run_all(
    checks: &dyn CheckGateway,
    classifier: &dyn PolicyClassifier,
    target: &ProbeTarget,
    timeouts: &ToolTimeouts,
) -> FullReport {
    log::debug!("Running all checks for {}", target.domain());

    let (mx, spf, dkim, dmarc, ports, tls, dnsbl, ptr) = tokio::join!(
        bounded(timeouts.dns_check(), checks.check_mx(target), "check_mx"),
        bounded(timeouts.dns_check(), checks.check_spf(target), "check_spf"),
        bounded(timeouts.dns_check(), checks.check_dkim(target), "check_dkim"),
        bounded(timeouts.dns_check(), checks.check_dmarc(target), "check_dmarc"),
        bounded(timeouts.ports(), checks.check_ports(target), "check_ports"),
        bounded(timeouts.tls(), checks.check_tls(target), "check_tls"),
        bounded(timeouts.dnsbl(), checks.check_dnsbl(target), "check_dnsbl"),
        bounded(timeouts.dns_check(), checks.check_ptr(target), "check_ptr"),
    );

    let report = DiagnosticReport {
        domain: target.domain().to_string(),
        mx,
        spf,
        dkim,
        dmarc,
        ports,
        tls,
        dnsbl,
        ptr,
    };
    let summary = summarize(&report, classifier);
    FullReport { report, summary }
}
