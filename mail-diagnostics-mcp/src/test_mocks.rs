use super::*;

use std::collections::HashMap;

use mail_diagnostics_toolbox::{DnsblListEntry, DEFAULT_DNSBL_ZONES};
use tokio::sync::Mutex;

/// Gateway returning canned healthy results.
///
/// Delays and errors are scripted per tool name (e.g. `"check_tls"`).
#[derive(Default)]
pub struct MockCheckGateway {
    calls: Mutex<Vec<(String, ProbeTarget)>>,
    delays: Mutex<HashMap<String, Duration>>,
    errors: Mutex<HashMap<String, String>>,
}

impl MockCheckGateway {
    pub async fn set_delay(&self, tool: &str, delay: Duration) {
        self.delays.lock().await.insert(tool.to_string(), delay);
    }

    pub async fn set_error(&self, tool: &str, error: &str) {
        self.errors
            .lock()
            .await
            .insert(tool.to_string(), error.to_string());
    }

    pub async fn calls(&self) -> Vec<(String, ProbeTarget)> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_to(&self, tool: &str) -> Vec<ProbeTarget> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, target)| target.clone())
            .collect()
    }

    /// Record the call, apply the scripted delay, and return the scripted error.
    async fn enter(&self, tool: &str, target: &ProbeTarget) -> Option<String> {
        self.calls
            .lock()
            .await
            .push((tool.to_string(), target.clone()));

        let delay = self.delays.lock().await.get(tool).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.errors.lock().await.get(tool).cloned()
    }

    async fn respond<T>(
        &self,
        tool: &str,
        target: &ProbeTarget,
        data: impl FnOnce() -> T,
    ) -> CheckEnvelope<T> {
        match self.enter(tool, target).await {
            Some(error) => CheckEnvelope::failure(error),
            None => CheckEnvelope::success(data()),
        }
    }
}

#[async_trait]
impl CheckGateway for MockCheckGateway {
    async fn check_mx(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<MxRecord>> {
        self.respond("check_mx", target, || {
            vec![MxRecord {
                preference: 10,
                host: format!("mx.{}", target.domain()),
            }]
        })
        .await
    }

    async fn check_spf(&self, target: &ProbeTarget) -> CheckEnvelope<SpfResult> {
        self.respond("check_spf", target, || SpfResult {
            raw: "v=spf1 mx -all".to_string(),
            issues: Vec::new(),
        })
        .await
    }

    async fn check_dkim(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<DkimEntry>> {
        self.respond("check_dkim", target, || {
            target
                .selectors()
                .iter()
                .map(|selector| DkimEntry {
                    selector: selector.clone(),
                    pubkey: Some("MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA".to_string()),
                    error: None,
                })
                .collect()
        })
        .await
    }

    async fn check_dmarc(&self, target: &ProbeTarget) -> CheckEnvelope<DmarcResult> {
        self.respond("check_dmarc", target, || DmarcResult {
            raw: "v=DMARC1; p=reject".to_string(),
        })
        .await
    }

    async fn check_ports(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<PortResult>> {
        self.respond("check_ports", target, || {
            vec![
                PortResult {
                    service: "smtp".to_string(),
                    port: 25,
                    reachable: true,
                    note: None,
                },
                PortResult {
                    service: "submission".to_string(),
                    port: 587,
                    reachable: true,
                    note: None,
                },
            ]
        })
        .await
    }

    async fn check_tls(&self, target: &ProbeTarget) -> CheckEnvelope<TlsResult> {
        self.respond("check_tls", target, || {
            let host = target
                .host_override()
                .map_or_else(|| format!("mx.{}", target.domain()), str::to_string);
            TlsResult {
                starttls: true,
                min_version: "TLSv1.3".to_string(),
                cipher_suite: Some("TLS13_AES_256_GCM_SHA384".to_string()),
                cert_cn: host.clone(),
                cert_valid: Some(true),
                days_remaining: Some(60),
                ..TlsResult::plaintext(&host, 25, true)
            }
        })
        .await
    }

    async fn check_dnsbl(&self, target: &ProbeTarget) -> CheckEnvelope<DnsblResult> {
        self.respond("check_dnsbl", target, || {
            let lists: Vec<DnsblListEntry> = DEFAULT_DNSBL_ZONES
                .iter()
                .map(|zone| DnsblListEntry {
                    name: (*zone).to_string(),
                    listed: false,
                    response: None,
                    error: None,
                })
                .collect();
            DnsblResult {
                ip: "192.0.2.25".to_string(),
                checked: u32::try_from(lists.len()).unwrap(),
                listed: 0,
                lists,
                unreachable: Vec::new(),
            }
        })
        .await
    }

    async fn check_ptr(&self, target: &ProbeTarget) -> CheckEnvelope<PtrResult> {
        self.respond("check_ptr", target, || PtrResult {
            ip: "192.0.2.25".to_string(),
            ptr: Some(format!("mx.{}", target.domain())),
            forward_confirmed: true,
        })
        .await
    }
}

pub fn build_server(checks: Arc<dyn CheckGateway>, timeouts: ToolTimeouts) -> MailDiagnosticsMcp {
    MailDiagnosticsMcp::with_checks_and_timeouts(checks, timeouts)
}

/// Parse the JSON text of a tool result.
pub fn result_json(result: &CallToolResult) -> serde_json::Value {
    let content = serde_json::to_value(&result.content[0]).unwrap();
    let text = content["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}
