//! Service façade exposing the eight checks.
//!
//! Every check takes a validated [`ProbeTarget`] and returns a
//! [`CheckEnvelope`]. Each call builds its own resolver, so nothing is shared
//! between invocations.

mod dkim;
mod dmarc;
mod dnsbl;
mod mx;
mod ports;
mod ptr;
pub mod resolver;
mod spf;
#[cfg(feature = "rustls")]
mod tls;

use std::sync::Arc;

use crate::config::ProbeSettings;
use crate::target::ProbeTarget;
use crate::types::{
    CheckEnvelope, DkimEntry, DmarcResult, DnsblResult, MxRecord, PortResult, PtrResult,
    SpfResult, TlsResult,
};
use resolver::{DnsTransport, Resolver};

/// Entry point for all mail diagnostics.
///
/// ```rust,no_run
/// use mail_diagnostics_toolbox::{ProbeTarget, ToolboxService};
/// # async fn demo() -> Result<(), mail_diagnostics_toolbox::ValidationError> {
/// let service = ToolboxService::default();
/// let target = ProbeTarget::parse("example.com")?;
/// let mx = service.check_mx(&target).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ToolboxService {
    settings: ProbeSettings,
    /// Replaces the hickory transport; used by tests and embedders.
    transport: Option<Arc<dyn DnsTransport>>,
}

impl ToolboxService {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            settings,
            transport: None,
        }
    }

    /// Route every DNS query through `transport` instead of hickory.
    pub fn with_transport(settings: ProbeSettings, transport: Arc<dyn DnsTransport>) -> Self {
        Self {
            settings,
            transport: Some(transport),
        }
    }

    /// A fresh resolver for one check invocation.
    fn resolver(&self) -> Resolver {
        match &self.transport {
            Some(transport) => Resolver::with_transport(transport.clone(), &self.settings),
            None => Resolver::new(&self.settings),
        }
    }

    /// MX records sorted by preference. No MX is an empty list.
    pub async fn check_mx(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<MxRecord>> {
        mx::check_mx(&self.resolver(), target.domain()).await.into()
    }

    /// The `v=spf1` record and advisory issues.
    pub async fn check_spf(&self, target: &ProbeTarget) -> CheckEnvelope<SpfResult> {
        spf::check_spf(&self.resolver(), target.domain()).await.into()
    }

    /// One entry per selector. The envelope is always `ok`.
    pub async fn check_dkim(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<DkimEntry>> {
        CheckEnvelope::success(
            dkim::check_dkim(&self.resolver(), target.domain(), target.selectors()).await,
        )
    }

    /// Raw DMARC record, empty when absent.
    pub async fn check_dmarc(&self, target: &ProbeTarget) -> CheckEnvelope<DmarcResult> {
        dmarc::check_dmarc(&self.resolver(), target.domain()).await.into()
    }

    /// TCP reachability of the configured mail services.
    pub async fn check_ports(&self, target: &ProbeTarget) -> CheckEnvelope<Vec<PortResult>> {
        ports::check_ports(&self.resolver(), &self.settings, target)
            .await
            .into()
    }

    /// STARTTLS support, negotiated version and certificate details.
    #[cfg(feature = "rustls")]
    pub async fn check_tls(&self, target: &ProbeTarget) -> CheckEnvelope<TlsResult> {
        tls::check_tls(&self.resolver(), &self.settings, target)
            .await
            .into()
    }

    #[cfg(not(feature = "rustls"))]
    pub async fn check_tls(&self, _target: &ProbeTarget) -> CheckEnvelope<TlsResult> {
        CheckEnvelope::failure("TLS support is not compiled in (enable the `rustls` feature)")
    }

    /// Listing status on the configured DNSBL zones.
    pub async fn check_dnsbl(&self, target: &ProbeTarget) -> CheckEnvelope<DnsblResult> {
        dnsbl::check_dnsbl(&self.resolver(), target.domain(), &self.settings.dnsbl_zones)
            .await
            .into()
    }

    /// Reverse DNS of the domain's address, with forward confirmation.
    pub async fn check_ptr(&self, target: &ProbeTarget) -> CheckEnvelope<PtrResult> {
        ptr::check_ptr(&self.resolver(), target.domain()).await.into()
    }
}
