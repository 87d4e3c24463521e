//! Mail-domain diagnostic engine
//!
//! Eight independent checks (MX, SPF, DKIM, DMARC, port reachability,
//! STARTTLS, DNSBL, PTR) sharing one resolver facade and one result envelope.
//! Every check is stateless: resolvers and sockets live only as long as the
//! call that created them.

mod config;
mod error;
mod services;
mod summary;
mod target;
mod types;

#[cfg(test)]
mod test_utils;

pub use config::{DEFAULT_DNSBL_ZONES, ProbeSettings};
pub use error::{ConnectFailure, ResolverError, ToolboxError, ToolboxResult, ValidationError};
pub use services::ToolboxService;
pub use services::resolver::{
    DnsTransport, HickoryTransport, Resolver, TransportError, dnsbl_query_name, reverse_name,
};
pub use summary::{
    DefaultPolicyClassifier, DiagnosticReport, DmarcPolicy, PolicyClassifier, SpfPolicy,
    SummaryItem, SummaryStatus, summarize,
};
pub use target::{DEFAULT_DKIM_SELECTOR, ProbeTarget, validate_domain, validate_host};
pub use types::{
    CheckEnvelope, DkimEntry, DmarcResult, DnsQueryType, DnsblListEntry, DnsblResult,
    MailService, MxRecord, PortResult, PtrResult, RecordData, SpfResult, TlsResult,
};
