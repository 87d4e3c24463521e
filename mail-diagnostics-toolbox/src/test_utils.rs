//! Test helpers: a scripted DNS transport and a minimal SMTP responder.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::config::ProbeSettings;
use crate::error::ResolverError;
use crate::services::resolver::{DnsTransport, TransportError, reverse_name};
use crate::services::ToolboxService;
use crate::types::{DnsQueryType, RecordData};

type Key = (String, DnsQueryType);

// ===== MockTransport =====

/// DNS transport answering from in-memory tables.
///
/// Names that were never scripted answer NXDOMAIN.
#[derive(Default)]
pub struct MockTransport {
    records: Mutex<HashMap<Key, Vec<RecordData>>>,
    failures: Mutex<HashMap<Key, ResolverError>>,
    /// Failures returned for the first N queries only.
    transient: Mutex<HashMap<Key, (ResolverError, u32)>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<Key, u32>>,
}

#[allow(clippy::unwrap_used)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, record_type: DnsQueryType) -> Key {
        (name.to_ascii_lowercase(), record_type)
    }

    fn push(&self, name: &str, record_type: DnsQueryType, data: RecordData) {
        self.records
            .lock()
            .unwrap()
            .entry(Self::key(name, record_type))
            .or_default()
            .push(data);
    }

    pub fn add_a(&self, name: &str, ips: &[&str]) {
        for ip in ips {
            self.push(name, DnsQueryType::A, RecordData::A(ip.parse().unwrap()));
        }
    }

    pub fn add_aaaa(&self, name: &str, ips: &[&str]) {
        for ip in ips {
            self.push(name, DnsQueryType::Aaaa, RecordData::Aaaa(ip.parse().unwrap()));
        }
    }

    pub fn add_mx(&self, name: &str, records: &[(u16, &str)]) {
        for (preference, exchange) in records {
            self.push(
                name,
                DnsQueryType::Mx,
                RecordData::Mx {
                    preference: *preference,
                    exchange: (*exchange).to_string(),
                },
            );
        }
    }

    pub fn add_txt(&self, name: &str, texts: &[&str]) {
        for text in texts {
            self.push(name, DnsQueryType::Txt, RecordData::Txt((*text).to_string()));
        }
    }

    /// Script PTR answers for the reverse name of `ip`.
    pub fn add_ptr(&self, ip: &str, names: &[&str]) {
        let reverse = reverse_name(ip.parse::<IpAddr>().unwrap());
        for name in names {
            self.push(&reverse, DnsQueryType::Ptr, RecordData::Ptr((*name).to_string()));
        }
    }

    /// Record exists but is empty (NODATA); same as never scripting it.
    pub fn not_found(&self, name: &str, record_type: DnsQueryType) {
        self.records
            .lock()
            .unwrap()
            .remove(&Self::key(name, record_type));
    }

    pub fn fail(&self, name: &str, record_type: DnsQueryType, err: ResolverError) {
        self.failures
            .lock()
            .unwrap()
            .insert(Self::key(name, record_type), err);
    }

    pub fn fail_first(&self, name: &str, record_type: DnsQueryType, err: ResolverError, n: u32) {
        self.transient
            .lock()
            .unwrap()
            .insert(Self::key(name, record_type), (err, n));
    }

    /// Delay every answer for `name`, whatever the record type.
    pub fn delay(&self, name: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(name.to_ascii_lowercase(), delay);
    }

    pub fn calls(&self, name: &str, record_type: DnsQueryType) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&Self::key(name, record_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
#[allow(clippy::unwrap_used)]
impl DnsTransport for MockTransport {
    async fn query(
        &self,
        name: &str,
        record_type: DnsQueryType,
    ) -> Result<Vec<RecordData>, TransportError> {
        let key = Self::key(name, record_type);
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        let delay = self.delays.lock().unwrap().get(&key.0).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((err, remaining)) = self.transient.lock().unwrap().get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(TransportError::Failed(err.clone()));
        }
        if let Some(err) = self.failures.lock().unwrap().get(&key) {
            return Err(TransportError::Failed(err.clone()));
        }

        match self.records.lock().unwrap().get(&key) {
            Some(records) if !records.is_empty() => Ok(records.clone()),
            _ => Err(TransportError::NotFound),
        }
    }
}

/// Settings with short timeouts and no DNS retries.
pub fn fast_settings() -> ProbeSettings {
    ProbeSettings {
        dns_timeout_ms: 500,
        dns_retries: 0,
        connect_timeout_ms: 1_000,
        smtp_timeout_ms: 1_000,
        tls_timeout_ms: 1_000,
        ..ProbeSettings::default()
    }
}

/// A service whose resolver answers from `transport`.
pub fn mock_service(transport: Arc<MockTransport>, settings: ProbeSettings) -> ToolboxService {
    ToolboxService::with_transport(settings, transport)
}

// ===== Mock SMTP server =====

/// How the mock SMTP server answers.
#[derive(Debug, Clone)]
pub struct SmtpScript {
    pub greeting: &'static str,
    /// Extension keywords after the first `250-` line.
    pub extensions: Vec<&'static str>,
    /// Reply to `STARTTLS`; after a `220` the server sends garbage instead of
    /// a TLS ServerHello.
    pub starttls_reply: &'static str,
}

impl Default for SmtpScript {
    fn default() -> Self {
        Self {
            greeting: "220 mock.example.com ESMTP ready",
            extensions: vec!["PIPELINING", "SIZE 10240000"],
            starttls_reply: "454 4.7.0 TLS not available",
        }
    }
}

/// Serve `script` to a single client on an ephemeral loopback port.
#[allow(clippy::unwrap_used)]
pub async fn spawn_smtp_server(script: SmtpScript) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = format!("{}\r\n", script.greeting);
        if write_half.write_all(greeting.as_bytes()).await.is_err() {
            return;
        }

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let command = line.trim().to_ascii_uppercase();
            let reply = if command.starts_with("EHLO") {
                let mut reply = String::from("250");
                if script.extensions.is_empty() {
                    reply.push_str(" mock.example.com\r\n");
                } else {
                    reply.push_str("-mock.example.com\r\n");
                    for (i, ext) in script.extensions.iter().enumerate() {
                        let sep = if i + 1 == script.extensions.len() { ' ' } else { '-' };
                        reply.push_str(&format!("250{sep}{ext}\r\n"));
                    }
                }
                reply
            } else if command == "STARTTLS" {
                let reply = format!("{}\r\n", script.starttls_reply);
                let upgrade = script.starttls_reply.starts_with("220");
                if write_half.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
                if upgrade {
                    let _ = write_half.write_all(b"this is not a TLS record\r\n").await;
                    return;
                }
                continue;
            } else if command == "QUIT" {
                let _ = write_half.write_all(b"221 2.0.0 Bye\r\n").await;
                return;
            } else {
                "502 5.5.2 Command not recognized\r\n".to_string()
            };
            if write_half.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    });

    addr
}

/// Common Name of the certificate served by [`spawn_starttls_server`].
#[cfg(feature = "rustls")]
pub const STARTTLS_CERT_CN: &str = "mx.starttls.test";

/// Serve an SMTP dialogue that upgrades to TLS with a self-signed certificate.
///
/// After the handshake the server answers `QUIT` over TLS and closes.
#[cfg(feature = "rustls")]
#[allow(clippy::unwrap_used)]
pub async fn spawn_starttls_server() -> SocketAddr {
    use rcgen::{CertificateParams, DnType, KeyPair};
    use rustls::ServerConfig;
    use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio_rustls::TlsAcceptor;

    let mut params = CertificateParams::new(vec![STARTTLS_CERT_CN.to_string()]).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, STARTTLS_CERT_CN);
    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![cert.der().clone()], key)
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let mut reader = BufReader::new(stream);
        if reader
            .get_mut()
            .write_all(b"220 mx.starttls.test ESMTP ready\r\n")
            .await
            .is_err()
        {
            return;
        }

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            let command = line.trim().to_ascii_uppercase();
            let reply: &[u8] = if command.starts_with("EHLO") {
                b"250-mx.starttls.test\r\n250-PIPELINING\r\n250 STARTTLS\r\n"
            } else if command == "STARTTLS" {
                b"220 2.0.0 Ready to start TLS\r\n"
            } else {
                b"502 5.5.2 Command not recognized\r\n"
            };
            if reader.get_mut().write_all(reply).await.is_err() {
                return;
            }
            if command == "STARTTLS" {
                break;
            }
        }

        // The client waits for the 220 before sending its hello, so nothing
        // is left in the read buffer.
        let Ok(tls) = acceptor.accept(reader.into_inner()).await else {
            return;
        };
        let mut tls = BufReader::new(tls);
        line.clear();
        if matches!(tls.read_line(&mut line).await, Ok(n) if n > 0) {
            let _ = tls.get_mut().write_all(b"221 2.0.0 Bye\r\n").await;
        }
        let _ = tls.get_mut().shutdown().await;
    });

    addr
}

/// A loopback port with nothing listening on it.
#[allow(clippy::unwrap_used)]
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
