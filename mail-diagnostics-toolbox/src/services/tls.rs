//! STARTTLS negotiation and certificate inspection.
//!
//! Uses rustls over the SMTP socket after a plaintext `EHLO` / `STARTTLS`
//! dialogue. Chain verification runs against the webpki roots but is only
//! recorded, so a self-signed MX certificate still yields its details.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use super::ports::{connect, first_address, probe_host};
use super::resolver::Resolver;
use crate::config::ProbeSettings;
use crate::error::{ToolboxError, ToolboxResult};
use crate::target::ProbeTarget;
use crate::types::TlsResult;

/// Upper bound on lines in one SMTP reply.
const MAX_REPLY_LINES: usize = 64;
/// RFC 5321 reply-line limit, with some slack.
const MAX_LINE_LEN: u64 = 1024;

/// Substrings marking a cipher suite as weak.
const WEAK_CIPHER_MARKERS: [&str; 6] = ["EXPORT", "RC4", "3DES", "_DES_", "NULL", "ANON"];

/// Check STARTTLS support on the probe host.
pub async fn check_tls(
    resolver: &Resolver,
    settings: &ProbeSettings,
    target: &ProbeTarget,
) -> ToolboxResult<TlsResult> {
    let host = probe_host(resolver, target).await;
    let ip = first_address(resolver, &host).await?;
    let port = settings.starttls_port;

    debug!("[TLS] Starting check for {host}:{port} ({ip})");
    let start_time = Instant::now();

    let stream = connect(SocketAddr::new(ip, port), settings.connect_timeout())
        .await
        .map_err(|reason| {
            warn!("[TLS] TCP connection to {host}:{port} failed: {reason}");
            ToolboxError::Connect {
                host: host.clone(),
                port,
                reason,
            }
        })?;

    let mut session = SmtpSession::new(stream, settings.smtp_timeout());

    let greeting = session.read_reply().await?;
    if greeting.code != 220 {
        return Err(ToolboxError::Smtp(format!(
            "unexpected greeting: {}",
            greeting.summary()
        )));
    }

    let ehlo = session.command(&format!("EHLO {}", settings.ehlo_name)).await?;
    if ehlo.code != 250 {
        session.quit().await;
        return Err(ToolboxError::Smtp(format!("EHLO rejected: {}", ehlo.summary())));
    }

    let offered = ehlo_offers_starttls(&ehlo.lines);
    trace!("[TLS] {host}: STARTTLS offered={offered}");
    if !offered {
        session.quit().await;
        debug!("[TLS] {host}: no STARTTLS, took {:?}", start_time.elapsed());
        return Ok(TlsResult::plaintext(&host, port, false));
    }

    let reply = session.command("STARTTLS").await?;
    if reply.code != 220 {
        warn!("[TLS] {host}: STARTTLS refused: {}", reply.summary());
        session.quit().await;
        return Ok(TlsResult::plaintext(&host, port, true));
    }

    let result = negotiate(session.into_inner(), &host, port, settings).await?;
    debug!(
        "[TLS] Check completed: {host} - version={}, cipher={:?}, cn={}, valid={:?}, took {:?}",
        result.min_version,
        result.cipher_suite,
        result.cert_cn,
        result.cert_valid,
        start_time.elapsed()
    );
    Ok(result)
}

/// Run the TLS handshake over an upgraded socket and inspect the session.
async fn negotiate(
    stream: TcpStream,
    host: &str,
    port: u16,
    settings: &ProbeSettings,
) -> ToolboxResult<TlsResult> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(RecordingVerifier::new(provider.clone())?);

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ToolboxError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| ToolboxError::Tls(format!("invalid server name: {host}")))?;

    trace!("[TLS] Performing TLS handshake...");
    let mut tls_stream = match timeout(settings.tls_timeout(), connector.connect(server_name, stream)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            warn!("[TLS] TLS handshake with {host} failed: {e}");
            return Err(ToolboxError::Tls(e.to_string()));
        }
        Err(_) => {
            warn!("[TLS] TLS handshake with {host} timed out");
            return Err(ToolboxError::Tls("handshake timed out".to_string()));
        }
    };

    let mut result = TlsResult::plaintext(host, port, true);
    result.starttls = true;
    {
        let (_, conn) = tls_stream.get_ref();
        result.min_version = conn
            .protocol_version()
            .map(protocol_name)
            .unwrap_or_default();
        result.cipher_suite = conn
            .negotiated_cipher_suite()
            .map(|suite| format!("{:?}", suite.suite()));
        result.weak_ciphers = u32::from(result.cipher_suite.as_deref().is_some_and(is_weak_cipher));

        if let Some(leaf) = conn.peer_certificates().and_then(|certs| certs.first()) {
            inspect_certificate(leaf, &mut result);
        }
    }

    match verifier.outcome() {
        Some(Ok(())) => result.cert_valid = Some(true),
        Some(Err(e)) => {
            debug!("[TLS] {host}: certificate not trusted: {e}");
            result.cert_valid = Some(false);
            result.cert_error = Some(e);
        }
        None => {}
    }

    // Best effort; the session is over either way.
    let _ = timeout(settings.smtp_timeout(), async {
        tls_stream.write_all(b"QUIT\r\n").await?;
        tls_stream.shutdown().await
    })
    .await;

    Ok(result)
}

/// Fill the CN and expiry fields from the leaf certificate.
fn inspect_certificate(der: &CertificateDer<'_>, result: &mut TlsResult) {
    let cert = match X509Certificate::from_der(der.as_ref()) {
        Ok((_, cert)) => cert,
        Err(e) => {
            warn!("[TLS] Certificate parsing failed: {e}");
            return;
        }
    };

    result.cert_cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from)
        .unwrap_or_default();

    let now = chrono::Utc::now();
    result.days_remaining = chrono::DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .map(|not_after| (not_after - now).num_days());
}

fn protocol_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1.0".to_string(),
        other => format!("{other:?}"),
    }
}

/// Static denylist: export-grade, RC4, (3)DES, null and anonymous suites.
fn is_weak_cipher(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    WEAK_CIPHER_MARKERS.iter().any(|marker| upper.contains(marker))
}

fn ehlo_offers_starttls(lines: &[String]) -> bool {
    lines.iter().skip(1).any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|keyword| keyword.eq_ignore_ascii_case("STARTTLS"))
    })
}

// ===== SMTP dialogue =====

/// One (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SmtpReply {
    code: u16,
    /// Text of each line, without the code and separator.
    lines: Vec<String>,
}

impl SmtpReply {
    fn summary(&self) -> String {
        format!("{} {}", self.code, self.lines.first().map_or("", String::as_str))
    }
}

/// Split an SMTP reply line into code, "is last line" and text.
fn parse_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let code = line.get(..3)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = code.parse().ok()?;
    match line.as_bytes().get(3) {
        None => Some((code, true, "")),
        Some(b' ') => Some((code, true, &line[4..])),
        Some(b'-') => Some((code, false, &line[4..])),
        Some(_) => None,
    }
}

struct SmtpSession {
    stream: BufReader<TcpStream>,
    reply_timeout: Duration,
}

impl SmtpSession {
    fn new(stream: TcpStream, reply_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            reply_timeout,
        }
    }

    async fn read_reply(&mut self) -> ToolboxResult<SmtpReply> {
        match timeout(self.reply_timeout, self.read_reply_lines()).await {
            Ok(reply) => reply,
            Err(_) => Err(ToolboxError::Smtp("timed out waiting for reply".to_string())),
        }
    }

    async fn read_reply_lines(&mut self) -> ToolboxResult<SmtpReply> {
        let mut code = None;
        let mut lines = Vec::new();
        let mut buf = String::new();

        for _ in 0..MAX_REPLY_LINES {
            buf.clear();
            let read = (&mut self.stream)
                .take(MAX_LINE_LEN)
                .read_line(&mut buf)
                .await
                .map_err(|e| ToolboxError::Smtp(format!("read failed: {e}")))?;
            if read == 0 {
                return Err(ToolboxError::Smtp("connection closed by server".to_string()));
            }

            let Some((line_code, last, text)) = parse_reply_line(&buf) else {
                return Err(ToolboxError::Smtp(format!("malformed reply line: {}", buf.trim_end())));
            };
            if *code.get_or_insert(line_code) != line_code {
                return Err(ToolboxError::Smtp("inconsistent codes in multi-line reply".to_string()));
            }
            lines.push(text.to_string());
            if last {
                return Ok(SmtpReply { code: line_code, lines });
            }
        }

        Err(ToolboxError::Smtp("reply too long".to_string()))
    }

    async fn command(&mut self, command: &str) -> ToolboxResult<SmtpReply> {
        trace!("[TLS] >>> {command}");
        self.stream
            .get_mut()
            .write_all(format!("{command}\r\n").as_bytes())
            .await
            .map_err(|e| ToolboxError::Smtp(format!("write failed: {e}")))?;
        self.read_reply().await
    }

    async fn quit(mut self) {
        if let Err(e) = self.command("QUIT").await {
            trace!("[TLS] QUIT failed: {e}");
        }
    }

    fn into_inner(self) -> TcpStream {
        self.stream.into_inner()
    }
}

// ===== Certificate verification =====

/// Runs webpki verification, remembers the verdict and accepts the chain.
#[derive(Debug)]
struct RecordingVerifier {
    inner: Arc<WebPkiServerVerifier>,
    outcome: Mutex<Option<Result<(), String>>>,
}

impl RecordingVerifier {
    fn new(provider: Arc<CryptoProvider>) -> ToolboxResult<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider)
            .build()
            .map_err(|e| ToolboxError::Tls(e.to_string()))?;
        Ok(Self {
            inner,
            outcome: Mutex::new(None),
        })
    }

    fn outcome(&self) -> Option<Result<(), String>> {
        self.outcome.lock().ok().and_then(|slot| slot.clone())
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .map(|_| ())
            .map_err(|e| e.to_string());
        if let Ok(mut slot) = self.outcome.lock() {
            *slot = Some(verdict);
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
