//! Peer certificate inspection over a raw TLS handshake.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, ProtocolVersion, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::parse_x509_certificate;

use crate::error::ScanError;
use crate::report::SslInfo;

const ALPN_H2: &[u8] = b"h2";
const ALPN_HTTP11: &[u8] = b"http/1.1";
const DAY_MS: f64 = 86_400_000.0;

/// Result of a completed handshake.
#[derive(Debug, Clone)]
pub struct TlsInspection {
    pub info: SslInfo,
    pub handshake_ms: u64,
    /// The server picked `h2` during ALPN.
    pub http2: bool,
}

/// Connect to `host:port`, complete a handshake and describe the leaf certificate.
///
/// Untrusted or expired chains still complete the handshake; they come back
/// with `valid = false`. The whole exchange, TCP connect included, runs under
/// `deadline`.
pub async fn inspect(host: &str, port: u16, deadline: Duration) -> Result<TlsInspection, ScanError> {
    timeout(deadline, handshake(host, port))
        .await
        .map_err(|_| ScanError::Timeout("tls handshake"))?
}

async fn handshake(host: &str, port: u16) -> Result<TlsInspection, ScanError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(RecordingVerifier::new(provider.clone()));
    let connector = TlsConnector::from(client_config(provider, verifier.clone())?);
    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|e| ScanError::Tls(format!("invalid server name {host}: {e}")))?;

    let stream = TcpStream::connect((host, port)).await?;
    let start = Instant::now();
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ScanError::Tls(e.to_string()))?;
    let handshake_ms = start.elapsed().as_millis() as u64;

    let (_, session) = tls.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ScanError::Certificate("server sent no certificate".into()))?;

    let mut info = describe_certificate(leaf, Utc::now())?;
    info.valid &= verifier.trusted();
    info.protocol = session.protocol_version().map(protocol_label);
    info.cipher = session.negotiated_cipher_suite().map(|suite| format!("{:?}", suite.suite()));
    let http2 = session.alpn_protocol() == Some(ALPN_H2);

    debug!(host, handshake_ms, http2, trusted = verifier.trusted(), "TLS handshake completed");

    Ok(TlsInspection { info, handshake_ms, http2 })
}

fn client_config(
    provider: Arc<CryptoProvider>,
    verifier: Arc<RecordingVerifier>,
) -> Result<Arc<ClientConfig>, ScanError> {
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ScanError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];

    Ok(Arc::new(config))
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        debug!("Skipping unreadable native certificate source: {error}");
    }
    roots.add_parsable_certificates(native.certs);
    roots
}

/// Accepts any chain so the certificate can be read, remembering whether
/// webpki verification against the native roots passed.
///
/// Handshake signatures are still checked.
#[derive(Debug)]
struct RecordingVerifier {
    webpki: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
    trusted: AtomicBool,
}

impl RecordingVerifier {
    fn new(provider: Arc<CryptoProvider>) -> Self {
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(native_roots()), provider.clone())
            .build()
            .inspect_err(|e| debug!("No chain verification available: {e}"))
            .ok();

        Self { webpki, provider, trusted: AtomicBool::new(false) }
    }

    fn trusted(&self) -> bool {
        self.trusted.load(Ordering::Acquire)
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
        let trusted = match &self.webpki {
            Some(webpki) => webpki
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
                .inspect_err(|e| debug!("Certificate chain rejected: {e}"))
                .is_ok(),
            None => false,
        };
        self.trusted.store(trusted, Ordering::Release);

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn protocol_label(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".into(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".into(),
        other => format!("{other:?}"),
    }
}

/// Extract issuer, subject and validity window from a DER certificate.
///
/// `valid` only reflects the validity window here; [`inspect`] also folds in
/// the chain verdict.
pub fn describe_certificate(der: &CertificateDer<'_>, now: DateTime<Utc>) -> Result<SslInfo, ScanError> {
    let (_, cert) =
        parse_x509_certificate(der.as_ref()).map_err(|e| ScanError::Certificate(e.to_string()))?;

    let validity = cert.validity();
    let valid_from = DateTime::from_timestamp(validity.not_before.timestamp(), 0);
    let valid_to = DateTime::from_timestamp(validity.not_after.timestamp(), 0);
    let valid = match (valid_from, valid_to) {
        (Some(from), Some(to)) => from <= now && now <= to,
        _ => false,
    };

    Ok(SslInfo {
        valid,
        issuer: Some(cert.issuer().to_string()),
        subject: Some(cert.subject().to_string()),
        valid_from,
        valid_to,
        days_until_expiry: valid_to.map(|to| days_until(to, now)),
        protocol: None,
        cipher: None,
    })
}

/// Whole days until `valid_to`, rounded up. Negative once expired.
pub fn days_until(valid_to: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining_ms = (valid_to - now).num_milliseconds() as f64;
    (remaining_ms / DAY_MS).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn partial_days_round_up() {
        let now = Utc::now();
        assert_eq!(days_until(now + ChronoDuration::hours(1), now), 1);
        assert_eq!(days_until(now + ChronoDuration::days(30), now), 30);
        assert_eq!(days_until(now + ChronoDuration::days(30) + ChronoDuration::minutes(1), now), 31);
    }

    #[test]
    fn expired_certificates_count_down() {
        let now = Utc::now();
        assert_eq!(days_until(now - ChronoDuration::days(2), now), -2);
    }

    #[test]
    fn garbage_der_is_rejected() {
        let der = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x02]);
        assert!(describe_certificate(&der, Utc::now()).is_err());
    }

    #[test]
    fn tls13_label_is_human_readable() {
        assert_eq!(protocol_label(ProtocolVersion::TLSv1_3), "TLSv1.3");
    }

    const LOCALHOST_CERT: &[u8] = include_bytes!("../tests/fixtures/localhost.cert.der");
    const LOCALHOST_KEY: &[u8] = include_bytes!("../tests/fixtures/localhost.key.der");
    const EXPIRED_CERT: &[u8] = include_bytes!("../tests/fixtures/expired.cert.der");

    /// TLS listener presenting the self-signed localhost certificate.
    async fn self_signed_server() -> u16 {
        use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
        use tokio::io::AsyncReadExt;

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(
                vec![CertificateDer::from(LOCALHOST_CERT.to_vec())],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(LOCALHOST_KEY.to_vec())),
            )
            .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    if let Ok(mut tls) = acceptor.accept(socket).await {
                        let mut buf = [0u8; 64];
                        let _ = tls.read(&mut buf).await;
                    }
                });
            }
        });

        port
    }

    #[tokio::test]
    async fn self_signed_certificate_is_described_but_not_valid() {
        let port = self_signed_server().await;

        let inspection = inspect("localhost", port, Duration::from_secs(5)).await.unwrap();

        assert!(!inspection.info.valid);
        assert_eq!(inspection.info.subject.as_deref(), Some("CN=localhost"));
        assert_eq!(inspection.info.issuer.as_deref(), Some("CN=localhost"));
        assert!(inspection.info.days_until_expiry.is_some_and(|days| days > 0));
        assert_eq!(inspection.info.protocol.as_deref(), Some("TLSv1.3"));
        assert!(!inspection.http2);
    }

    #[test]
    fn expired_certificate_reports_negative_days() {
        let der = CertificateDer::from(EXPIRED_CERT.to_vec());

        let info = describe_certificate(&der, Utc::now()).unwrap();

        assert!(!info.valid);
        assert!(info.days_until_expiry.is_some_and(|days| days < 0));
        assert_eq!(info.subject.as_deref(), Some("CN=expired.localhost"));
    }

    #[test]
    fn certificate_inside_its_window_is_valid_before_chain_checks() {
        let der = CertificateDer::from(LOCALHOST_CERT.to_vec());
        assert!(describe_certificate(&der, Utc::now()).unwrap().valid);
    }
}
