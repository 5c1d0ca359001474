//! TLS configuration for relay and peer connections.
//!
//! Relay connections skip certificate verification (development relays use
//! self-signed certificates). Peer connections pin the certificate carried
//! in the offer, so the relay cannot substitute itself as the acceptor.

use std::sync::Arc;

use quinn::{ClientConfig, ServerConfig};
use rustls::{
    DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime},
};

use super::{TransportConfig, TransportError};

/// Fresh self-signed certificate and its key.
pub(crate) fn self_signed() -> Result<(CertificateDer<'static>, PrivateKeyDer<'static>), TransportError>
{
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| TransportError::Tls(format!("failed to generate certificate: {e}")))?;

    let cert_der = cert.cert.der().clone();
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    Ok((cert_der, key.into()))
}

/// Server config presenting `cert` under `alpn`.
pub(crate) fn server_config(
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
    alpn: &[u8],
    config: &TransportConfig,
) -> Result<ServerConfig, TransportError> {
    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .map_err(|e| TransportError::Tls(format!("invalid TLS config: {e}")))?;

    tls_config.alpn_protocols = vec![alpn.to_vec()];

    let mut server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| TransportError::Tls(format!("QUIC config error: {e}")))?,
    ));
    server_config.transport_config(transport(config)?);

    Ok(server_config)
}

/// Client config that accepts any server certificate.
///
/// WARNING: Development only. Production relays should present a CA-signed
/// certificate.
pub(crate) fn insecure_client_config(
    alpn: &[u8],
    config: &TransportConfig,
) -> Result<ClientConfig, TransportError> {
    client_config(Arc::new(InsecureCertVerifier(algorithms())), alpn, config)
}

/// Client config that accepts exactly `pinned`.
pub(crate) fn pinned_client_config(
    pinned: CertificateDer<'static>,
    alpn: &[u8],
    config: &TransportConfig,
) -> Result<ClientConfig, TransportError> {
    client_config(Arc::new(PinnedCertVerifier { pinned, algorithms: algorithms() }), alpn, config)
}

fn client_config(
    verifier: Arc<dyn ServerCertVerifier>,
    alpn: &[u8],
    config: &TransportConfig,
) -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    crypto.alpn_protocols = vec![alpn.to_vec()];

    let mut client_config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| TransportError::Tls(format!("QUIC config error: {e}")))?,
    ));
    client_config.transport_config(transport(config)?);

    Ok(client_config)
}

fn transport(config: &TransportConfig) -> Result<Arc<quinn::TransportConfig>, TransportError> {
    let idle = config
        .idle_timeout
        .try_into()
        .map_err(|e| TransportError::Tls(format!("invalid idle timeout: {e}")))?;

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(idle));
    transport.keep_alive_interval(Some(config.keep_alive));
    Ok(Arc::new(transport))
}

fn algorithms() -> WebPkiSupportedAlgorithms {
    rustls::crypto::ring::default_provider().signature_verification_algorithms
}

/// Accepts any certificate; still checks handshake signatures.
#[derive(Debug)]
struct InsecureCertVerifier(WebPkiSupportedAlgorithms);

impl ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.supported_schemes()
    }
}

/// Accepts only the certificate announced in the offer.
#[derive(Debug)]
struct PinnedCertVerifier {
    pinned: CertificateDer<'static>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.pinned.as_ref() {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pinned_verifier_rejects_other_certificates() {
        let (pinned, _) = self_signed().unwrap();
        let (other, _) = self_signed().unwrap();
        let verifier = PinnedCertVerifier { pinned: pinned.clone(), algorithms: algorithms() };
        let name = ServerName::try_from("localhost").unwrap();

        assert!(verifier.verify_server_cert(&pinned, &[], &name, &[], UnixTime::now()).is_ok());
        assert!(verifier.verify_server_cert(&other, &[], &name, &[], UnixTime::now()).is_err());
    }
}
