//! Quinn-based QUIC transport for the relay.
//!
//! Clients open one bidirectional stream per connection: requests travel on
//! the client's send half, notices on the relay's. ALPN is
//! [`RELAY_ALPN`](cosign_proto::RELAY_ALPN).
//!
//! Certificates come from PEM files when given, otherwise a self-signed one is
//! generated. Clients do not pin the relay certificate; the relay only brokers
//! envelopes, and the peer channel authenticates itself.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use cosign_proto::{
    RELAY_ALPN,
    codec::{LENGTH_PREFIX_SIZE, body_len, encode_frame},
};
use quinn::{Endpoint, ReadExactError, RecvStream, SendStream, ServerConfig};

use crate::error::RelayError;

/// Connections close after this long without traffic. Clients keep alive
/// well below it.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// QUIC transport using Quinn.
pub struct QuinnTransport {
    /// Quinn endpoint
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are provided, they will be used for TLS.
    /// Otherwise, a self-signed certificate will be generated.
    pub fn bind(
        address: &str,
        cert_path: Option<&str>,
        key_path: Option<&str>,
    ) -> Result<Self, RelayError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid bind address '{address}': {e}")))?;

        let tls_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            (None, None) => generate_self_signed_config()?,
            _ => {
                return Err(RelayError::Config(
                    "certificate and key must be given together".to_string(),
                ));
            },
        };

        let endpoint = Endpoint::server(quic_server_config(tls_config)?, addr)
            .map_err(|e| RelayError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!("QUIC transport bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Accept a new QUIC connection.
    ///
    /// Returns `Ok(None)` once the endpoint is closed.
    pub async fn accept(&self) -> Result<Option<QuinnConnection>, RelayError> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };

        let connection = incoming
            .await
            .map_err(|e| RelayError::Transport(format!("connection failed: {e}")))?;

        Ok(Some(QuinnConnection { connection }))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.endpoint
            .local_addr()
            .map_err(|e| RelayError::Transport(format!("failed to get local address: {e}")))
    }

    /// Stop accepting and close every connection.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"relay shutting down");
    }
}

/// A QUIC connection wrapper.
///
/// Clones are cheap and share the same underlying connection.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Accept the client's request stream.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), RelayError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| RelayError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with an error code and reason.
    pub fn close(&self, error_code: quinn::VarInt, reason: &[u8]) {
        self.connection.close(error_code, reason);
    }
}

/// Write one length-delimited frame.
pub(crate) async fn write_frame(send: &mut SendStream, body: &[u8]) -> Result<(), RelayError> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    encode_frame(body, &mut buf)?;

    send.write_all(&buf).await.map_err(|e| RelayError::Transport(format!("write failed: {e}")))
}

/// Read one length-delimited frame. `None` on a clean end of stream.
pub(crate) async fn read_frame(recv: &mut RecvStream) -> Result<Option<Vec<u8>>, RelayError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match recv.read_exact(&mut prefix).await {
        Ok(()) => {},
        Err(ReadExactError::FinishedEarly(0)) => return Ok(None),
        Err(e) => return Err(RelayError::Transport(format!("prefix read failed: {e}"))),
    }

    let mut body = vec![0u8; body_len(prefix)?];
    recv.read_exact(&mut body)
        .await
        .map_err(|e| RelayError::Transport(format!("body read failed: {e}")))?;

    Ok(Some(body))
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &str, key_path: &str) -> Result<rustls::ServerConfig, RelayError> {
    use std::fs;

    let cert_pem = fs::read(cert_path)
        .map_err(|e| RelayError::Config(format!("failed to read cert '{cert_path}': {e}")))?;

    let key_pem = fs::read(key_path)
        .map_err(|e| RelayError::Config(format!("failed to read key '{key_path}': {e}")))?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RelayError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| RelayError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| RelayError::Config("no private key found".to_string()))?;

    rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| RelayError::Config(format!("invalid TLS versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| RelayError::Config(format!("invalid TLS config: {e}")))
}

/// Generate a self-signed certificate.
fn generate_self_signed_config() -> Result<rustls::ServerConfig, RelayError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| RelayError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let cert_der = cert.cert.der().clone();
    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let tls_config =
        rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| RelayError::Config(format!("invalid TLS versions: {e}")))?
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key.into())
            .map_err(|e| RelayError::Config(format!("invalid TLS config: {e}")))?;

    tracing::warn!("Using self-signed certificate");

    Ok(tls_config)
}

fn quic_server_config(mut tls_config: rustls::ServerConfig) -> Result<ServerConfig, RelayError> {
    tls_config.alpn_protocols = vec![RELAY_ALPN.to_vec()];

    let mut server_config = ServerConfig::with_crypto(Arc::new(
        quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
            .map_err(|e| RelayError::Config(format!("QUIC config error: {e}")))?,
    ));

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(
        IDLE_TIMEOUT
            .try_into()
            .map_err(|e| RelayError::Config(format!("invalid idle timeout: {e}")))?,
    ));
    server_config.transport_config(Arc::new(transport));

    Ok(server_config)
}
