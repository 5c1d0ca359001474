//! QUIC transport for the client.
//!
//! Thin I/O layers around the Sans-IO negotiator:
//!
//! - [`connect_relay`]: one connection to the rendezvous relay, exposed as a
//!   pair of channels carrying [`RelayRequest`]s and [`RelayNotice`]s
//! - [`QuicPeer`]: the negotiation object. Executes [`PeerCommand`]s and
//!   reports [`PeerEvent`]s; once connected it carries channel text
//!
//! Both use length-delimited frames from [`cosign_proto::codec`].
//!
//! [`RelayRequest`]: cosign_proto::RelayRequest
//! [`RelayNotice`]: cosign_proto::RelayNotice
//! [`PeerCommand`]: crate::PeerCommand
//! [`PeerEvent`]: crate::PeerEvent

mod peer;
mod relay;
mod tls;

use std::time::Duration;

use cosign_proto::codec::{LENGTH_PREFIX_SIZE, body_len, encode_frame};
use quinn::{ReadExactError, RecvStream, SendStream};
use thiserror::Error;

pub use peer::{PeerReceivers, QuicPeer};
pub use relay::{RelayConnection, connect_relay};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TLS setup failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The other end of a local channel is gone.
    #[error("channel closed")]
    ChannelClosed,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on one connection attempt.
    pub connect_timeout: Duration,
    /// Connection closes after this long without traffic.
    pub idle_timeout: Duration,
    /// Keep-alive interval (must be below `idle_timeout`).
    pub keep_alive: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Short timeouts for local testing.
    pub fn development() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(3),
        }
    }
}

/// Write one length-delimited frame.
pub(crate) async fn write_frame(send: &mut SendStream, body: &[u8]) -> Result<(), TransportError> {
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    encode_frame(body, &mut buf).map_err(|e| TransportError::Protocol(e.to_string()))?;

    send.write_all(&buf).await.map_err(|e| TransportError::Stream(format!("write failed: {e}")))
}

/// Read one length-delimited frame. `None` on a clean end of stream.
pub(crate) async fn read_frame(recv: &mut RecvStream) -> Result<Option<Vec<u8>>, TransportError> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    match recv.read_exact(&mut prefix).await {
        Ok(()) => {},
        Err(ReadExactError::FinishedEarly(0)) => return Ok(None),
        Err(e) => return Err(TransportError::Stream(format!("prefix read failed: {e}"))),
    }

    let len = body_len(prefix).map_err(|e| TransportError::Protocol(e.to_string()))?;
    let mut body = vec![0u8; len];
    recv.read_exact(&mut body)
        .await
        .map_err(|e| TransportError::Stream(format!("body read failed: {e}")))?;

    Ok(Some(body))
}
