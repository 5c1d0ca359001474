//! Connection to the rendezvous relay.

use std::net::SocketAddr;

use cosign_proto::{RELAY_ALPN, RelayNotice, RelayRequest};
use quinn::{Endpoint, RecvStream, SendStream};
use tokio::sync::mpsc;

use super::{TransportConfig, TransportError, read_frame, tls, write_frame};

/// Handle to a connected relay.
///
/// Requests sent on `to_relay` are written in order on one stream; notices
/// arrive on `from_relay`. `from_relay` yields `None` once the relay
/// connection is gone.
pub struct RelayConnection {
    /// Send requests to the relay.
    pub to_relay: mpsc::Sender<RelayRequest>,
    /// Receive notices from the relay.
    pub from_relay: mpsc::Receiver<RelayNotice>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl RelayConnection {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Connect to a relay via QUIC.
pub async fn connect_relay(
    relay_addr: &str,
    config: &TransportConfig,
) -> Result<RelayConnection, TransportError> {
    let addr: SocketAddr = relay_addr
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid address '{relay_addr}': {e}")))?;

    let unspecified = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let bind: SocketAddr = unspecified
        .parse()
        .map_err(|e| TransportError::Connection(format!("invalid bind address: {e}")))?;

    let mut endpoint = Endpoint::client(bind)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(tls::insecure_client_config(RELAY_ALPN, config)?);

    let connecting = endpoint
        .connect(addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?;

    let connection = tokio::time::timeout(config.connect_timeout, connecting)
        .await
        .map_err(|_| TransportError::Connection(format!("timed out connecting to {addr}")))?
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| TransportError::Stream(format!("open_bi failed: {e}")))?;

    tracing::info!(%addr, "connected to relay");

    let (to_relay_tx, to_relay_rx) = mpsc::channel::<RelayRequest>(32);
    let (from_relay_tx, from_relay_rx) = mpsc::channel::<RelayNotice>(32);

    let handle = tokio::spawn(async move {
        run_connection(send, recv, to_relay_rx, from_relay_tx).await;
        connection.close(0u32.into(), b"closed");
        endpoint.wait_idle().await;
    });

    Ok(RelayConnection {
        to_relay: to_relay_tx,
        from_relay: from_relay_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Bridge between the channels and the stream until either side ends.
async fn run_connection(
    mut send: SendStream,
    recv: RecvStream,
    mut to_relay: mpsc::Receiver<RelayRequest>,
    from_relay: mpsc::Sender<RelayNotice>,
) {
    let mut reader = tokio::spawn(read_notices(recv, from_relay));

    loop {
        tokio::select! {
            request = to_relay.recv() => {
                let Some(request) = request else { break };
                if let Err(e) = send_request(&mut send, &request).await {
                    tracing::warn!(error = %e, "relay send failed");
                    break;
                }
            },
            _ = &mut reader => break,
        }
    }

    reader.abort();
    let _ = send.finish();
}

async fn send_request(send: &mut SendStream, request: &RelayRequest) -> Result<(), TransportError> {
    let mut body = Vec::new();
    request.encode(&mut body).map_err(|e| TransportError::Protocol(e.to_string()))?;
    write_frame(send, &body).await
}

async fn read_notices(mut recv: RecvStream, from_relay: mpsc::Sender<RelayNotice>) {
    loop {
        let body = match read_frame(&mut recv).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::info!("relay closed the stream");
                return;
            },
            Err(e) => {
                tracing::warn!(error = %e, "relay read failed");
                return;
            },
        };

        match RelayNotice::decode(&body) {
            Ok(notice) => {
                if from_relay.send(notice).await.is_err() {
                    return;
                }
            },
            Err(e) => tracing::warn!(error = %e, "dropping undecodable relay notice"),
        }
    }
}
