//! QUIC negotiation object.
//!
//! The initiator's offer carries a fresh self-signed certificate; its
//! endpoint accepts exactly one connection. The responder dials the
//! initiator's candidates in arrival order with that certificate pinned, and
//! the first connection that opens the channel wins.
//!
//! Description blob: `{"kind":"offer","cert":"<hex DER>"}` or
//! `{"kind":"answer"}`. Candidate blob: `udp <ip>:<port>`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use cosign_proto::{CHANNEL_LABEL, IceCandidate, PEER_ALPN, SessionDescription};
use quinn::{ClientConfig, Connection, Endpoint, RecvStream, SendStream};
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::AbortHandle};

use super::{TransportConfig, TransportError, read_frame, tls, write_frame};
use crate::{DescriptionKind, PeerCommand, PeerEvent};

/// Receiving ends handed to the driver alongside a [`QuicPeer`].
pub struct PeerReceivers {
    /// What the negotiation object reports.
    pub events: mpsc::UnboundedReceiver<PeerEvent>,
    /// Text received on the channel, in order.
    pub messages: mpsc::UnboundedReceiver<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DescriptionBlob {
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cert: Option<String>,
}

/// Negotiation object backed by quinn.
///
/// Commands are executed without blocking: anything that waits on the
/// network runs in a spawned task and reports back through
/// [`PeerReceivers::events`]. Must be used inside a tokio runtime.
pub struct QuicPeer {
    config: TransportConfig,
    events: mpsc::UnboundedSender<PeerEvent>,
    inbound: mpsc::UnboundedSender<String>,
    outbound: mpsc::UnboundedSender<String>,
    /// Taken by whichever task ends up owning the channel
    outbound_rx: Option<mpsc::UnboundedReceiver<String>>,
    endpoint: Option<Endpoint>,
    /// Responder: candidates waiting to be dialed
    dial_queue: Option<mpsc::UnboundedSender<(IceCandidate, SocketAddr)>>,
    tasks: Vec<AbortHandle>,
}

impl QuicPeer {
    /// Create an idle negotiation object.
    pub fn new(config: TransportConfig) -> (Self, PeerReceivers) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let peer = Self {
            config,
            events: events_tx,
            inbound: inbound_tx,
            outbound: outbound_tx,
            outbound_rx: Some(outbound_rx),
            endpoint: None,
            dial_queue: None,
            tasks: Vec::new(),
        };

        (peer, PeerReceivers { events: events_rx, messages: inbound_rx })
    }

    /// Execute one command.
    ///
    /// Failures are reported as [`PeerEvent::Failed`] (fatal) or
    /// [`PeerEvent::CandidateRejected`] (recoverable).
    pub fn execute(&mut self, command: PeerCommand) {
        let result = match command {
            PeerCommand::OpenChannel => Ok(()),
            PeerCommand::CreateOffer => self.create_offer(),
            PeerCommand::CreateAnswer => self.create_answer(),
            PeerCommand::SetRemoteDescription { kind, description } => {
                self.set_remote_description(kind, &description)
            },
            PeerCommand::AddCandidate(candidate) => {
                self.add_candidate(candidate);
                Ok(())
            },
            PeerCommand::Close => {
                self.close();
                Ok(())
            },
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "peer command failed");
            self.report(PeerEvent::Failed { reason: e.to_string() });
        }
    }

    /// Queue text for the channel.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound.send(text).map_err(|_| TransportError::ChannelClosed)
    }

    /// Drop the channel and the endpoint.
    ///
    /// The object is idle afterwards and can run another negotiation. Text
    /// queued for the old channel is discarded.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.dial_queue = None;
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close(0u32.into(), b"closed");
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = outbound_tx;
        self.outbound_rx = Some(outbound_rx);
    }

    fn create_offer(&mut self) -> Result<(), TransportError> {
        let (cert, key) = tls::self_signed()?;
        let server_config = tls::server_config(cert.clone(), key, PEER_ALPN, &self.config)?;

        let endpoint = Endpoint::server(server_config, unspecified())
            .map_err(|e| TransportError::Connection(format!("failed to bind endpoint: {e}")))?;
        let port = local_port(&endpoint)?;

        let outbound = self.take_outbound()?;
        let task = tokio::spawn(accept_channel(
            endpoint.clone(),
            outbound,
            self.inbound.clone(),
            self.events.clone(),
        ));
        self.tasks.push(task.abort_handle());
        self.endpoint = Some(endpoint);

        self.report_description("offer", Some(hex::encode(cert.as_ref())))?;
        self.report_candidates(port);
        Ok(())
    }

    fn create_answer(&mut self) -> Result<(), TransportError> {
        let port = local_port(self.client_endpoint()?)?;
        self.report_description("answer", None)?;
        self.report_candidates(port);
        Ok(())
    }

    fn set_remote_description(
        &mut self,
        kind: DescriptionKind,
        description: &SessionDescription,
    ) -> Result<(), TransportError> {
        let blob: DescriptionBlob = serde_json::from_str(&description.blob)
            .map_err(|e| TransportError::Protocol(format!("malformed description: {e}")))?;

        match kind {
            DescriptionKind::Answer => {
                // Acceptor side: the responder dials us, nothing to pin.
                tracing::debug!(kind = %blob.kind, "remote answer applied");
                Ok(())
            },
            DescriptionKind::Offer => {
                let cert_hex = blob.cert.ok_or_else(|| {
                    TransportError::Protocol("offer without certificate".to_string())
                })?;
                let cert = hex::decode(cert_hex)
                    .map_err(|e| TransportError::Protocol(format!("malformed certificate: {e}")))?;

                let client_config =
                    tls::pinned_client_config(CertificateDer::from(cert), PEER_ALPN, &self.config)?;
                let endpoint = self.client_endpoint()?.clone();
                let outbound = self.take_outbound()?;
                let (queue_tx, queue_rx) = mpsc::unbounded_channel();

                let task = tokio::spawn(dial_candidates(
                    endpoint,
                    client_config,
                    self.config.clone(),
                    queue_rx,
                    outbound,
                    self.inbound.clone(),
                    self.events.clone(),
                ));
                self.tasks.push(task.abort_handle());
                self.dial_queue = Some(queue_tx);
                Ok(())
            },
        }
    }

    fn add_candidate(&mut self, candidate: IceCandidate) {
        let addr = match parse_candidate(&candidate) {
            Ok(addr) => addr,
            Err(reason) => {
                self.report(PeerEvent::CandidateRejected { candidate, reason });
                return;
            },
        };

        match &self.dial_queue {
            Some(queue) => {
                if let Err(mpsc::error::SendError((candidate, _))) = queue.send((candidate, addr)) {
                    self.report(PeerEvent::CandidateRejected {
                        candidate,
                        reason: "connection already established".to_string(),
                    });
                }
            },
            None => tracing::debug!(%addr, "acceptor ignores remote candidate"),
        }
    }

    fn client_endpoint(&mut self) -> Result<&Endpoint, TransportError> {
        if self.endpoint.is_none() {
            let endpoint = Endpoint::client(unspecified())
                .map_err(|e| TransportError::Connection(format!("failed to bind endpoint: {e}")))?;
            self.endpoint = Some(endpoint);
        }
        self.endpoint.as_ref().ok_or(TransportError::ChannelClosed)
    }

    fn take_outbound(&mut self) -> Result<mpsc::UnboundedReceiver<String>, TransportError> {
        self.outbound_rx
            .take()
            .ok_or_else(|| TransportError::Protocol("channel already claimed".to_string()))
    }

    fn report_description(&self, kind: &str, cert: Option<String>) -> Result<(), TransportError> {
        let blob = serde_json::to_string(&DescriptionBlob { kind: kind.to_string(), cert })
            .map_err(|e| TransportError::Protocol(format!("description encode failed: {e}")))?;
        self.report(PeerEvent::LocalDescription(SessionDescription::new(blob)));
        Ok(())
    }

    fn report_candidates(&self, port: u16) {
        for candidate in local_candidates(port) {
            self.report(PeerEvent::LocalCandidate(candidate));
        }
    }

    fn report(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("peer event receiver dropped");
        }
    }
}

impl Drop for QuicPeer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Acceptor: wait for the dialer, check the label, run the channel.
async fn accept_channel(
    endpoint: Endpoint,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    while let Some(incoming) = endpoint.accept().await {
        let connection = match incoming.await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::debug!(error = %e, "incoming peer connection failed");
                continue;
            },
        };

        let (send, mut recv) = match connection.accept_bi().await {
            Ok(streams) => streams,
            Err(e) => {
                tracing::debug!(error = %e, "peer opened no channel");
                continue;
            },
        };

        match read_frame(&mut recv).await {
            Ok(Some(label)) if label == CHANNEL_LABEL.as_bytes() => {},
            other => {
                tracing::warn!(?other, "unexpected channel label");
                connection.close(1u32.into(), b"bad label");
                continue;
            },
        }

        tracing::info!(remote = %connection.remote_address(), "peer channel accepted");
        run_channel(connection, send, recv, outbound, inbound, events).await;
        return;
    }
}

/// Dialer: try candidates in arrival order until one opens the channel.
async fn dial_candidates(
    endpoint: Endpoint,
    client_config: ClientConfig,
    config: TransportConfig,
    mut queue: mpsc::UnboundedReceiver<(IceCandidate, SocketAddr)>,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    while let Some((candidate, addr)) = queue.recv().await {
        match dial(&endpoint, &client_config, &config, addr).await {
            Ok((connection, send, recv)) => {
                tracing::info!(%addr, "peer channel opened");
                drop(queue);
                run_channel(connection, send, recv, outbound, inbound, events).await;
                return;
            },
            Err(e) => {
                tracing::debug!(%addr, error = %e, "candidate failed");
                let _ = events.send(PeerEvent::CandidateRejected { candidate, reason: e.to_string() });
            },
        }
    }
}

async fn dial(
    endpoint: &Endpoint,
    client_config: &ClientConfig,
    config: &TransportConfig,
    addr: SocketAddr,
) -> Result<(Connection, SendStream, RecvStream), TransportError> {
    let connecting = endpoint
        .connect_with(client_config.clone(), addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?;

    let connection = tokio::time::timeout(config.connect_timeout, connecting)
        .await
        .map_err(|_| TransportError::Connection(format!("timed out dialing {addr}")))?
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (mut send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| TransportError::Stream(format!("open_bi failed: {e}")))?;
    write_frame(&mut send, CHANNEL_LABEL.as_bytes()).await?;

    Ok((connection, send, recv))
}

/// Carry channel text both ways until the remote side goes away.
async fn run_channel(
    connection: Connection,
    send: SendStream,
    mut recv: RecvStream,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    let _ = events.send(PeerEvent::ChannelOpen);

    let writer = tokio::spawn(write_messages(send, outbound));

    loop {
        match read_frame(&mut recv).await {
            Ok(Some(body)) => match String::from_utf8(body) {
                Ok(text) => {
                    if inbound.send(text).is_err() {
                        break;
                    }
                },
                Err(_) => tracing::debug!("dropping non UTF-8 channel frame"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "channel read ended");
                break;
            },
        }
    }

    writer.abort();
    connection.close(0u32.into(), b"closed");
    let _ = events.send(PeerEvent::ChannelClosed);
}

async fn write_messages(mut send: SendStream, mut outbound: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = write_frame(&mut send, text.as_bytes()).await {
            tracing::debug!(error = %e, "channel write failed");
            return;
        }
    }
    let _ = send.finish();
}

fn parse_candidate(candidate: &IceCandidate) -> Result<SocketAddr, String> {
    candidate
        .blob
        .strip_prefix("udp ")
        .ok_or_else(|| format!("unsupported candidate '{}'", candidate.blob))?
        .parse()
        .map_err(|e| format!("invalid candidate address: {e}"))
}

/// Loopback first, then the address of the default route if any.
fn local_candidates(port: u16) -> Vec<IceCandidate> {
    let mut addrs = vec![SocketAddr::from((Ipv4Addr::LOCALHOST, port))];
    if let Some(ip) = primary_ip().filter(|ip| !ip.is_loopback()) {
        addrs.push(SocketAddr::new(ip, port));
    }
    addrs.into_iter().map(|addr| IceCandidate::new(format!("udp {addr}"))).collect()
}

/// Source address the OS would use for outbound traffic. Sends nothing.
fn primary_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

fn unspecified() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
}

fn local_port(endpoint: &Endpoint) -> Result<u16, TransportError> {
    endpoint
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| TransportError::Connection(format!("failed to get local address: {e}")))
}
