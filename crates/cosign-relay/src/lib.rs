//! Cosign rendezvous relay.
//!
//! Lets two clients that only share a session id find each other and exchange
//! the offer, answer, and candidates needed to open a direct channel. The
//! relay never sees annotation traffic.
//!
//! # Architecture
//!
//! [`RelayDriver`] is the action-based core (pure logic, no I/O): it owns
//! session membership and decides which notices go where. [`Server`] executes
//! those actions using Quinn QUIC and the Tokio runtime.
//!
//! # Components
//!
//! - [`RelayDriver`]: admission, forwarding, and departure rules
//! - [`SessionRegistry`]: peer ↔ session bookkeeping
//! - [`Server`]: production runtime that executes driver actions
//! - [`QuinnTransport`]: QUIC transport via Quinn
//! - [`SystemEnv`]: production environment (real time, OS randomness)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod registry;
mod transport;

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use cosign_proto::{PeerId, RelayNotice, RelayRequest};
pub use driver::{LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};
pub use error::{DriverError, RelayError};
pub use registry::{MAX_PEERS_PER_SESSION, SessionRegistry};
pub use cosign_core::SystemEnv;
use tokio::sync::{Mutex, RwLock};
pub use transport::{QuinnConnection, QuinnTransport};

use crate::transport::{read_frame, write_frame};

type SharedDriver = Arc<Mutex<RelayDriver<SystemEnv>>>;

/// Shared state for all connections.
struct SharedState {
    /// Peer ID → QUIC connection (for closing)
    connections: RwLock<HashMap<PeerId, QuinnConnection>>,
    /// Peer ID → send half of the client's stream. All notices to a client go
    /// through it, so they arrive in the order the driver produced them.
    outbound_streams: RwLock<HashMap<PeerId, Mutex<quinn::SendStream>>>,
}

/// Relay configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct RelayRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Driver configuration (limits)
    pub relay: RelayConfig,
}

impl Default for RelayRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            relay: RelayConfig::default(),
        }
    }
}

/// Production relay.
///
/// Wraps [`RelayDriver`] with Quinn QUIC transport and the system environment.
pub struct Server {
    /// The action-based relay driver
    driver: RelayDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
}

impl Server {
    /// Create and bind a new relay.
    pub fn bind(config: RelayRuntimeConfig) -> Result<Self, RelayError> {
        let driver = RelayDriver::new(SystemEnv::new(), config.relay);
        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        Ok(Self { driver, transport })
    }

    /// Run the relay, accepting connections until the endpoint closes.
    pub async fn run(self) -> Result<(), RelayError> {
        tracing::info!("Relay starting on {}", self.transport.local_addr()?);

        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        loop {
            match self.transport.accept().await {
                Ok(Some(conn)) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);

                    tokio::spawn(async move {
                        let remote = conn.remote_addr();
                        if let Err(e) = handle_connection(conn, driver, shared).await {
                            tracing::debug!(%remote, "Connection error: {}", e);
                        }
                    });
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                },
            }
        }

        tracing::info!("Relay stopped");
        Ok(())
    }

    /// Local address the relay is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.transport.local_addr()
    }
}

/// Handle a single client connection.
async fn handle_connection(
    conn: QuinnConnection,
    driver: SharedDriver,
    shared: Arc<SharedState>,
) -> Result<(), RelayError> {
    let (send, mut recv) = conn.accept_bi().await?;
    let peer_id = driver.lock().await.allocate_peer_id();

    tracing::debug!(%peer_id, remote = %conn.remote_addr(), "New connection");

    shared.connections.write().await.insert(peer_id, conn.clone());
    shared.outbound_streams.write().await.insert(peer_id, Mutex::new(send));

    dispatch(&driver, &shared, RelayEvent::ConnectionAccepted { peer_id }).await?;

    let reason = loop {
        let body = match read_frame(&mut recv).await {
            Ok(Some(body)) => body,
            Ok(None) => break "stream finished".to_string(),
            Err(e) => break e.to_string(),
        };

        let request = match RelayRequest::decode(&body) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%peer_id, "Request decode error: {}", e);
                conn.close(1u32.into(), b"malformed request");
                break e.to_string();
            },
        };

        if let Err(e) = dispatch(&driver, &shared, RelayEvent::RequestReceived { peer_id, request }).await
        {
            tracing::warn!(%peer_id, "Request processing error: {}", e);
        }
    };

    shared.connections.write().await.remove(&peer_id);
    shared.outbound_streams.write().await.remove(&peer_id);

    dispatch(&driver, &shared, RelayEvent::ConnectionClosed { peer_id, reason }).await
}

/// Process one event and execute its actions under the driver lock, so
/// notices leave in the order the driver decided them.
async fn dispatch(
    driver: &SharedDriver,
    shared: &SharedState,
    event: RelayEvent,
) -> Result<(), RelayError> {
    let mut driver = driver.lock().await;
    let actions = driver.process_event(event)?;
    execute_actions(actions, shared).await;
    Ok(())
}

/// Execute relay actions.
async fn execute_actions(actions: Vec<RelayAction>, shared: &SharedState) {
    for action in actions {
        match action {
            RelayAction::Send { peer_id, notice } => send_notice(shared, peer_id, &notice).await,

            RelayAction::Close { peer_id, reason } => {
                tracing::info!("Closing connection {}: {}", peer_id, reason);
                if let Some(conn) = shared.connections.write().await.remove(&peer_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
            },
        }
    }
}

async fn send_notice(shared: &SharedState, peer_id: PeerId, notice: &RelayNotice) {
    let mut body = Vec::new();
    if let Err(e) = notice.encode(&mut body) {
        tracing::error!("Failed to encode notice for {}: {}", peer_id, e);
        return;
    }

    let streams = shared.outbound_streams.read().await;
    let Some(stream) = streams.get(&peer_id) else {
        tracing::debug!("Send: peer {} not connected", peer_id);
        return;
    };

    if let Err(e) = write_frame(&mut *stream.lock().await, &body).await {
        tracing::warn!("Send to {} failed: {}", peer_id, e);
    }
}
