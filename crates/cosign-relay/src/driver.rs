//! Relay driver.
//!
//! Applies the rendezvous rules to connection events: session admission,
//! envelope forwarding between the two members of a session, and departure
//! notices. Pure logic; the runtime owns the sockets and executes the returned
//! [`RelayAction`]s.

use std::collections::HashSet;

use cosign_core::env::Environment;
use cosign_proto::{PeerId, Rejection, RelayNotice, RelayRequest, SessionId, SignalingEnvelope};

use crate::{error::DriverError, registry::SessionRegistry};

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum live sessions
    pub max_sessions: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, max_sessions: 5_000 }
    }
}

/// Events that the relay driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Id assigned via [`RelayDriver::allocate_peer_id`]
        peer_id: PeerId,
    },

    /// A request was decoded from a connection
    RequestReceived {
        /// Connection that sent the request
        peer_id: PeerId,
        /// The request
        request: RelayRequest,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        peer_id: PeerId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the relay driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send a notice to one connection
    Send {
        /// Target connection
        peer_id: PeerId,
        /// Notice to deliver
        notice: RelayNotice,
    },

    /// Close a connection
    Close {
        /// Connection to close
        peer_id: PeerId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for relay actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
}

/// Action-based relay driver.
///
/// # Invariants
///
/// - A session never holds more than two members.
/// - Forwarded envelopes carry the sender id the relay assigned, never the one
///   the client claimed.
/// - Envelopes only cross between members of the same session.
pub struct RelayDriver<E: Environment> {
    /// Accepted connections
    connections: HashSet<PeerId>,
    /// Session membership
    registry: SessionRegistry,
    /// Environment (RNG for peer ids)
    env: E,
    /// Relay configuration
    config: RelayConfig,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a new relay driver.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self { connections: HashSet::new(), registry: SessionRegistry::new(), env, config }
    }

    /// Fresh peer id not held by any live connection.
    pub fn allocate_peer_id(&self) -> PeerId {
        loop {
            let candidate = self.env.random_peer_id();
            if !self.connections.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Process a relay event and return actions to execute.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, DriverError> {
        match event {
            RelayEvent::ConnectionAccepted { peer_id } => self.handle_connection_accepted(peer_id),
            RelayEvent::RequestReceived { peer_id, request } => {
                if !self.connections.contains(&peer_id) {
                    return Err(DriverError::PeerNotFound(peer_id));
                }
                Ok(self.handle_request(peer_id, request))
            },
            RelayEvent::ConnectionClosed { peer_id, reason } => {
                Ok(self.handle_connection_closed(peer_id, &reason))
            },
        }
    }

    /// Session a connection has joined.
    pub fn session_of(&self, peer_id: PeerId) -> Option<&SessionId> {
        self.registry.session_of(peer_id)
    }

    /// Members of a session, in join order.
    pub fn members(&self, session_id: &SessionId) -> &[PeerId] {
        self.registry.members(session_id)
    }

    /// Number of accepted connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    fn handle_connection_accepted(
        &mut self,
        peer_id: PeerId,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if self.connections.len() >= self.config.max_connections {
            return Ok(vec![RelayAction::Close {
                peer_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if !self.connections.insert(peer_id) || !self.registry.register_peer(peer_id) {
            return Err(DriverError::PeerAlreadyExists(peer_id));
        }

        Ok(vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {peer_id} accepted"),
        }])
    }

    fn handle_request(&mut self, peer_id: PeerId, request: RelayRequest) -> Vec<RelayAction> {
        match request {
            RelayRequest::Join { session_id } => self.handle_join(peer_id, &session_id),
            RelayRequest::Signal(envelope) => self.handle_signal(peer_id, envelope),
            RelayRequest::Leave => match self.registry.leave(peer_id) {
                Some((session_id, remaining)) => departure(peer_id, &session_id, &remaining),
                None => vec![reject(peer_id, Rejection::not_joined())],
            },
        }
    }

    fn handle_join(&mut self, peer_id: PeerId, session_id: &SessionId) -> Vec<RelayAction> {
        let is_new = !self.registry.contains_session(session_id);
        if is_new
            && self.registry.session_of(peer_id).is_none()
            && self.registry.session_count() >= self.config.max_sessions
        {
            return vec![reject(peer_id, Rejection::capacity())];
        }

        let present = match self.registry.join(peer_id, session_id) {
            Ok(present) => present,
            Err(rejection) => {
                return vec![reject(peer_id, rejection.clone()), RelayAction::Log {
                    level: LogLevel::Debug,
                    message: format!("join of {session_id} by {peer_id} refused: {}", rejection.reason),
                }];
            },
        };

        let mut actions = Vec::with_capacity(present.len() + 2);
        actions.push(RelayAction::Send {
            peer_id,
            notice: RelayNotice::Joined {
                peer_id,
                session_id: session_id.clone(),
                peers: present.clone(),
            },
        });
        actions.extend(present.iter().map(|&member| RelayAction::Send {
            peer_id: member,
            notice: RelayNotice::PeerJoined { peer_id },
        }));
        actions.push(RelayAction::Log {
            level: LogLevel::Info,
            message: format!("{peer_id} joined {session_id} ({} present)", present.len()),
        });
        actions
    }

    fn handle_signal(&self, peer_id: PeerId, envelope: SignalingEnvelope) -> Vec<RelayAction> {
        if self.registry.session_of(peer_id).is_none() {
            return vec![reject(peer_id, Rejection::not_joined())];
        }

        let target_id = envelope.target_id;
        if !self.registry.same_session(peer_id, target_id) {
            return vec![reject(peer_id, Rejection::peer_not_found(target_id))];
        }

        vec![RelayAction::Send {
            peer_id: target_id,
            notice: RelayNotice::Signal(SignalingEnvelope { sender_id: peer_id, ..envelope }),
        }]
    }

    fn handle_connection_closed(&mut self, peer_id: PeerId, reason: &str) -> Vec<RelayAction> {
        self.connections.remove(&peer_id);

        let mut actions = match self.registry.unregister_peer(peer_id) {
            Some(Some((session_id, remaining))) => departure(peer_id, &session_id, &remaining),
            Some(None) | None => Vec::new(),
        };
        actions.push(RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {peer_id} closed: {reason}"),
        });
        actions
    }
}

fn reject(peer_id: PeerId, rejection: Rejection) -> RelayAction {
    RelayAction::Send { peer_id, notice: RelayNotice::Rejected(rejection) }
}

fn departure(peer_id: PeerId, session_id: &SessionId, remaining: &[PeerId]) -> Vec<RelayAction> {
    let mut actions: Vec<RelayAction> = remaining
        .iter()
        .map(|&member| RelayAction::Send {
            peer_id: member,
            notice: RelayNotice::PeerLeft { peer_id },
        })
        .collect();
    actions.push(RelayAction::Log {
        level: LogLevel::Info,
        message: format!("{peer_id} left {session_id}"),
    });
    actions
}
