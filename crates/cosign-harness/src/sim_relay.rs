//! In-memory relay for simulation.
//!
//! `SimRelay` wraps the production [`RelayDriver`] and executes its actions
//! against queues instead of QUIC streams, so the same admission and
//! forwarding rules run in simulation.

use cosign_proto::{PeerId, RelayNotice, RelayRequest};
use cosign_relay::{DriverError, LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent};

use crate::SimEnv;

/// What the relay did to one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutput {
    /// A notice to deliver.
    Notice(RelayNotice),
    /// The relay closed the connection.
    Closed,
}

/// Simulated relay.
pub struct SimRelay {
    driver: RelayDriver<SimEnv>,
    outbox: Vec<(PeerId, RelayOutput)>,
}

impl SimRelay {
    /// Relay using `env` for peer id allocation.
    pub fn new(env: SimEnv, config: RelayConfig) -> Self {
        Self { driver: RelayDriver::new(env, config), outbox: Vec::new() }
    }

    /// Accept a new connection and return its id.
    pub fn connect(&mut self) -> Result<PeerId, DriverError> {
        let peer_id = self.driver.allocate_peer_id();
        let actions = self.driver.process_event(RelayEvent::ConnectionAccepted { peer_id })?;
        self.execute(actions);
        Ok(peer_id)
    }

    /// Deliver a request from `peer_id`.
    pub fn request(&mut self, peer_id: PeerId, request: RelayRequest) -> Result<(), DriverError> {
        let actions = self.driver.process_event(RelayEvent::RequestReceived { peer_id, request })?;
        self.execute(actions);
        Ok(())
    }

    /// The connection of `peer_id` dropped.
    pub fn disconnect(&mut self, peer_id: PeerId, reason: &str) -> Result<(), DriverError> {
        let actions = self
            .driver
            .process_event(RelayEvent::ConnectionClosed { peer_id, reason: reason.to_string() })?;
        self.execute(actions);
        Ok(())
    }

    /// Take everything the relay produced since the last call, in order.
    pub fn take_outputs(&mut self) -> Vec<(PeerId, RelayOutput)> {
        std::mem::take(&mut self.outbox)
    }

    /// The wrapped driver, for inspection.
    pub fn driver(&self) -> &RelayDriver<SimEnv> {
        &self.driver
    }

    fn execute(&mut self, actions: Vec<RelayAction>) {
        for action in actions {
            match action {
                RelayAction::Send { peer_id, notice } => {
                    self.outbox.push((peer_id, RelayOutput::Notice(notice)));
                },
                RelayAction::Close { peer_id, reason } => {
                    self.outbox.push((peer_id, RelayOutput::Closed));
                    // A closed connection reports itself, as the server loop does.
                    if let Ok(more) = self
                        .driver
                        .process_event(RelayEvent::ConnectionClosed { peer_id, reason })
                    {
                        self.execute(more);
                    }
                },
                RelayAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{message}"),
                    LogLevel::Info => tracing::info!("{message}"),
                    LogLevel::Warn => tracing::warn!("{message}"),
                },
            }
        }
    }
}
