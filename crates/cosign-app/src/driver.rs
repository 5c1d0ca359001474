//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the application runtime from specific I/O
//! implementations. Each frontend implements it to provide terminal, relay,
//! and peer I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use cosign_client::{PeerCommand, PeerEvent};
use cosign_proto::{RelayNotice, RelayRequest};

use crate::{App, AppEvent};

/// One input delivered to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// User or terminal input.
    App(AppEvent),
    /// Notice from the relay.
    Relay(RelayNotice),
    /// Relay connection lost.
    RelayClosed,
    /// Event from the negotiation object.
    Peer(PeerEvent),
    /// Text received on the direct channel.
    Channel(String),
}

/// Abstracts I/O operations for the application runtime.
///
/// Implementations own the relay connection and the negotiation object; the
/// runtime only sees them through this trait, so nothing is ambient.
///
/// # Implementations
///
/// - **TUI**: crossterm for terminal events, quinn for relay and peer QUIC
/// - **Simulation**: in-memory relay and peer network with virtual time
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Wait briefly for the next input.
    ///
    /// Returns `None` when nothing arrived within one tick interval.
    fn poll_event(&mut self)
    -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Connect to the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay cannot be reached.
    fn connect_relay(&mut self, addr: &str)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a request to the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay connection is gone.
    fn send_relay(
        &mut self,
        request: RelayRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Hand a command to the negotiation object. Its outcome arrives later
    /// as [`DriverEvent::Peer`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be issued at all.
    fn execute_peer(&mut self, command: PeerCommand) -> Result<(), Self::Error>;

    /// Send text on the direct channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is gone.
    fn send_channel(&mut self, text: String) -> Result<(), Self::Error>;

    /// Place text on the clipboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses.
    fn copy_to_clipboard(&mut self, text: &str) -> Result<(), Self::Error>;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, app: &App) -> Result<(), Self::Error>;

    /// Close connections and clean up resources.
    fn stop(&mut self);
}
