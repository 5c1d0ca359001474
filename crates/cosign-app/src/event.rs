//! Application input events.
//!
//! [`AppEvent`]s drive the [`crate::App`] state machine. They come from two
//! sources:
//! - User interaction (keys, pointer, resize) and system ticks.
//! - Session notifications translated by the [`crate::Bridge`].

use cosign_client::NegotiationState;
use cosign_proto::SyncMessage;

use crate::{KeyInput, PointerInput};

/// Events processed by the App state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Keyboard input.
    Key(KeyInput),

    /// Pointer input over the document surface.
    Pointer(PointerInput),

    /// Periodic tick.
    Tick,

    /// Terminal resize (columns, rows).
    Resize(u16, u16),

    /// Negotiation moved to a new state.
    Negotiation(NegotiationState),

    /// Direct channel became usable (`true`) or was lost (`false`).
    Connectivity(bool),

    /// The other party ended the session; a fresh negotiation is waiting
    /// for it to come back.
    SessionRestarted,

    /// Message decoded from the peer channel.
    Remote(SyncMessage),

    /// Error occurred.
    Error {
        /// Error description.
        message: String,
    },
}
