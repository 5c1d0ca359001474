//! Application side-effects and intents.
//!
//! [`AppAction`]s are produced by the [`crate::App`] state machine for the
//! runtime to execute.

use cosign_proto::SyncMessage;

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Send a message to the peer. Dropped by the bridge while the channel
    /// is not ready.
    Broadcast(SyncMessage),

    /// Place text on the system clipboard.
    CopyToClipboard(String),
}
