//! Application layer for cosign
//!
//! Pure state machines and a generic runtime for the document viewer and
//! session orchestration, so the same code runs in the terminal client and
//! in deterministic simulation.
//!
//! # Components
//!
//! - [`App`]: view model (document state, painted surface, input gating)
//! - [`Bridge`]: negotiation and sync codec behind the App
//! - [`Driver`]: trait for platform-specific I/O
//! - [`Runtime`]: the single session actor, generic over Driver
//! - [`Invite`]: shareable `cosign://` session reference

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod app;
mod bridge;
mod driver;
mod event;
mod input;
mod invite;
mod runtime;
mod state;

pub use action::AppAction;
pub use app::App;
pub use bridge::Bridge;
pub use driver::{Driver, DriverEvent};
pub use event::AppEvent;
pub use input::{KeyInput, PointerInput};
pub use invite::{Invite, InviteError};
pub use runtime::Runtime;
pub use state::{ConnectionState, ParticipantRole};
