//! Terminal UI for cosign
//!
//! A thin shell over [`cosign_app::Driver`] that provides terminal-specific
//! I/O. All orchestration logic lives in the generic [`cosign_app::Runtime`].
//!
//! This crate only handles terminal input, rendering and wiring the QUIC
//! transport into the driver.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod terminal;
pub mod ui;

pub use cosign_app::{App, AppAction, AppEvent, Driver, KeyInput, Runtime};
pub use terminal::{TerminalDriver, TerminalError};
