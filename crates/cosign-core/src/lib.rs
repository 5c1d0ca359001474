//! Core session state for cosign.
//!
//! Pure state machines with no I/O. Callers feed local input and decoded
//! remote messages in, and execute the returned [`DocumentAction`]s.
//!
//! # Components
//!
//! - [`env::Environment`]: time and randomness, swappable for simulation
//! - [`AnnotationHistory`]: per-page append-only stroke log with replay
//! - [`DocumentState`]: page cursor, write-access flag and input gating
//! - `SystemEnv` (feature `system`): real time and OS randomness for the
//!   relay and the terminal client

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod annotation;
mod document;
pub mod env;
mod error;
#[cfg(feature = "system")]
mod system_env;

pub use annotation::{AnnotationHistory, Canvas};
pub use document::{DocumentAction, DocumentConfig, DocumentState, Origin};
pub use error::DocumentError;
#[cfg(feature = "system")]
pub use system_env::SystemEnv;
