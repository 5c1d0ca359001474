//! Deterministic simulation harness for cosign sessions.
//!
//! In-memory implementations of the relay connection, the negotiation
//! object, and the direct channel, with virtual time and a seeded scheduler.
//! A [`SimWorld`] runs the real [`cosign_app::Runtime`] for a controller and
//! a guest against them, so whole sessions replay exactly from a seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the session
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod operation;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_peer;
pub mod sim_relay;
pub mod world;

pub use invariants::{
    ConnectivityAgreement, ControlConvergence, CursorInBounds, DrawDelivery, Invariant,
    InvariantKind, InvariantRegistry, InvariantResult, ParticipantSnapshot, SurfaceMatchesHistory,
    SystemSnapshot, Violation,
};
pub use operation::{Participant, SimOperation};
pub use sim_driver::{InFlight, SharedNetwork, SimDriver, SimDriverError, SimNetwork};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_peer::{Endpoint, SimPeerNetwork};
pub use sim_relay::{RelayOutput, SimRelay};
pub use world::{SIM_RELAY_ADDR, SimWorld, WorldConfig};
