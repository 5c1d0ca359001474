//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). The relay
//! and the terminal client use real time and OS entropy; the simulation
//! harness substitutes a virtual clock and a seeded RNG so a failing run can be
//! replayed from its seed.

use std::time::Duration;

use cosign_proto::{PeerId, SessionId};

/// Time and randomness provider.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type. `std::time::Instant` in production, virtual in simulation.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for `duration`. Only drivers call this, never state machines.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Random `u128`.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }

    /// Fresh non-zero peer id for a relay connection.
    fn random_peer_id(&self) -> PeerId {
        loop {
            let raw = self.random_u64();
            if raw != 0 {
                return PeerId::new(raw);
            }
        }
    }

    /// Fresh session identifier for a new collaboration.
    fn random_session_id(&self) -> SessionId {
        SessionId::from_random(self.random_u128())
    }
}
