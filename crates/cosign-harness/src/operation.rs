//! Operations for simulation testing.
//!
//! Operations are what a user (or the network) can do to a running session.
//! They are generated randomly by proptest, or from raw bytes via
//! [`arbitrary`], and applied to a [`crate::SimWorld`].

use arbitrary::Arbitrary;

use crate::sim_peer::Endpoint;

/// Which side of the session acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Participant {
    /// Started the session; may grant and revoke write access
    Controller,
    /// Joined through an invite
    Guest,
}

impl Participant {
    /// Both participants, controller first.
    pub const ALL: [Self; 2] = [Self::Controller, Self::Guest];

    /// Index in the world.
    pub fn endpoint(self) -> Endpoint {
        match self {
            Self::Controller => 0,
            Self::Guest => 1,
        }
    }
}

/// Operations that can be applied to a world.
///
/// Kept small (coordinates and pages are bytes) so proptest can explore
/// interesting combinations.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum SimOperation {
    /// Pointer gesture: press, drag through each point, release.
    Stroke {
        /// Who draws
        participant: Participant,
        /// Gesture path in document units
        path: Vec<(u8, u8)>,
    },

    /// Jump to a page with the digit keys (1-based key, 0-based page).
    GoToPage {
        /// Who navigates
        participant: Participant,
        /// Target page
        page: u8,
    },

    /// Next page.
    NextPage {
        /// Who navigates
        participant: Participant,
    },

    /// Previous page.
    PreviousPage {
        /// Who navigates
        participant: Participant,
    },

    /// Press the control toggle key.
    ToggleControl {
        /// Who presses it (refused for the guest)
        participant: Participant,
    },

    /// Deliver one pending event (or process one input).
    Step,

    /// Deliver everything pending.
    Settle,

    /// Advance virtual time and tick both participants.
    AdvanceTime {
        /// Milliseconds to advance
        millis: u16,
    },
}
