//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::BTreeMap;

use cosign_app::{App, ConnectionState};
use cosign_client::NegotiationState;
use cosign_proto::Stroke;

/// Snapshot of a whole session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemSnapshot {
    /// Per-participant state, controller first.
    pub participants: Vec<ParticipantSnapshot>,
    /// Nothing in flight and no unprocessed input.
    pub settled: bool,
    /// Last control value that went over the channel.
    pub last_control_sent: Option<bool>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no participants).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot from participants.
    pub fn from_participants(participants: Vec<ParticipantSnapshot>) -> Self {
        Self { participants, ..Self::default() }
    }

    /// Mark the snapshot as taken at rest.
    #[must_use]
    pub fn settled(mut self, settled: bool) -> Self {
        self.settled = settled;
        self
    }

    /// Record the last control value sent.
    #[must_use]
    pub fn with_last_control(mut self, enabled: Option<bool>) -> Self {
        self.last_control_sent = enabled;
        self
    }

    /// Participants whose runtime is still running.
    pub fn live(&self) -> impl Iterator<Item = &ParticipantSnapshot> {
        self.participants.iter().filter(|p| p.live)
    }
}

/// Snapshot of one participant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantSnapshot {
    /// Participant index.
    pub id: usize,
    /// Runtime still running (has not quit).
    pub live: bool,
    /// Current page.
    pub cursor: u32,
    /// Number of pages.
    pub page_count: u32,
    /// Local stroke input accepted.
    pub write_access: bool,
    /// Negotiation state reported to the App.
    pub negotiation: Option<NegotiationState>,
    /// App shows a live channel.
    pub connected: bool,
    /// Stroke history per page, in append order.
    pub history: BTreeMap<u32, Vec<Stroke>>,
    /// Strokes currently painted.
    pub surface: Vec<Stroke>,
    /// Draws this participant sent over the channel.
    pub sent_draws: Vec<(u32, Stroke)>,
}

impl ParticipantSnapshot {
    /// Capture what `app` shows.
    pub fn from_app(id: usize, app: &App) -> Self {
        let document = app.document();
        let history = document
            .history()
            .pages()
            .map(|page| (page, document.history().strokes(page).to_vec()))
            .collect();

        Self {
            id,
            live: true,
            cursor: document.cursor(),
            page_count: document.page_count(),
            write_access: document.write_access(),
            negotiation: Some(app.negotiation_state()),
            connected: app.connection_state() == ConnectionState::Connected,
            history,
            surface: app.surface().to_vec(),
            sent_draws: Vec::new(),
        }
    }

    /// Set whether the runtime is still running.
    #[must_use]
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Set the draws sent over the channel.
    #[must_use]
    pub fn with_sent_draws(mut self, sent: Vec<(u32, Stroke)>) -> Self {
        self.sent_draws = sent;
        self
    }

    /// Strokes on `page` (empty if none).
    pub fn strokes(&self, page: u32) -> &[Stroke] {
        self.history.get(&page).map_or(&[][..], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        let snapshot = SystemSnapshot::empty();
        assert!(snapshot.participants.is_empty());
        assert!(!snapshot.settled);
    }

    #[test]
    fn live_filters_exited_participants() {
        let snapshot = SystemSnapshot::from_participants(vec![
            ParticipantSnapshot { id: 0, ..Default::default() }.with_live(true),
            ParticipantSnapshot { id: 1, ..Default::default() }.with_live(false),
        ]);

        assert_eq!(snapshot.live().map(|p| p.id).collect::<Vec<_>>(), vec![0]);
    }
}
