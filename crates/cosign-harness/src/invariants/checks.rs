//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use cosign_proto::Stroke;

use super::{Invariant, InvariantKind, InvariantResult, SystemSnapshot, Violation};

/// The page cursor is always a valid page.
///
/// Holds at every step, even against a peer sending out-of-range pages.
pub struct CursorInBounds;

impl Invariant for CursorInBounds {
    fn kind(&self) -> InvariantKind {
        InvariantKind::CursorInBounds
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for p in &state.participants {
            if p.cursor >= p.page_count {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "participant {}: cursor {} with {} pages",
                        p.id, p.cursor, p.page_count
                    ),
                });
            }
        }
        Ok(())
    }
}

/// What is painted is exactly the history of the current page.
///
/// Page changes replay the page; strokes for other pages are stored but not
/// painted.
pub struct SurfaceMatchesHistory;

impl Invariant for SurfaceMatchesHistory {
    fn kind(&self) -> InvariantKind {
        InvariantKind::SurfaceMatchesHistory
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for p in &state.participants {
            let expected = p.strokes(p.cursor);
            if p.surface != expected {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "participant {}: page {} shows {} strokes, history has {}",
                        p.id,
                        p.cursor,
                        p.surface.len(),
                        expected.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Every draw sent over the channel is in the other side's history.
///
/// Checked at rest, for recipients that are still running. Order across the
/// two senders is not compared: concurrent strokes on one page legitimately
/// interleave differently on each side.
pub struct DrawDelivery;

impl Invariant for DrawDelivery {
    fn kind(&self) -> InvariantKind {
        InvariantKind::DrawDelivery
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if !state.settled {
            return Ok(());
        }

        for sender in &state.participants {
            for receiver in state.live().filter(|r| r.id != sender.id) {
                for page in pages_of(&sender.sent_draws) {
                    let sent: Vec<&Stroke> = sender
                        .sent_draws
                        .iter()
                        .filter(|(p, _)| *p == page)
                        .map(|(_, stroke)| stroke)
                        .collect();

                    if !contains_all(receiver.strokes(page), &sent) {
                        return Err(Violation {
                            invariant: self.kind(),
                            message: format!(
                                "participant {} sent {} strokes on page {}, participant {} has {}",
                                sender.id,
                                sent.len(),
                                page,
                                receiver.id,
                                receiver.strokes(page).len()
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Last write wins on the shared control flag.
///
/// At rest, while both sides are connected, both hold the last value that
/// went over the channel.
pub struct ControlConvergence;

impl Invariant for ControlConvergence {
    fn kind(&self) -> InvariantKind {
        InvariantKind::ControlConvergence
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let Some(expected) = state.last_control_sent else {
            return Ok(());
        };
        if !state.settled || !all_connected(state) {
            return Ok(());
        }

        for p in &state.participants {
            if p.write_access != expected {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "participant {}: write access {}, last sent {}",
                        p.id, p.write_access, expected
                    ),
                });
            }
        }
        Ok(())
    }
}

/// At rest, running participants agree on whether the channel is up.
pub struct ConnectivityAgreement;

impl Invariant for ConnectivityAgreement {
    fn kind(&self) -> InvariantKind {
        InvariantKind::ConnectivityAgreement
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if !state.settled {
            return Ok(());
        }

        let live: Vec<_> = state.live().collect();
        if live.len() < 2 {
            return Ok(());
        }

        let first = live[0];
        for other in &live[1..] {
            if other.connected != first.connected {
                return Err(Violation {
                    invariant: self.kind(),
                    message: format!(
                        "participant {} connected={} ({:?}), participant {} connected={} ({:?})",
                        first.id,
                        first.connected,
                        first.negotiation,
                        other.id,
                        other.connected,
                        other.negotiation
                    ),
                });
            }
        }
        Ok(())
    }
}

fn all_connected(state: &SystemSnapshot) -> bool {
    !state.participants.is_empty() && state.participants.iter().all(|p| p.live && p.connected)
}

fn pages_of(draws: &[(u32, Stroke)]) -> Vec<u32> {
    let mut pages: Vec<u32> = draws.iter().map(|(page, _)| *page).collect();
    pages.sort_unstable();
    pages.dedup();
    pages
}

/// Multiset containment: every stroke in `needles` matched by a distinct
/// stroke in `haystack`.
fn contains_all(haystack: &[Stroke], needles: &[&Stroke]) -> bool {
    let mut unmatched: Vec<&Stroke> = haystack.iter().collect();
    needles.iter().all(|needle| match unmatched.iter().position(|s| s == needle) {
        Some(index) => {
            unmatched.swap_remove(index);
            true
        },
        None => false,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cosign_proto::Point;

    use super::*;
    use crate::invariants::ParticipantSnapshot;

    fn stroke(n: u8) -> Stroke {
        let n = f64::from(n);
        Stroke::new(Point::new(n, n), Point::new(n + 1.0, n), "red", 2.0)
    }

    fn participant(id: usize) -> ParticipantSnapshot {
        ParticipantSnapshot { id, live: true, page_count: 3, ..Default::default() }
    }

    #[test]
    fn cursor_out_of_bounds_detected() {
        let mut p = participant(0);
        p.cursor = 3;
        let state = SystemSnapshot::from_participants(vec![p]);

        let violation = CursorInBounds.check(&state).unwrap_err();
        assert_eq!(violation.invariant, InvariantKind::CursorInBounds);
    }

    #[test]
    fn stale_surface_detected() {
        let mut p = participant(0);
        p.history.insert(0, vec![stroke(1)]);
        let state = SystemSnapshot::from_participants(vec![p.clone()]);
        assert!(SurfaceMatchesHistory.check(&state).is_err());

        p.surface = vec![stroke(1)];
        let state = SystemSnapshot::from_participants(vec![p]);
        assert!(SurfaceMatchesHistory.check(&state).is_ok());
    }

    #[test]
    fn undelivered_draw_detected_only_at_rest() {
        let sender = participant(0).with_sent_draws(vec![(1, stroke(1)), (1, stroke(1))]);
        let mut receiver = participant(1);
        receiver.history.insert(1, vec![stroke(1)]);

        let state = SystemSnapshot::from_participants(vec![sender.clone(), receiver.clone()]);
        assert!(DrawDelivery.check(&state).is_ok());

        // One of two identical strokes is missing.
        let state = state.settled(true);
        assert!(DrawDelivery.check(&state).is_err());

        receiver.history.insert(1, vec![stroke(1), stroke(2), stroke(1)]);
        let state = SystemSnapshot::from_participants(vec![sender, receiver]).settled(true);
        assert!(DrawDelivery.check(&state).is_ok());
    }

    #[test]
    fn exited_receiver_is_not_checked() {
        let sender = participant(0).with_sent_draws(vec![(0, stroke(1))]);
        let receiver = participant(1).with_live(false);
        let state = SystemSnapshot::from_participants(vec![sender, receiver]).settled(true);

        assert!(DrawDelivery.check(&state).is_ok());
    }

    #[test]
    fn control_divergence_detected_while_connected() {
        let mut a = participant(0);
        let mut b = participant(1);
        a.connected = true;
        b.connected = true;
        a.write_access = true;

        let state = SystemSnapshot::from_participants(vec![a.clone(), b.clone()])
            .settled(true)
            .with_last_control(Some(true));
        assert!(ControlConvergence.check(&state).is_err());

        // Nothing sent yet: initial roles differ by design.
        let state = SystemSnapshot::from_participants(vec![a.clone(), b.clone()]).settled(true);
        assert!(ControlConvergence.check(&state).is_ok());

        b.connected = false;
        let state = SystemSnapshot::from_participants(vec![a, b])
            .settled(true)
            .with_last_control(Some(true));
        assert!(ControlConvergence.check(&state).is_ok());
    }

    #[test]
    fn half_open_session_detected() {
        let mut a = participant(0);
        a.connected = true;
        let state = SystemSnapshot::from_participants(vec![a, participant(1)]).settled(true);

        assert!(ConnectivityAgreement.check(&state).is_err());
    }
}
