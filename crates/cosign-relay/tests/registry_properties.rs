//! Property tests for the session registry under random churn.
//!
//! A seeded RNG drives connects, joins, leaves and disconnects across a small
//! pool of peers and sessions. After every step:
//! - No session holds more than two peers
//! - No session exists without members
//! - Peer → session and session → members agree
//! - Peer and session counts match the tracked model

use std::collections::{HashMap, HashSet};

use cosign_proto::{PeerId, Rejection, SessionId};
use cosign_relay::{MAX_PEERS_PER_SESSION, SessionRegistry};
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const PEERS: u64 = 6;
const SESSIONS: usize = 3;

fn session(index: usize) -> SessionId {
    SessionId::new(format!("session-{index}")).unwrap()
}

fn check_consistency(registry: &SessionRegistry, model: &HashMap<PeerId, Option<usize>>) {
    assert_eq!(registry.peer_count(), model.len());

    let live: HashSet<usize> = model.values().filter_map(|s| *s).collect();
    assert_eq!(registry.session_count(), live.len());

    for index in 0..SESSIONS {
        let id = session(index);
        let members = registry.members(&id);
        assert!(members.len() <= MAX_PEERS_PER_SESSION);
        assert_eq!(registry.contains_session(&id), !members.is_empty());

        for member in members {
            assert_eq!(registry.session_of(*member), Some(&id));
        }
    }

    for (peer, joined) in model {
        assert!(registry.contains_peer(*peer));
        assert_eq!(registry.session_of(*peer), joined.map(session).as_ref());
    }
}

#[test]
fn registry_stays_consistent_under_churn() {
    proptest!(|(seed in any::<u64>(), steps in 10usize..200)| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut registry = SessionRegistry::new();
        let mut model: HashMap<PeerId, Option<usize>> = HashMap::new();

        for _ in 0..steps {
            let peer = PeerId::new(rng.gen_range(1..=PEERS));

            match rng.gen_range(0..4) {
                0 => {
                    let fresh = !model.contains_key(&peer);
                    prop_assert_eq!(registry.register_peer(peer), fresh);
                    model.entry(peer).or_insert(None);
                },
                1 => {
                    let index = rng.gen_range(0..SESSIONS);
                    let id = session(index);
                    let before = registry.members(&id).to_vec();

                    match registry.join(peer, &id) {
                        Ok(present) => {
                            prop_assert_eq!(present, before);
                            model.insert(peer, Some(index));
                        },
                        Err(rejection) => {
                            let expected = match model.get(&peer) {
                                None => Rejection::NOT_JOINED,
                                Some(Some(_)) => Rejection::ALREADY_JOINED,
                                Some(None) => Rejection::SESSION_FULL,
                            };
                            prop_assert_eq!(rejection.code, expected);
                        },
                    }
                },
                2 => {
                    let left = registry.leave(peer);
                    let was_in = model.get(&peer).copied().flatten();
                    prop_assert_eq!(left.map(|(id, _)| id), was_in.map(session));
                    if let Some(joined) = model.get_mut(&peer) {
                        *joined = None;
                    }
                },
                _ => {
                    let removed = registry.unregister_peer(peer);
                    let was = model.remove(&peer);
                    prop_assert_eq!(removed.is_some(), was.is_some());

                    if let Some(Some((id, remaining))) = removed {
                        prop_assert!(!remaining.contains(&peer));
                        prop_assert_eq!(registry.members(&id), remaining.as_slice());
                    }
                },
            }

            check_consistency(&registry, &model);
        }
    });
}

#[test]
fn session_ids_are_reusable_after_everyone_leaves() {
    let mut registry = SessionRegistry::new();
    let id = session(0);

    for round in 0..3u64 {
        let a = PeerId::new(round * 2 + 1);
        let b = PeerId::new(round * 2 + 2);
        assert!(registry.register_peer(a));
        assert!(registry.register_peer(b));

        assert!(registry.join(a, &id).unwrap().is_empty());
        assert_eq!(registry.join(b, &id).unwrap(), vec![a]);
        assert!(registry.same_session(a, b));

        registry.unregister_peer(a);
        registry.unregister_peer(b);
        assert!(!registry.contains_session(&id));
    }
}
