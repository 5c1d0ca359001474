//! End-to-end session scenarios in the simulated world.
//!
//! Each test drives the real runtime for a controller and a guest through
//! the simulated relay and negotiation objects, then checks what each side
//! ends up showing.

use cosign_app::{AppEvent, ConnectionState, KeyInput};
use cosign_client::NegotiationState;
use cosign_harness::{InvariantRegistry, Participant, SimOperation, SimWorld, WorldConfig};

use Participant::{Controller, Guest};

async fn connected_world(seed: u64) -> SimWorld {
    let mut world = SimWorld::new(seed, WorldConfig::default());
    world.connect().await.unwrap();
    world
}

async fn stroke(world: &mut SimWorld, participant: Participant, path: &[(u8, u8)]) {
    world
        .apply(&SimOperation::Stroke { participant, path: path.to_vec() })
        .await
        .unwrap();
    world.settle().await.unwrap();
}

async fn press(world: &mut SimWorld, participant: Participant, key: KeyInput) {
    world.inject(participant, AppEvent::Key(key));
    world.settle().await.unwrap();
}

fn strokes_on(world: &SimWorld, participant: Participant, page: u32) -> usize {
    world.app(participant).document().history().strokes(page).len()
}

#[tokio::test]
async fn both_sides_connect() {
    let world = connected_world(1).await;

    for participant in Participant::ALL {
        let app = world.app(participant);
        assert_eq!(app.negotiation_state(), NegotiationState::Connected, "{participant:?}");
        assert_eq!(app.connection_state(), ConnectionState::Connected, "{participant:?}");
    }
    assert_eq!(world.relay_session_count(), 1);
    assert!(world.is_settled());
    InvariantRegistry::standard().assert_all(&world.snapshot(), "after connect");
}

#[tokio::test]
async fn controller_strokes_reach_the_guest() {
    let mut world = connected_world(2).await;

    stroke(&mut world, Controller, &[(10, 10), (20, 20), (30, 10)]).await;

    assert_eq!(strokes_on(&world, Controller, 0), 2);
    assert_eq!(strokes_on(&world, Guest, 0), 2);
    assert_eq!(
        world.app(Guest).document().history().strokes(0),
        world.app(Controller).document().history().strokes(0)
    );
    assert_eq!(world.app(Guest).surface().len(), 2);
}

#[tokio::test]
async fn guest_draws_only_after_grant() {
    let mut world = connected_world(3).await;

    stroke(&mut world, Guest, &[(1, 1), (2, 2)]).await;
    assert_eq!(strokes_on(&world, Guest, 0), 0);
    assert_eq!(strokes_on(&world, Controller, 0), 0);

    // First press revokes (the flag starts enabled for the controller),
    // the second grants both sides.
    press(&mut world, Controller, KeyInput::Char('c')).await;
    assert!(!world.app(Guest).document().write_access());
    press(&mut world, Controller, KeyInput::Char('c')).await;
    assert!(world.app(Guest).document().write_access());
    assert!(world.app(Controller).document().write_access());

    stroke(&mut world, Guest, &[(1, 1), (2, 2)]).await;
    assert_eq!(strokes_on(&world, Guest, 0), 1);
    assert_eq!(strokes_on(&world, Controller, 0), 1);
}

#[tokio::test]
async fn guest_cannot_change_control() {
    let mut world = connected_world(4).await;

    press(&mut world, Guest, KeyInput::Char('c')).await;

    assert!(!world.app(Guest).document().write_access());
    assert!(world.app(Controller).document().write_access());
    assert!(world.app(Guest).status_message().is_some_and(|m| m.contains("controller")));
}

#[tokio::test]
async fn pages_follow_the_controller() {
    let mut world = connected_world(5).await;

    press(&mut world, Controller, KeyInput::Right).await;
    press(&mut world, Controller, KeyInput::Right).await;
    assert_eq!(world.app(Guest).document().cursor(), 2);

    press(&mut world, Controller, KeyInput::Char('5')).await;
    assert_eq!(world.app(Guest).document().cursor(), 4);

    // Past the last page: nothing moves anywhere.
    press(&mut world, Controller, KeyInput::Right).await;
    assert_eq!(world.app(Controller).document().cursor(), 4);
    assert_eq!(world.app(Guest).document().cursor(), 4);
}

#[tokio::test]
async fn returning_to_a_page_replays_it() {
    let mut world = connected_world(6).await;

    stroke(&mut world, Controller, &[(5, 5), (6, 6), (7, 7)]).await;
    press(&mut world, Controller, KeyInput::Right).await;

    assert_eq!(world.app(Guest).document().cursor(), 1);
    assert!(world.app(Guest).surface().is_empty());

    press(&mut world, Controller, KeyInput::Left).await;
    assert_eq!(world.app(Guest).surface(), world.app(Guest).document().history().strokes(0));
    assert_eq!(world.app(Guest).surface().len(), 2);
}

#[tokio::test]
async fn reordered_candidates_still_connect() {
    let config =
        WorldConfig { reorder_candidates: true, candidates_per_description: 3, ..Default::default() };

    for seed in 0..32 {
        let mut world = SimWorld::new(seed, config.clone());
        world.connect().await.unwrap();

        for participant in Participant::ALL {
            assert_eq!(
                world.app(participant).connection_state(),
                ConnectionState::Connected,
                "seed {seed}, {participant:?}"
            );
        }
        InvariantRegistry::standard().assert_all(&world.snapshot(), &format!("seed {seed}"));
    }
}

#[tokio::test]
async fn without_candidates_no_channel_opens() {
    let config = WorldConfig { candidates_per_description: 0, ..Default::default() };
    let mut world = SimWorld::new(7, config);
    world.connect().await.unwrap();

    for participant in Participant::ALL {
        assert_eq!(world.app(participant).connection_state(), ConnectionState::Negotiating);
    }

    // Strokes made meanwhile stay local.
    stroke(&mut world, Controller, &[(1, 1), (2, 2)]).await;
    assert_eq!(strokes_on(&world, Controller, 0), 1);
    assert_eq!(strokes_on(&world, Guest, 0), 0);
}

#[tokio::test]
async fn guest_quit_leaves_the_controller_waiting() {
    let mut world = connected_world(8).await;
    stroke(&mut world, Controller, &[(5, 5), (6, 6)]).await;

    press(&mut world, Guest, KeyInput::Esc).await;

    assert!(!world.is_live(Guest));
    assert!(world.is_live(Controller));
    let controller = world.app(Controller);
    assert_eq!(controller.negotiation_state(), NegotiationState::Joined);
    assert_eq!(controller.connection_state(), ConnectionState::Waiting);
    assert!(controller.document().history().is_empty());
    assert!(controller.document().write_access());
    assert!(world.network().is_stopped(Guest.endpoint()));
    assert_eq!(world.relay_session_count(), 1);
    InvariantRegistry::standard().assert_all(&world.snapshot(), "after guest quit");
}

#[tokio::test]
async fn guest_quits_and_rejoins() {
    let invariants = InvariantRegistry::standard();
    for seed in 30..40 {
        let mut world = connected_world(seed).await;
        stroke(&mut world, Controller, &[(1, 1), (2, 2)]).await;
        press(&mut world, Guest, KeyInput::Esc).await;

        world.rejoin(Guest).await.unwrap();
        world.settle().await.unwrap();

        for participant in Participant::ALL {
            let app = world.app(participant);
            assert_eq!(app.connection_state(), ConnectionState::Connected, "seed {seed} {participant:?}");
            assert!(app.document().history().is_empty(), "seed {seed} {participant:?}");
        }

        // Control and strokes flow over the new channel.
        press(&mut world, Controller, KeyInput::Char('g')).await;
        assert!(world.app(Guest).document().write_access(), "seed {seed}");
        stroke(&mut world, Guest, &[(7, 7), (8, 8)]).await;
        assert_eq!(strokes_on(&world, Controller, 0), 1, "seed {seed}");
        invariants.assert_all(&world.snapshot(), &format!("seed {seed} after rejoin"));
    }
}

#[tokio::test]
async fn unreachable_relay_fails_only_that_side() {
    let mut world = SimWorld::new(9, WorldConfig::default());
    world.set_relay_reachable(Guest, false);
    world.connect().await.unwrap();

    let guest = world.app(Guest);
    assert_eq!(guest.negotiation_state(), NegotiationState::Failed);
    assert!(guest.status_message().is_some_and(|m| m.contains("unreachable")));

    let controller = world.app(Controller);
    assert_eq!(controller.negotiation_state(), NegotiationState::Joined);
    assert_eq!(controller.connection_state(), ConnectionState::Waiting);
    assert!(world.is_live(Guest));
}

#[tokio::test]
async fn relay_loss_after_connect_ends_one_side_and_restarts_the_other() {
    let mut world = connected_world(10).await;
    stroke(&mut world, Controller, &[(3, 3), (4, 4)]).await;

    world.drop_relay(Controller);
    world.settle().await.unwrap();

    let controller = world.app(Controller);
    assert_eq!(controller.negotiation_state(), NegotiationState::Closed);
    assert_eq!(controller.connection_state(), ConnectionState::Ended { failed: false });
    // The document survives the session.
    assert_eq!(controller.document().history().strokes(0).len(), 1);

    let guest = world.app(Guest);
    assert_eq!(guest.negotiation_state(), NegotiationState::Joined);
    assert_eq!(guest.connection_state(), ConnectionState::Waiting);
    assert!(guest.document().history().is_empty());
    InvariantRegistry::standard().assert_all(&world.snapshot(), "after relay loss");
}

#[tokio::test]
async fn invite_goes_to_the_clipboard() {
    let mut world = connected_world(11).await;

    press(&mut world, Controller, KeyInput::Char('i')).await;

    let expected = world.app(Controller).invite().for_guest().to_string();
    assert!(expected.starts_with("cosign://"));
    assert!(expected.ends_with("?role=guest"));
    assert_eq!(world.clipboard(Controller), vec![expected]);
}

#[tokio::test]
async fn time_passing_keeps_the_session_up() {
    let mut world = connected_world(12).await;

    for _ in 0..20 {
        world.apply(&SimOperation::AdvanceTime { millis: 5_000 }).await.unwrap();
    }
    world.settle().await.unwrap();

    for participant in Participant::ALL {
        assert_eq!(world.app(participant).connection_state(), ConnectionState::Connected);
        assert!(world.network().renders(participant.endpoint()) > 0);
    }
}
