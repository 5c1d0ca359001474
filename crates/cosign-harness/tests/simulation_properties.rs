//! Property-based tests over whole simulated sessions.
//!
//! Random operation sequences run against a connected controller and guest;
//! the standard invariants must hold after every operation and once the
//! world is at rest.

use arbitrary::{Arbitrary, Unstructured};
use cosign_harness::{InvariantRegistry, Participant, SimOperation, SimWorld, WorldConfig};
use cosign_proto::Stroke;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(future)
}

fn participant_strategy() -> impl Strategy<Value = Participant> {
    prop_oneof![3 => Just(Participant::Controller), 2 => Just(Participant::Guest)]
}

fn operation_strategy() -> impl Strategy<Value = SimOperation> {
    prop_oneof![
        6 => (participant_strategy(), prop::collection::vec((0u8..100, 0u8..100), 0..6))
            .prop_map(|(participant, path)| SimOperation::Stroke { participant, path }),
        2 => (participant_strategy(), 0u8..8)
            .prop_map(|(participant, page)| SimOperation::GoToPage { participant, page }),
        2 => participant_strategy().prop_map(|participant| SimOperation::NextPage { participant }),
        2 => participant_strategy()
            .prop_map(|participant| SimOperation::PreviousPage { participant }),
        2 => participant_strategy()
            .prop_map(|participant| SimOperation::ToggleControl { participant }),
        4 => Just(SimOperation::Step),
        1 => Just(SimOperation::Settle),
        1 => (0u16..2_000).prop_map(|millis| SimOperation::AdvanceTime { millis }),
    ]
}

fn config_strategy() -> impl Strategy<Value = WorldConfig> {
    (any::<bool>(), 1u32..4).prop_map(|(reorder_candidates, candidates_per_description)| {
        WorldConfig { reorder_candidates, candidates_per_description, ..WorldConfig::default() }
    })
}

/// Strokes in a canonical order; concurrent strokes interleave differently
/// on each side.
fn sorted(strokes: &[Stroke]) -> Vec<Stroke> {
    let mut strokes = strokes.to_vec();
    strokes.sort_by(|a, b| {
        a.x.total_cmp(&b.x)
            .then(a.y.total_cmp(&b.y))
            .then(a.prev_x.total_cmp(&b.prev_x))
            .then(a.prev_y.total_cmp(&b.prev_y))
            .then(a.width.total_cmp(&b.width))
            .then_with(|| a.color.cmp(&b.color))
    });
    strokes
}

fn run(seed: u64, config: WorldConfig, operations: &[SimOperation]) -> SimWorld {
    block_on(async {
        let mut world = SimWorld::new(seed, config);
        world.connect().await.unwrap();
        world.run_checked(operations, &InvariantRegistry::standard()).await.unwrap();
        world
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Session invariants hold under arbitrary interleavings.
    #[test]
    fn invariants_hold_for_random_sessions(
        seed in any::<u64>(),
        config in config_strategy(),
        operations in prop::collection::vec(operation_strategy(), 0..40),
    ) {
        let world = run(seed, config, &operations);
        prop_assert!(world.is_settled());
    }

    /// A seed and an operation list fully determine the outcome.
    #[test]
    fn same_seed_same_session(
        seed in any::<u64>(),
        operations in prop::collection::vec(operation_strategy(), 0..25),
    ) {
        let first = run(seed, WorldConfig::default(), &operations);
        let second = run(seed, WorldConfig::default(), &operations);
        prop_assert_eq!(first.snapshot(), second.snapshot());
    }

    /// The two sides hold the same strokes once everything is delivered.
    #[test]
    fn settled_histories_agree(
        seed in any::<u64>(),
        operations in prop::collection::vec(operation_strategy(), 0..30),
    ) {
        let world = run(seed, WorldConfig::default(), &operations);
        let controller = world.app(Participant::Controller).document().history();
        let guest = world.app(Participant::Guest).document().history();

        prop_assert_eq!(controller.total(), guest.total());
        for page in controller.pages() {
            prop_assert_eq!(
                sorted(controller.strokes(page)),
                sorted(guest.strokes(page)),
                "page {}",
                page
            );
        }
    }
}

#[test]
fn operations_from_raw_bytes() {
    let bytes: Vec<u8> = (0u16..2048).map(|i| (i.wrapping_mul(197) >> 3) as u8).collect();
    let mut input = Unstructured::new(&bytes);
    let operations: Vec<SimOperation> = Vec::arbitrary(&mut input).unwrap();

    let world = run(99, WorldConfig::default(), &operations);
    assert!(world.is_settled());
}
