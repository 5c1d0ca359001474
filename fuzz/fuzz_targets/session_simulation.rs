//! Fuzz target for whole simulated sessions
//!
//! Connects a controller and a guest in the deterministic simulation, then
//! applies arbitrary operations (strokes, page changes, control toggles,
//! partial delivery, time) checking the standard invariants after each.

#![no_main]

use cosign_harness::{InvariantRegistry, SimOperation, SimWorld, WorldConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u64, bool, Vec<SimOperation>)| {
    let (seed, reorder_candidates, operations) = input;
    let config = WorldConfig { reorder_candidates, ..WorldConfig::default() };

    // Simulated drivers never suspend, so a trivial executor suffices.
    futures::executor::block_on(async {
        let mut world = SimWorld::new(seed, config);
        world.connect().await.expect("simulation must connect");
        if let Err(violation) = world.run_checked(&operations, &InvariantRegistry::standard()).await {
            panic!("{violation}");
        }
    });
});
