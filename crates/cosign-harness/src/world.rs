//! Two-participant simulated world.
//!
//! A [`SimWorld`] runs a controller and a guest, each a full
//! [`cosign_app::Runtime`] over a [`SimDriver`], against one simulated relay
//! and one pair of simulated negotiation objects. A seeded scheduler decides
//! what happens next: deliver something in flight, or let a participant
//! process an input. Same seed, same operations, same run.
//!
//! A participant that exited can be started again with
//! [`SimWorld::rejoin`], as if the process were relaunched from the same
//! invite.

use std::{sync::MutexGuard, time::Duration};

use cosign_app::{
    App, AppEvent, Driver, DriverEvent, Invite, KeyInput, ParticipantRole, PointerInput, Runtime,
};
use cosign_client::NegotiationConfig;
use cosign_core::{DocumentConfig, env::Environment};
use cosign_proto::{Point, SessionId};
use cosign_relay::RelayConfig;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{
    InvariantRegistry, ParticipantSnapshot, Participant, SimDriver, SimDriverError, SimEnv,
    SimNetwork, SimOperation, SystemSnapshot,
    sim_driver::SharedNetwork,
    sim_env::lock,
    sim_peer::Endpoint,
};

/// Relay address written into simulated invites.
pub const SIM_RELAY_ADDR: &str = "sim-relay:4433";

/// Upper bound on scheduling decisions in one [`SimWorld::settle`].
const MAX_SETTLE_STEPS: usize = 10_000;

/// World parameters.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Pages in the shared document
    pub page_count: u32,
    /// Let candidates overtake other signaling messages
    pub reorder_candidates: bool,
    /// Candidates produced per description (zero: the channel never opens)
    pub candidates_per_description: u32,
    /// Relay limits
    pub relay: RelayConfig,
    /// Negotiator settings for both participants
    pub negotiation: NegotiationConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            page_count: 5,
            reorder_candidates: false,
            candidates_per_description: 2,
            relay: RelayConfig::default(),
            negotiation: NegotiationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Choice {
    Deliver(usize),
    Process(Endpoint),
}

/// Controller and guest sharing one simulated network.
pub struct SimWorld {
    env: SimEnv,
    session_id: SessionId,
    document: DocumentConfig,
    negotiation: NegotiationConfig,
    network: SharedNetwork,
    runtimes: Vec<Runtime<SimDriver>>,
    live: [bool; 2],
    scheduler: ChaCha20Rng,
    reorder_candidates: bool,
}

impl SimWorld {
    /// World seeded with `seed`. Nobody is connected until started.
    pub fn new(seed: u64, config: WorldConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let session_id = env.random_session_id();
        let scheduler = ChaCha20Rng::seed_from_u64(env.random_u64());
        let network =
            SimNetwork::new(env.clone(), config.relay.clone(), config.candidates_per_description)
                .shared();

        let document = DocumentConfig { page_count: config.page_count, ..DocumentConfig::default() };
        let runtimes = Participant::ALL
            .iter()
            .map(|participant| {
                let app = App::new(invite(&session_id, *participant), document.clone());
                let driver = SimDriver::new(participant.endpoint(), network.clone(), env.clone());
                Runtime::new(driver, app, config.negotiation.clone())
            })
            .collect();

        Self {
            env,
            session_id,
            document,
            negotiation: config.negotiation,
            network,
            runtimes,
            live: [true; 2],
            scheduler,
            reorder_candidates: config.reorder_candidates,
        }
    }

    /// Make the relay refuse (or accept) a participant's connection.
    pub fn set_relay_reachable(&self, participant: Participant, reachable: bool) {
        self.network().set_relay_reachable(participant.endpoint(), reachable);
    }

    /// Connect one participant to the relay and join.
    pub async fn start(&mut self, participant: Participant) -> Result<(), SimDriverError> {
        let endpoint = participant.endpoint();
        if self.runtimes[endpoint].start().await? {
            self.retire(endpoint);
        }
        Ok(())
    }

    /// Relaunch a participant that exited: fresh App and driver, same
    /// invite. Connects and joins like [`Self::start`].
    pub async fn rejoin(&mut self, participant: Participant) -> Result<(), SimDriverError> {
        let endpoint = participant.endpoint();
        if self.live[endpoint] {
            return Err(SimDriverError(format!("participant {endpoint} is still running")));
        }

        tracing::debug!(endpoint, "participant relaunched");
        self.network().revive(endpoint);
        let app = App::new(invite(&self.session_id, participant), self.document.clone());
        let driver = SimDriver::new(endpoint, self.network.clone(), self.env.clone());
        self.runtimes[endpoint] = Runtime::new(driver, app, self.negotiation.clone());
        self.live[endpoint] = true;

        self.start(participant).await
    }

    /// Start the controller, then the guest, and run until nothing is
    /// pending.
    pub async fn connect(&mut self) -> Result<(), SimDriverError> {
        self.start(Participant::Controller).await?;
        self.start(Participant::Guest).await?;
        self.settle().await?;
        Ok(())
    }

    /// Queue user input for a participant.
    pub fn inject(&self, participant: Participant, event: AppEvent) {
        self.network().inject(participant.endpoint(), DriverEvent::App(event));
    }

    /// Make one scheduling decision.
    ///
    /// Returns `false` if there was nothing to do.
    pub async fn step(&mut self) -> Result<bool, SimDriverError> {
        let choices: Vec<Choice> = {
            let network = self.network();
            let mut choices: Vec<Choice> = (0..2)
                .filter(|&e| self.live[e] && network.has_input(e))
                .map(Choice::Process)
                .collect();
            choices.extend(network.deliverable(self.reorder_candidates).into_iter().map(Choice::Deliver));
            choices
        };

        if choices.is_empty() {
            return Ok(false);
        }

        match choices[self.scheduler.gen_range(0..choices.len())] {
            Choice::Deliver(index) => self.network().deliver(index),
            Choice::Process(endpoint) => self.process(endpoint).await?,
        }
        Ok(true)
    }

    /// Step until nothing is pending. Returns the number of steps taken.
    pub async fn settle(&mut self) -> Result<usize, SimDriverError> {
        for steps in 0..MAX_SETTLE_STEPS {
            if !self.step().await? {
                return Ok(steps);
            }
        }
        Err(SimDriverError(format!("world did not settle in {MAX_SETTLE_STEPS} steps")))
    }

    /// Advance the clock, then give each idle participant a tick.
    pub async fn tick(&mut self, duration: Duration) -> Result<(), SimDriverError> {
        self.env.advance(duration);
        for endpoint in 0..2 {
            let idle = self.live[endpoint] && !self.network().has_input(endpoint);
            if idle {
                self.process(endpoint).await?;
            }
        }
        Ok(())
    }

    /// Apply one operation.
    pub async fn apply(&mut self, operation: &SimOperation) -> Result<(), SimDriverError> {
        match operation {
            SimOperation::Stroke { participant, path } => {
                let mut points = path.iter().map(|&(x, y)| Point::new(f64::from(x), f64::from(y)));
                if let Some(first) = points.next() {
                    self.inject(*participant, AppEvent::Pointer(PointerInput::Down(first)));
                    for point in points {
                        self.inject(*participant, AppEvent::Pointer(PointerInput::Drag(point)));
                    }
                    self.inject(*participant, AppEvent::Pointer(PointerInput::Up));
                }
            },
            SimOperation::GoToPage { participant, page } => {
                let digit = char::from_digit(u32::from(page % 9) + 1, 10).unwrap_or('1');
                self.inject(*participant, AppEvent::Key(KeyInput::Char(digit)));
            },
            SimOperation::NextPage { participant } => {
                self.inject(*participant, AppEvent::Key(KeyInput::Right));
            },
            SimOperation::PreviousPage { participant } => {
                self.inject(*participant, AppEvent::Key(KeyInput::Left));
            },
            SimOperation::ToggleControl { participant } => {
                self.inject(*participant, AppEvent::Key(KeyInput::Char('c')));
            },
            SimOperation::Step => {
                self.step().await?;
            },
            SimOperation::Settle => {
                self.settle().await?;
            },
            SimOperation::AdvanceTime { millis } => {
                self.tick(Duration::from_millis(u64::from(*millis))).await?;
            },
        }
        Ok(())
    }

    /// Apply operations, checking `invariants` after each one.
    ///
    /// Finishes by settling and checking once more.
    pub async fn run_checked(
        &mut self,
        operations: &[SimOperation],
        invariants: &InvariantRegistry,
    ) -> Result<(), String> {
        for (index, operation) in operations.iter().enumerate() {
            self.apply(operation).await.map_err(|e| e.to_string())?;
            invariants
                .check_all(&self.snapshot())
                .map_err(|v| format!("after operation {index} ({operation:?}): {v:?}"))?;
        }

        self.settle().await.map_err(|e| e.to_string())?;
        invariants.check_all(&self.snapshot()).map_err(|v| format!("at rest: {v:?}"))
    }

    /// Drop a participant's relay connection.
    pub fn drop_relay(&self, participant: Participant) {
        self.network().drop_relay(participant.endpoint());
    }

    /// Nothing in flight and no unprocessed input.
    pub fn is_settled(&self) -> bool {
        self.network().is_quiet()
    }

    /// Capture both participants for invariant checking.
    pub fn snapshot(&self) -> SystemSnapshot {
        let network = self.network();
        let participants = Participant::ALL
            .iter()
            .map(|participant| {
                let endpoint = participant.endpoint();
                ParticipantSnapshot::from_app(endpoint, self.runtimes[endpoint].app())
                    .with_live(self.live[endpoint])
                    .with_sent_draws(network.sent_draws(endpoint).to_vec())
            })
            .collect();

        SystemSnapshot::from_participants(participants)
            .settled(network.is_quiet())
            .with_last_control(network.last_control_sent())
    }

    /// A participant's App.
    pub fn app(&self, participant: Participant) -> &App {
        self.runtimes[participant.endpoint()].app()
    }

    /// A participant's Runtime.
    pub fn runtime(&self, participant: Participant) -> &Runtime<SimDriver> {
        &self.runtimes[participant.endpoint()]
    }

    /// Whether a participant is still running.
    pub fn is_live(&self, participant: Participant) -> bool {
        self.live[participant.endpoint()]
    }

    /// Invite references a participant copied.
    pub fn clipboard(&self, participant: Participant) -> Vec<String> {
        self.network().clipboard(participant.endpoint()).to_vec()
    }

    /// Sessions the relay currently tracks.
    pub fn relay_session_count(&self) -> usize {
        self.network().relay().driver().session_count()
    }

    /// The shared network, for inspection.
    pub fn network(&self) -> MutexGuard<'_, SimNetwork> {
        lock(&self.network)
    }

    async fn process(&mut self, endpoint: Endpoint) -> Result<(), SimDriverError> {
        if self.runtimes[endpoint].step().await? {
            self.retire(endpoint);
        }
        Ok(())
    }

    fn retire(&mut self, endpoint: Endpoint) {
        tracing::debug!(endpoint, "participant exited");
        self.live[endpoint] = false;
        self.runtimes[endpoint].driver_mut().stop();
        self.network().retire(endpoint);
    }
}

fn invite(session_id: &SessionId, participant: Participant) -> Invite {
    let role = match participant {
        Participant::Controller => ParticipantRole::Controller,
        Participant::Guest => ParticipantRole::Guest,
    };
    Invite { relay: SIM_RELAY_ADDR.to_string(), session_id: session_id.clone(), role }
}
