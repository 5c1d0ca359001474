//! Generic runtime for application orchestration.
//!
//! The Runtime is the single session actor. It owns the [`App`] and the
//! [`Bridge`], and every input (user, relay, peer, channel) reaches them
//! through [`Driver::poll_event`], one at a time. Nothing is shared and
//! nothing is locked.

use cosign_client::NegotiationConfig;

use crate::{App, AppAction, AppEvent, Bridge, Driver, DriverEvent};

/// Generic runtime that orchestrates App, Bridge, and Driver.
pub struct Runtime<D: Driver> {
    driver: D,
    app: App,
    bridge: Bridge<D::Instant>,
    /// Relay accepted our last write
    relay_up: bool,
}

impl<D: Driver> Runtime<D> {
    /// Create a runtime for the session described by `app`'s invite.
    pub fn new(driver: D, app: App, negotiation: NegotiationConfig) -> Self {
        let bridge = Bridge::new(app.invite().session_id.clone(), negotiation, driver.now());
        Self { driver, app, bridge, relay_up: false }
    }

    /// Run the main event loop until the user quits.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to poll or render.
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.driver.render(&self.app)?;

        let mut quit = self.start().await?;
        while !quit {
            quit = self.step().await?;
        }

        self.driver.stop();
        Ok(())
    }

    /// Connect to the relay and join the session.
    ///
    /// An unreachable relay is not an error here: the session fails and the
    /// user sees why. Returns `true` if the application should quit.
    pub async fn start(&mut self) -> Result<bool, D::Error> {
        let relay = self.app.invite().relay.clone();

        let events = match self.driver.connect_relay(&relay).await {
            Ok(()) => {
                self.relay_up = true;
                self.bridge.start(self.driver.now())
            },
            Err(e) => {
                tracing::warn!(%relay, error = %e, "relay unreachable");
                let mut events = self.bridge.handle_relay_closed(self.driver.now());
                events.push(AppEvent::Error { message: format!("relay {relay} unreachable: {e}") });
                events
            },
        };

        self.flush().await;
        self.process_events(events).await
    }

    /// Process one input (or one tick if none arrived).
    ///
    /// Returns `true` if the application should quit.
    pub async fn step(&mut self) -> Result<bool, D::Error> {
        let event = self.driver.poll_event().await?;
        let now = self.driver.now();

        let events = match event {
            None => {
                let mut events = self.bridge.handle_tick(now);
                events.push(AppEvent::Tick);
                events
            },
            Some(DriverEvent::App(event)) => vec![event],
            Some(DriverEvent::Relay(notice)) => self.bridge.handle_relay_notice(notice, now),
            Some(DriverEvent::RelayClosed) => {
                self.relay_up = false;
                self.bridge.handle_relay_closed(now)
            },
            Some(DriverEvent::Peer(event)) => self.bridge.handle_peer_event(event, now),
            Some(DriverEvent::Channel(text)) => self.bridge.handle_channel_text(&text),
        };

        self.flush().await;
        self.process_events(events).await
    }

    /// Process events from Bridge or Driver through the App.
    async fn process_events(&mut self, events: Vec<AppEvent>) -> Result<bool, D::Error> {
        for event in events {
            let actions = self.app.handle(event);
            if self.process_actions(actions).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Execute actions returned by the App.
    ///
    /// Returns `true` if should quit.
    async fn process_actions(&mut self, actions: Vec<AppAction>) -> Result<bool, D::Error> {
        for action in actions {
            match action {
                AppAction::Render => self.driver.render(&self.app)?,
                AppAction::Broadcast(message) => {
                    self.bridge.broadcast(&message);
                    self.flush().await;
                },
                AppAction::CopyToClipboard(text) => {
                    if let Err(e) = self.driver.copy_to_clipboard(&text) {
                        tracing::warn!(error = %e, "clipboard unavailable");
                        self.app.set_status(format!("Invite: {text}"));
                        self.driver.render(&self.app)?;
                    }
                },
                AppAction::Quit => {
                    self.shutdown().await;
                    return Ok(true);
                },
            }
        }
        Ok(false)
    }

    /// Leave the relay and close the channel before exit.
    async fn shutdown(&mut self) {
        let events = self.bridge.close(self.driver.now());
        self.flush().await;
        for event in events {
            // Session is over; state only matters for inspection.
            let _ = self.app.handle(event);
        }
    }

    /// Hand queued requests, commands, and channel text to the driver.
    ///
    /// Failures are logged, not propagated: a lost relay or channel shows up
    /// as its own driver event.
    async fn flush(&mut self) {
        for request in self.bridge.take_relay_requests() {
            if !self.relay_up {
                tracing::debug!(?request, "relay down, dropping request");
                continue;
            }
            if let Err(e) = self.driver.send_relay(request).await {
                tracing::warn!(error = %e, "relay send failed");
                self.relay_up = false;
            }
        }

        for command in self.bridge.take_peer_commands() {
            if let Err(e) = self.driver.execute_peer(command) {
                tracing::warn!(error = %e, "peer command failed");
            }
        }

        for text in self.bridge.take_channel_messages() {
            if let Err(e) = self.driver.send_channel(text) {
                tracing::debug!(error = %e, "channel send failed");
            }
        }
    }

    /// Get a reference to the App
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Get a reference to the Bridge
    pub fn bridge(&self) -> &Bridge<D::Instant> {
        &self.bridge
    }

    /// Get a reference to the Driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get a mutable reference to the Driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
