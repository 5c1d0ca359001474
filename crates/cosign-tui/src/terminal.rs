//! Terminal driver for the TUI.
//!
//! Implements the [`Driver`] trait for terminal I/O using crossterm for
//! keyboard and mouse events and ratatui for rendering. The relay connection
//! and the direct peer connection use quinn.

use std::{
    io::{self, Stdout, stdout},
    time::{Duration, Instant},
};

use cosign_app::{App, AppEvent, Driver, DriverEvent, KeyInput, PointerInput};
use cosign_client::{
    PeerCommand,
    transport::{self, PeerReceivers, QuicPeer, RelayConnection, TransportConfig, TransportError},
};
use cosign_core::DocumentConfig;
use cosign_proto::{RelayNotice, RelayRequest};
use crossterm::{
    ExecutableCommand,
    clipboard::CopyToClipboard,
    event::{
        DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEventKind,
        MouseButton, MouseEvent, MouseEventKind,
    },
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend, layout::Rect};
use thiserror::Error;

use crate::ui;

/// How long [`Driver::poll_event`] waits before reporting a tick.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal driver errors.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// I/O error from terminal operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No relay connection to send on.
    #[error("not connected to the relay")]
    NotConnected,

    /// Relay connection task is gone.
    #[error("relay channel closed")]
    ChannelSend,
}

/// Terminal driver implementing the [`Driver`] trait.
///
/// Handles terminal I/O (crossterm), rendering (ratatui), the relay
/// connection and the negotiation object (quinn QUIC).
pub struct TerminalDriver {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    event_stream: EventStream,
    transport: TransportConfig,
    relay: Option<RelayConnection>,
    peer: QuicPeer,
    peer_rx: PeerReceivers,
    /// Document surface as last rendered, in cells
    surface_area: Rect,
    /// Document surface size in document units
    surface: (f64, f64),
}

impl TerminalDriver {
    /// Take over the terminal.
    pub fn new(transport: TransportConfig, document: &DocumentConfig) -> Result<Self, TerminalError> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;
        stdout().execute(EnableMouseCapture)?;

        let backend = CrosstermBackend::new(stdout());
        let terminal = Terminal::new(backend)?;
        let (peer, peer_rx) = QuicPeer::new(transport.clone());

        Ok(Self {
            terminal,
            event_stream: EventStream::new(),
            transport,
            relay: None,
            peer,
            peer_rx,
            surface_area: Rect::default(),
            surface: (document.surface_width, document.surface_height),
        })
    }

    /// Convert crossterm `KeyCode` to `KeyInput`.
    fn convert_key(code: KeyCode) -> Option<KeyInput> {
        match code {
            KeyCode::Char(c) => Some(KeyInput::Char(c)),
            KeyCode::Esc => Some(KeyInput::Esc),
            KeyCode::Left | KeyCode::PageUp => Some(KeyInput::Left),
            KeyCode::Right | KeyCode::PageDown => Some(KeyInput::Right),
            KeyCode::Home => Some(KeyInput::Home),
            KeyCode::End => Some(KeyInput::End),
            _ => None,
        }
    }

    /// Left-button gestures over the surface. Leaving the surface ends the
    /// gesture.
    fn convert_mouse(&self, mouse: MouseEvent) -> Option<PointerInput> {
        let point = ui::surface_point(self.surface_area, mouse.column, mouse.row, self.surface);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => point.map(PointerInput::Down),
            MouseEventKind::Drag(MouseButton::Left) => {
                Some(point.map_or(PointerInput::Up, PointerInput::Drag))
            },
            MouseEventKind::Up(MouseButton::Left) => Some(PointerInput::Up),
            _ => None,
        }
    }

    fn convert_event(&self, event: Event) -> Option<AppEvent> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                Self::convert_key(key.code).map(AppEvent::Key)
            },
            Event::Mouse(mouse) => self.convert_mouse(mouse).map(AppEvent::Pointer),
            Event::Resize(cols, rows) => Some(AppEvent::Resize(cols, rows)),
            _ => None,
        }
    }
}

/// Next notice from the relay; pending forever without a connection.
async fn next_notice(relay: &mut Option<RelayConnection>) -> Option<RelayNotice> {
    match relay {
        Some(connection) => connection.from_relay.recv().await,
        None => std::future::pending().await,
    }
}

impl Driver for TerminalDriver {
    type Error = TerminalError;
    type Instant = Instant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        let tick = tokio::time::sleep(TICK_INTERVAL);
        tokio::pin!(tick);

        loop {
            tokio::select! {
                biased;

                // Terminal events
                maybe_event = self.event_stream.next() => {
                    match maybe_event {
                        Some(Ok(event)) => {
                            if let Some(event) = self.convert_event(event) {
                                return Ok(Some(DriverEvent::App(event)));
                            }
                        },
                        Some(Err(e)) => return Err(TerminalError::Io(e)),
                        // Input is gone; nothing left to drive the session.
                        None => return Ok(Some(DriverEvent::App(AppEvent::Key(KeyInput::Esc)))),
                    }
                }

                Some(event) = self.peer_rx.events.recv() => {
                    return Ok(Some(DriverEvent::Peer(event)));
                }

                Some(text) = self.peer_rx.messages.recv() => {
                    return Ok(Some(DriverEvent::Channel(text)));
                }

                notice = next_notice(&mut self.relay) => {
                    let event = match notice {
                        Some(notice) => DriverEvent::Relay(notice),
                        None => {
                            tracing::info!("relay connection closed");
                            self.relay = None;
                            DriverEvent::RelayClosed
                        },
                    };
                    return Ok(Some(event));
                }

                // Tick timeout
                () = &mut tick => return Ok(None),
            }
        }
    }

    async fn connect_relay(&mut self, addr: &str) -> Result<(), Self::Error> {
        let connection = transport::connect_relay(addr, &self.transport).await?;
        self.relay = Some(connection);
        Ok(())
    }

    async fn send_relay(&mut self, request: RelayRequest) -> Result<(), Self::Error> {
        let relay = self.relay.as_ref().ok_or(TerminalError::NotConnected)?;
        relay.to_relay.send(request).await.map_err(|_| TerminalError::ChannelSend)
    }

    fn execute_peer(&mut self, command: PeerCommand) -> Result<(), Self::Error> {
        let closing = command == PeerCommand::Close;
        self.peer.execute(command);

        // Whatever the old channel left queued must not reach the next one.
        if closing {
            while self.peer_rx.events.try_recv().is_ok() {}
            while self.peer_rx.messages.try_recv().is_ok() {}
        }
        Ok(())
    }

    fn send_channel(&mut self, text: String) -> Result<(), Self::Error> {
        Ok(self.peer.send(text)?)
    }

    fn copy_to_clipboard(&mut self, text: &str) -> Result<(), Self::Error> {
        stdout().execute(CopyToClipboard::to_clipboard_from(text))?;
        Ok(())
    }

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn render(&mut self, app: &App) -> Result<(), Self::Error> {
        let mut surface_area = self.surface_area;
        self.terminal.draw(|frame| {
            surface_area = ui::render(frame, app);
        })?;
        self.surface_area = surface_area;
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.stop();
        }
        self.peer.close();
    }
}

impl Drop for TerminalDriver {
    fn drop(&mut self) {
        self.stop();
        let _ = stdout().execute(DisableMouseCapture);
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    }
}
