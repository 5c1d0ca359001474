//! Application state machine.
//!
//! [`App`] holds the interactive state of one session, completely decoupled
//! from I/O and negotiation mechanics. It consumes [`crate::AppEvent`]s and
//! produces [`crate::AppAction`]s for the runtime to execute.
//!
//! # Responsibilities
//!
//! - Owns the [`DocumentState`] and the painted surface, applying the
//!   document's paint and replay actions to it.
//! - Turns pointer gestures into strokes and keys into page/control intents.
//! - Enforces the UI-level rule that only the controller changes write
//!   access.
//! - Tracks connectivity and a transient status message for the UI.
//! - Starts over with an empty document when the other party ends the
//!   session.

use cosign_client::NegotiationState;
use cosign_core::{Canvas, DocumentAction, DocumentConfig, DocumentError, DocumentState};
use cosign_proto::{Point, Stroke, SyncMessage};

use crate::{
    AppAction, AppEvent, ConnectionState, Invite, KeyInput, ParticipantRole, PointerInput,
};

/// Application state machine.
///
/// Pure state machine that processes events and produces actions.
/// No I/O dependencies, fully testable in simulation.
#[derive(Debug, Clone)]
pub struct App {
    /// Session reference, including our own role.
    invite: Invite,
    /// Page cursor, write access, and stroke history.
    document: DocumentState,
    /// Strokes currently painted (current page, in paint order).
    surface: Vec<Stroke>,
    /// Last pointer position of an active gesture.
    pen: Option<Point>,
    /// Latest negotiation state reported by the bridge.
    negotiation: NegotiationState,
    /// Latest connectivity reported by the bridge.
    connectivity: bool,
    /// Terminal dimensions (columns, rows).
    terminal_size: (u16, u16),
    /// Transient status message. `None` if no message.
    status_message: Option<String>,
}

impl App {
    /// Create a new App for the session described by `invite`.
    pub fn new(invite: Invite, config: DocumentConfig) -> Self {
        let document = DocumentState::new(config, invite.role.initial_write_access());
        Self {
            invite,
            document,
            surface: Vec::new(),
            pen: None,
            negotiation: NegotiationState::Idle,
            connectivity: false,
            terminal_size: (80, 24),
            status_message: None,
        }
    }

    /// Process an event and return actions.
    pub fn handle(&mut self, event: AppEvent) -> Vec<AppAction> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Pointer(pointer) => self.handle_pointer(pointer),
            AppEvent::Tick => vec![],
            AppEvent::Resize(cols, rows) => {
                self.terminal_size = (cols, rows);
                vec![AppAction::Render]
            },
            AppEvent::Negotiation(state) => {
                self.negotiation = state;
                vec![AppAction::Render]
            },
            AppEvent::Connectivity(connected) => {
                self.connectivity = connected;
                self.status_message = Some(if connected {
                    "Peer connected".to_string()
                } else {
                    "Peer disconnected".to_string()
                });
                vec![AppAction::Render]
            },
            AppEvent::SessionRestarted => {
                let config = self.document.config().clone();
                self.document = DocumentState::new(config, self.invite.role.initial_write_access());
                self.surface.clear();
                self.pen = None;
                self.connectivity = false;
                self.status_message = Some("Peer left, waiting for them to rejoin".to_string());
                vec![AppAction::Render]
            },
            AppEvent::Remote(message) => self.apply_remote(message),
            AppEvent::Error { message } => {
                self.status_message = Some(format!("Error: {message}"));
                vec![AppAction::Render]
            },
        }
    }

    fn handle_key(&mut self, key: KeyInput) -> Vec<AppAction> {
        match key {
            KeyInput::Esc | KeyInput::Char('q') => self.quit(),
            KeyInput::Right | KeyInput::Char('n' | ' ') => self.next_page(),
            KeyInput::Left | KeyInput::Char('p') => self.previous_page(),
            KeyInput::Home => self.change_page(0),
            KeyInput::End => self.change_page(self.document.page_count().saturating_sub(1)),
            KeyInput::Char('c') => self.toggle_control(),
            KeyInput::Char('g') => self.grant_control(),
            KeyInput::Char('r') => self.revoke_control(),
            KeyInput::Char('i') => self.copy_invite(),
            KeyInput::Char(digit @ '1'..='9') => {
                let page = digit.to_digit(10).map_or(0, |d| d - 1);
                self.change_page(page)
            },
            KeyInput::Char(_) => vec![],
        }
    }

    fn handle_pointer(&mut self, pointer: PointerInput) -> Vec<AppAction> {
        match pointer {
            PointerInput::Down(at) => {
                // Gestures only start while input is accepted.
                if self.document.write_access() {
                    self.pen = Some(at);
                } else {
                    self.status_message = Some("View only".to_string());
                }
                vec![AppAction::Render]
            },
            PointerInput::Drag(to) => {
                let Some(from) = self.pen else {
                    return vec![];
                };
                self.pen = Some(to);
                self.draw(from, to)
            },
            PointerInput::Up => {
                self.pen = None;
                vec![]
            },
        }
    }

    /// Draw one stroke segment on the current page.
    ///
    /// Rejected while write access is disabled.
    pub fn draw(&mut self, from: Point, to: Point) -> Vec<AppAction> {
        let stroke = self.document.pen_stroke(from, to);
        let result = self.document.draw_local(stroke);
        self.finish(result)
    }

    /// Show `page` on both sides. Out-of-range pages only set a status.
    pub fn change_page(&mut self, page: u32) -> Vec<AppAction> {
        let result = self.document.change_page(page);
        self.finish(result)
    }

    /// Advance one page.
    pub fn next_page(&mut self) -> Vec<AppAction> {
        self.change_page(self.document.cursor().saturating_add(1))
    }

    /// Go back one page.
    pub fn previous_page(&mut self) -> Vec<AppAction> {
        match self.document.cursor().checked_sub(1) {
            Some(page) => self.change_page(page),
            None => {
                self.status_message = Some("Already on the first page".to_string());
                vec![AppAction::Render]
            },
        }
    }

    /// Grant (`true`) or revoke (`false`) write access. Controller only.
    pub fn set_control(&mut self, enabled: bool) -> Vec<AppAction> {
        if !self.invite.role.may_set_control() {
            self.status_message = Some("Only the controller can change write access".to_string());
            return vec![AppAction::Render];
        }

        self.status_message = Some(if enabled {
            "Write access granted".to_string()
        } else {
            "Write access revoked".to_string()
        });
        let actions = self.document.set_control(enabled);
        self.finish(Ok(actions))
    }

    /// Give the guest write access. Controller only.
    pub fn grant_control(&mut self) -> Vec<AppAction> {
        self.set_control(true)
    }

    /// Take write access away. Controller only.
    pub fn revoke_control(&mut self) -> Vec<AppAction> {
        self.set_control(false)
    }

    /// Flip write access. Controller only.
    pub fn toggle_control(&mut self) -> Vec<AppAction> {
        self.set_control(!self.document.write_access())
    }

    /// Copy the guest invite to the clipboard.
    pub fn copy_invite(&mut self) -> Vec<AppAction> {
        let reference = self.invite.for_guest().to_string();
        self.status_message = Some(format!("Invite copied: {reference}"));
        vec![AppAction::CopyToClipboard(reference), AppAction::Render]
    }

    /// Quit the application.
    pub fn quit(&self) -> Vec<AppAction> {
        vec![AppAction::Quit]
    }

    fn apply_remote(&mut self, message: SyncMessage) -> Vec<AppAction> {
        let control = match &message {
            SyncMessage::Control { enabled } => Some(*enabled),
            _ => None,
        };

        match self.document.apply_remote(message) {
            Ok(actions) => {
                if let Some(enabled) = control {
                    self.status_message = Some(if enabled {
                        "You may now draw".to_string()
                    } else {
                        "View only".to_string()
                    });
                    if !enabled {
                        self.pen = None;
                    }
                }
                self.execute(actions);
                vec![AppAction::Render]
            },
            Err(e) => {
                tracing::warn!(error = %e, "dropping remote message");
                vec![]
            },
        }
    }

    fn finish(&mut self, result: Result<Vec<DocumentAction>, DocumentError>) -> Vec<AppAction> {
        match result {
            Ok(actions) => {
                let mut app_actions = self.execute(actions);
                app_actions.push(AppAction::Render);
                app_actions
            },
            Err(DocumentError::WriteAccessDenied) => {
                self.pen = None;
                self.status_message = Some("View only".to_string());
                vec![AppAction::Render]
            },
            Err(DocumentError::PageOutOfBounds { page_count, .. }) => {
                self.status_message = Some(format!("Document has {page_count} pages"));
                vec![AppAction::Render]
            },
            Err(e @ DocumentError::MalformedStroke) => {
                tracing::debug!(error = %e, "stroke ignored");
                vec![]
            },
        }
    }

    /// Paint and replay onto the surface; return what goes on the wire.
    fn execute(&mut self, actions: Vec<DocumentAction>) -> Vec<AppAction> {
        let mut app_actions = Vec::new();
        for action in actions {
            match action {
                DocumentAction::Broadcast(message) => app_actions.push(AppAction::Broadcast(message)),
                DocumentAction::DrawStroke(stroke) => self.surface.draw_stroke(&stroke),
                DocumentAction::ReplayPage(page) => {
                    self.pen = None;
                    self.document.history().replay(page, &mut self.surface);
                },
            }
        }
        app_actions
    }

    /// Set a status message to display to the user.
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Session reference with our own role.
    pub fn invite(&self) -> &Invite {
        &self.invite
    }

    /// Our application role.
    pub fn role(&self) -> ParticipantRole {
        self.invite.role
    }

    /// Document state (cursor, write access, history).
    pub fn document(&self) -> &DocumentState {
        &self.document
    }

    /// Strokes currently painted, in paint order.
    pub fn surface(&self) -> &[Stroke] {
        &self.surface
    }

    /// Whether a pointer gesture is in progress.
    pub fn is_drawing(&self) -> bool {
        self.pen.is_some()
    }

    /// Latest negotiation state.
    pub fn negotiation_state(&self) -> NegotiationState {
        self.negotiation
    }

    /// Status derived from negotiation state and connectivity.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_session(self.negotiation, self.connectivity)
    }

    /// Terminal dimensions (columns, rows).
    pub fn terminal_size(&self) -> (u16, u16) {
        self.terminal_size
    }

    /// Transient status message. `None` if no message.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cosign_proto::SessionId;

    use super::*;

    fn app(role: ParticipantRole) -> App {
        let invite = Invite {
            relay: "127.0.0.1:4433".into(),
            session_id: SessionId::new("doc").unwrap(),
            role,
        };
        App::new(invite, DocumentConfig::default())
    }

    fn broadcasts(actions: &[AppAction]) -> Vec<SyncMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                AppAction::Broadcast(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    fn drag(app: &mut App, points: &[(f64, f64)]) -> Vec<AppAction> {
        let mut actions = Vec::new();
        let (x, y) = points[0];
        actions.extend(app.handle(AppEvent::Pointer(PointerInput::Down(Point::new(x, y)))));
        for &(x, y) in &points[1..] {
            actions.extend(app.handle(AppEvent::Pointer(PointerInput::Drag(Point::new(x, y)))));
        }
        actions.extend(app.handle(AppEvent::Pointer(PointerInput::Up)));
        actions
    }

    #[test]
    fn gesture_becomes_connected_segments() {
        let mut app = app(ParticipantRole::Controller);
        let actions = drag(&mut app, &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);

        let sent = broadcasts(&actions);
        assert_eq!(sent.len(), 2);
        let SyncMessage::Draw { point, page: 0 } = &sent[1] else {
            panic!("expected draw on page 0, got {:?}", sent[1]);
        };
        assert_eq!(point.from(), Point::new(10.0, 0.0));
        assert_eq!(point.to(), Point::new(10.0, 10.0));
        assert_eq!(app.surface().len(), 2);
        assert!(!app.is_drawing());
    }

    #[test]
    fn guest_cannot_draw_until_granted() {
        let mut app = app(ParticipantRole::Guest);
        let actions = drag(&mut app, &[(0.0, 0.0), (5.0, 5.0)]);
        assert!(broadcasts(&actions).is_empty());
        assert!(app.document().history().is_empty());

        app.handle(AppEvent::Remote(SyncMessage::Control { enabled: true }));
        let actions = drag(&mut app, &[(0.0, 0.0), (5.0, 5.0)]);
        assert_eq!(broadcasts(&actions).len(), 1);
    }

    #[test]
    fn guest_cannot_set_control() {
        let mut app = app(ParticipantRole::Guest);
        let actions = app.set_control(true);

        assert_eq!(actions, vec![AppAction::Render]);
        assert!(!app.document().write_access());
        assert!(app.status_message().unwrap().contains("controller"));
    }

    #[test]
    fn controller_toggle_broadcasts_control() {
        let mut app = app(ParticipantRole::Controller);
        let actions = app.handle(AppEvent::Key(KeyInput::Char('c')));
        assert_eq!(broadcasts(&actions), vec![SyncMessage::Control { enabled: false }]);

        let actions = app.toggle_control();
        assert_eq!(broadcasts(&actions), vec![SyncMessage::Control { enabled: true }]);
    }

    #[test]
    fn grant_and_revoke_set_the_flag_explicitly() {
        let mut app = app(ParticipantRole::Controller);

        let actions = app.handle(AppEvent::Key(KeyInput::Char('r')));
        assert_eq!(broadcasts(&actions), vec![SyncMessage::Control { enabled: false }]);
        assert!(!app.document().write_access());

        // Revoking twice still broadcasts the value.
        let actions = app.revoke_control();
        assert_eq!(broadcasts(&actions), vec![SyncMessage::Control { enabled: false }]);

        let actions = app.handle(AppEvent::Key(KeyInput::Char('g')));
        assert_eq!(broadcasts(&actions), vec![SyncMessage::Control { enabled: true }]);
        assert_eq!(app.status_message(), Some("Write access granted"));
    }

    #[test]
    fn page_keys_move_within_bounds() {
        let mut app = app(ParticipantRole::Guest);

        let actions = app.handle(AppEvent::Key(KeyInput::Left));
        assert!(broadcasts(&actions).is_empty());
        assert_eq!(app.document().cursor(), 0);

        let actions = app.handle(AppEvent::Key(KeyInput::End));
        assert_eq!(broadcasts(&actions), vec![SyncMessage::PageChange { page: 4 }]);

        let actions = app.handle(AppEvent::Key(KeyInput::Right));
        assert!(broadcasts(&actions).is_empty());
        assert_eq!(app.document().cursor(), 4);
        assert_eq!(app.status_message(), Some("Document has 5 pages"));

        app.handle(AppEvent::Key(KeyInput::Char('2')));
        assert_eq!(app.document().cursor(), 1);
    }

    #[test]
    fn remote_page_change_replays_history() {
        let mut app = app(ParticipantRole::Controller);
        drag(&mut app, &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        app.next_page();
        assert!(app.surface().is_empty());

        app.handle(AppEvent::Remote(SyncMessage::PageChange { page: 0 }));
        assert_eq!(app.surface(), app.document().history().strokes(0));
        assert_eq!(app.surface().len(), 2);
    }

    #[test]
    fn remote_draw_on_other_page_is_stored_not_painted() {
        let mut app = app(ParticipantRole::Guest);
        let stroke = Stroke::new(Point::new(1.0, 1.0), Point::new(2.0, 2.0), "blue", 3.0);

        app.handle(AppEvent::Remote(SyncMessage::Draw { point: stroke.clone(), page: 2 }));
        assert!(app.surface().is_empty());
        assert_eq!(app.document().history().strokes(2), &[stroke]);
    }

    #[test]
    fn out_of_range_remote_page_is_dropped() {
        let mut app = app(ParticipantRole::Guest);
        let actions = app.handle(AppEvent::Remote(SyncMessage::PageChange { page: 99 }));
        assert!(actions.is_empty());
        assert_eq!(app.document().cursor(), 0);
    }

    #[test]
    fn revoke_ends_active_gesture() {
        let mut app = app(ParticipantRole::Guest);
        app.handle(AppEvent::Remote(SyncMessage::Control { enabled: true }));
        app.handle(AppEvent::Pointer(PointerInput::Down(Point::new(0.0, 0.0))));
        assert!(app.is_drawing());

        app.handle(AppEvent::Remote(SyncMessage::Control { enabled: false }));
        assert!(!app.is_drawing());
        let actions = app.handle(AppEvent::Pointer(PointerInput::Drag(Point::new(3.0, 3.0))));
        assert!(actions.is_empty());
    }

    #[test]
    fn copy_invite_hands_out_guest_reference() {
        let mut app = app(ParticipantRole::Controller);
        let actions = app.handle(AppEvent::Key(KeyInput::Char('i')));
        assert_eq!(actions[0], AppAction::CopyToClipboard("cosign://127.0.0.1:4433/doc?role=guest".into()));
    }

    #[test]
    fn connectivity_updates_connection_state() {
        let mut app = app(ParticipantRole::Controller);
        app.handle(AppEvent::Negotiation(NegotiationState::Connected));
        assert_eq!(app.connection_state(), ConnectionState::Negotiating);

        app.handle(AppEvent::Connectivity(true));
        assert_eq!(app.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn restart_starts_from_an_empty_document() {
        let mut app = app(ParticipantRole::Guest);
        app.handle(AppEvent::Remote(SyncMessage::Control { enabled: true }));
        app.handle(AppEvent::Connectivity(true));
        drag(&mut app, &[(0.0, 0.0), (4.0, 4.0)]);
        assert_eq!(app.surface().len(), 1);
        app.handle(AppEvent::Key(KeyInput::Right));
        assert_eq!(app.document().cursor(), 1);

        let actions = app.handle(AppEvent::SessionRestarted);

        assert_eq!(actions, vec![AppAction::Render]);
        assert!(app.surface().is_empty());
        assert!(app.document().history().is_empty());
        assert_eq!(app.document().cursor(), 0);
        assert!(!app.document().write_access());
        assert!(!app.is_drawing());
        assert_eq!(app.connection_state(), ConnectionState::Waiting);
    }

    #[test]
    fn quit_keys() {
        let mut app = app(ParticipantRole::Guest);
        assert_eq!(app.handle(AppEvent::Key(KeyInput::Esc)), vec![AppAction::Quit]);
        assert_eq!(app.handle(AppEvent::Key(KeyInput::Char('q'))), vec![AppAction::Quit]);
    }
}
