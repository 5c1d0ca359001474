//! Page cursor, write-access flag and annotation history for one session.
//!
//! Uses the action pattern: operations validate first, mutate second, and
//! return [`DocumentAction`]s describing what to paint and what to broadcast.
//! Rejected operations leave the state untouched and produce no actions.
//!
//! Local and remote mutations differ only in what gets broadcast: local ones
//! produce a [`SyncMessage`] for the peer, remote ones never echo back.
//! Remote page and control values are applied unconditionally, so each side
//! converges to the last message it received.

use cosign_proto::{Point, Stroke, SyncMessage};

use crate::{AnnotationHistory, error::DocumentError};

/// Pages in a document when none is configured.
pub const DEFAULT_PAGE_COUNT: u32 = 5;

/// Surface width in document units.
pub const DEFAULT_SURFACE_WIDTH: f64 = 800.0;

/// Surface height in document units.
pub const DEFAULT_SURFACE_HEIGHT: f64 = 1000.0;

/// Pen color for local strokes.
pub const DEFAULT_PEN_COLOR: &str = "red";

/// Pen width for local strokes.
pub const DEFAULT_PEN_WIDTH: f64 = 2.0;

/// Document geometry and local pen.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentConfig {
    /// Number of pages (at least one)
    pub page_count: u32,
    /// Surface width in document units
    pub surface_width: f64,
    /// Surface height in document units
    pub surface_height: f64,
    /// Pen color for local strokes
    pub pen_color: String,
    /// Pen width for local strokes
    pub pen_width: f64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            page_count: DEFAULT_PAGE_COUNT,
            surface_width: DEFAULT_SURFACE_WIDTH,
            surface_height: DEFAULT_SURFACE_HEIGHT,
            pen_color: DEFAULT_PEN_COLOR.to_string(),
            pen_width: DEFAULT_PEN_WIDTH,
        }
    }
}

/// Where a mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Input on this side
    Local,
    /// Decoded from the peer channel
    Remote,
}

/// Side effects for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentAction {
    /// Send this message to the peer (if the channel is ready).
    Broadcast(SyncMessage),
    /// Paint one stroke on top of the visible surface.
    DrawStroke(Stroke),
    /// Clear the visible surface and replay the history of this page.
    ReplayPage(u32),
}

/// Shared document state as seen from one side of the session.
///
/// # Invariants
///
/// - `cursor < page_count` at all times
/// - Strokes in `history` are never removed or reordered
#[derive(Debug, Clone)]
pub struct DocumentState {
    config: DocumentConfig,
    cursor: u32,
    write_access: bool,
    history: AnnotationHistory,
}

impl DocumentState {
    /// Fresh document on page 0 with an empty history.
    pub fn new(mut config: DocumentConfig, write_access: bool) -> Self {
        config.page_count = config.page_count.max(1);
        Self { config, cursor: 0, write_access, history: AnnotationHistory::new() }
    }

    /// Document configuration.
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Current page.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Number of pages.
    pub fn page_count(&self) -> u32 {
        self.config.page_count
    }

    /// Whether local stroke input is accepted.
    pub fn write_access(&self) -> bool {
        self.write_access
    }

    /// All strokes received or drawn so far.
    pub fn history(&self) -> &AnnotationHistory {
        &self.history
    }

    /// Stroke from `from` to `to` using the configured pen.
    pub fn pen_stroke(&self, from: Point, to: Point) -> Stroke {
        Stroke::new(from, to, self.config.pen_color.clone(), self.config.pen_width)
    }

    fn check_page(&self, page: u32) -> Result<(), DocumentError> {
        if page < self.config.page_count {
            Ok(())
        } else {
            Err(DocumentError::PageOutOfBounds { page, page_count: self.config.page_count })
        }
    }

    /// Append `stroke` to `page`.
    ///
    /// Paints it if `page` is the current page. A local stroke is also
    /// broadcast while write access is enabled.
    pub fn apply_stroke(
        &mut self,
        stroke: Stroke,
        page: u32,
        origin: Origin,
    ) -> Result<Vec<DocumentAction>, DocumentError> {
        self.check_page(page)?;
        if !stroke.is_well_formed() {
            return Err(DocumentError::MalformedStroke);
        }

        let mut actions = Vec::with_capacity(2);
        if page == self.cursor {
            actions.push(DocumentAction::DrawStroke(stroke.clone()));
        }
        if origin == Origin::Local && self.write_access {
            actions.push(DocumentAction::Broadcast(SyncMessage::Draw {
                point: stroke.clone(),
                page,
            }));
        }

        self.history.append(page, stroke);
        Ok(actions)
    }

    /// Stroke input from the local user on the current page.
    ///
    /// This is the input gate: strokes are refused while write access is
    /// disabled.
    pub fn draw_local(&mut self, stroke: Stroke) -> Result<Vec<DocumentAction>, DocumentError> {
        if !self.write_access {
            return Err(DocumentError::WriteAccessDenied);
        }
        self.apply_stroke(stroke, self.cursor, Origin::Local)
    }

    /// Move the cursor to `target`, replay it and broadcast the change.
    ///
    /// Switching to the current page still replays and broadcasts.
    pub fn change_page(&mut self, target: u32) -> Result<Vec<DocumentAction>, DocumentError> {
        self.check_page(target)?;

        tracing::debug!(from = self.cursor, to = target, "page change");
        self.cursor = target;

        Ok(vec![
            DocumentAction::ReplayPage(target),
            DocumentAction::Broadcast(SyncMessage::PageChange { page: target }),
        ])
    }

    /// Set the shared write-access flag and broadcast it.
    pub fn set_control(&mut self, enabled: bool) -> Vec<DocumentAction> {
        tracing::debug!(enabled, "write access set locally");
        self.write_access = enabled;
        vec![DocumentAction::Broadcast(SyncMessage::Control { enabled })]
    }

    /// Apply a message decoded from the peer channel.
    ///
    /// Never produces a broadcast. An out-of-range page in a `draw` or
    /// `page-change` is rejected so the cursor invariant holds even against a
    /// misbehaving peer.
    pub fn apply_remote(
        &mut self,
        message: SyncMessage,
    ) -> Result<Vec<DocumentAction>, DocumentError> {
        match message {
            SyncMessage::Draw { point, page } => self.apply_stroke(point, page, Origin::Remote),
            SyncMessage::PageChange { page } => {
                self.check_page(page)?;
                tracing::debug!(from = self.cursor, to = page, "remote page change");
                self.cursor = page;
                Ok(vec![DocumentAction::ReplayPage(page)])
            },
            SyncMessage::Control { enabled } => {
                tracing::debug!(enabled, "remote write access");
                self.write_access = enabled;
                Ok(vec![])
            },
        }
    }
}
