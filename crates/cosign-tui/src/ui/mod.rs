//! UI rendering
//!
//! Rendering functions that convert App state into terminal output using
//! ratatui widgets. All functions are pure (no I/O), taking state and
//! returning widget trees.

mod document;
mod status;

use cosign_proto::Point;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
};

pub use status::status_text;

use crate::App;

/// Render the entire UI.
///
/// Returns the cell area the document surface occupies, so pointer input
/// can be mapped back onto the surface.
pub fn render(frame: &mut Frame, app: &App) -> Rect {
    const DOCUMENT_MIN_HEIGHT: u16 = 3;
    const STATUS_HEIGHT: u16 = 1;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(DOCUMENT_MIN_HEIGHT), Constraint::Length(STATUS_HEIGHT)])
        .split(frame.area());

    let [document_area, status_area] = chunks.as_ref() else {
        return Rect::default();
    };

    let surface = document::render(frame, app, *document_area);
    status::render(frame, app, *status_area);
    surface
}

/// Map a terminal cell onto document coordinates.
///
/// Cells are sampled at their centre. `None` outside `area`.
pub fn surface_point(area: Rect, column: u16, row: u16, surface: (f64, f64)) -> Option<Point> {
    if area.width == 0 || area.height == 0 {
        return None;
    }
    if column < area.x || row < area.y {
        return None;
    }

    let dx = column - area.x;
    let dy = row - area.y;
    if dx >= area.width || dy >= area.height {
        return None;
    }

    let (width, height) = surface;
    let x = (f64::from(dx) + 0.5) / f64::from(area.width) * width;
    let y = (f64::from(dy) + 0.5) / f64::from(area.height) * height;
    Some(Point::new(x, y))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cosign_app::{Invite, ParticipantRole};
    use cosign_core::DocumentConfig;
    use cosign_proto::SessionId;
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;

    fn app() -> App {
        let invite = Invite {
            relay: "127.0.0.1:4433".to_string(),
            session_id: SessionId::new("demo").unwrap(),
            role: ParticipantRole::Controller,
        };
        App::new(invite, DocumentConfig::default())
    }

    #[test]
    fn cells_map_to_their_centre() {
        let area = Rect::new(10, 5, 4, 2);

        let first = surface_point(area, 10, 5, (800.0, 1000.0)).unwrap();
        assert!((first.x - 100.0).abs() < f64::EPSILON);
        assert!((first.y - 250.0).abs() < f64::EPSILON);

        let last = surface_point(area, 13, 6, (800.0, 1000.0)).unwrap();
        assert!((last.x - 700.0).abs() < f64::EPSILON);
        assert!((last.y - 750.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cells_outside_the_surface_do_not_map() {
        let area = Rect::new(1, 1, 10, 10);
        let surface = (800.0, 1000.0);

        assert!(surface_point(area, 0, 5, surface).is_none());
        assert!(surface_point(area, 5, 0, surface).is_none());
        assert!(surface_point(area, 11, 5, surface).is_none());
        assert!(surface_point(area, 5, 11, surface).is_none());
        assert!(surface_point(Rect::default(), 0, 0, surface).is_none());
    }

    #[test]
    fn render_reports_surface_inside_the_border() {
        let mut terminal = Terminal::new(TestBackend::new(40, 12)).unwrap();
        let app = app();

        let mut surface = Rect::default();
        terminal
            .draw(|frame| {
                surface = render(frame, &app);
            })
            .unwrap();

        // Bordered document above a one-line status bar.
        assert_eq!(surface, Rect::new(1, 1, 38, 9));
    }
}
