//! Status bar
//!
//! Displays connection status, page, write access and the latest message.

use cosign_app::ConnectionState;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::App;

/// Render the status bar.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let state = app.connection_state();
    let color = match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Waiting | ConnectionState::Negotiating => Color::Yellow,
        ConnectionState::Ended { .. } => Color::Red,
    };

    let status_line = Line::from(vec![
        Span::raw(" "),
        Span::styled(state.label(), Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::raw(status_text(app)),
    ]);

    let paragraph =
        Paragraph::new(status_line).style(Style::default().bg(Color::DarkGray).fg(Color::White));

    frame.render_widget(paragraph, area);
}

/// Everything after the connection label.
pub fn status_text(app: &App) -> String {
    let document = app.document();
    let access = if document.write_access() { "draw" } else { "view only" };

    let mut text = format!(
        "{} | page {}/{} | {access}",
        app.role(),
        document.cursor() + 1,
        document.page_count()
    );
    if let Some(message) = app.status_message() {
        text.push_str(" | ");
        text.push_str(message);
    }
    text
}
