//! Document surface
//!
//! The current page with its strokes drawn over it.

use std::str::FromStr;

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    symbols::Marker,
    widgets::{
        Block, Borders,
        canvas::{Canvas, Line},
    },
};

use crate::App;

/// Render the document and return the inner (drawable) area.
pub fn render(frame: &mut Frame, app: &App, area: Rect) -> Rect {
    let document = app.document();
    let config = document.config();
    let (width, height) = (config.surface_width, config.surface_height);

    let title = format!(" Page {}/{} ", document.cursor() + 1, document.page_count());
    let border = if document.write_access() { Color::Green } else { Color::DarkGray };
    let block =
        Block::default().borders(Borders::ALL).title(title).border_style(Style::default().fg(border));
    let inner = block.inner(area);

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            for stroke in app.surface() {
                // Canvas y grows upwards, document y grows downwards.
                ctx.draw(&Line::new(
                    stroke.prev_x,
                    height - stroke.prev_y,
                    stroke.x,
                    height - stroke.y,
                    Color::from_str(&stroke.color).unwrap_or(Color::Red),
                ));
            }
        });

    frame.render_widget(canvas, area);
    inner
}
