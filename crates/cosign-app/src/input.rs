//! Terminal-agnostic input.

use cosign_proto::Point;

/// Keyboard input abstraction.
///
/// Decouples application logic from terminal libraries so key bindings can
/// be exercised in simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Printable character.
    Char(char),
    /// Escape key (quit).
    Esc,
    /// Left arrow key (previous page).
    Left,
    /// Right arrow key (next page).
    Right,
    /// Home key (first page).
    Home,
    /// End key (last page).
    End,
}

/// Pointer input in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    /// Button pressed: a gesture starts here.
    Down(Point),
    /// Moved with the button held.
    Drag(Point),
    /// Button released or pointer left the surface.
    Up,
}
