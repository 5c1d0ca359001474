//! Per-page stroke history.
//!
//! Strokes are only ever appended. Insertion order is display order, so
//! replaying a page reproduces exactly what both parties drew, in the order
//! this side learned about it.

use std::collections::BTreeMap;

use cosign_proto::Stroke;

/// Drawing surface that history is replayed onto.
pub trait Canvas {
    /// Erase everything currently shown.
    fn clear(&mut self);

    /// Draw one stroke on top of what is shown.
    fn draw_stroke(&mut self, stroke: &Stroke);
}

/// A stroke list is the simplest surface: it records what would be painted.
impl Canvas for Vec<Stroke> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn draw_stroke(&mut self, stroke: &Stroke) {
        self.push(stroke.clone());
    }
}

/// Append-only mapping page → ordered strokes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationHistory {
    pages: BTreeMap<u32, Vec<Stroke>>,
}

impl AnnotationHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `stroke` to `page`.
    pub fn append(&mut self, page: u32, stroke: Stroke) {
        self.pages.entry(page).or_default().push(stroke);
    }

    /// Strokes on `page` in insertion order. Empty if none.
    pub fn strokes(&self, page: u32) -> &[Stroke] {
        self.pages.get(&page).map_or(&[][..], Vec::as_slice)
    }

    /// Number of strokes on `page`.
    pub fn len(&self, page: u32) -> usize {
        self.strokes(page).len()
    }

    /// Total strokes across all pages.
    pub fn total(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    /// True if no stroke was ever appended.
    pub fn is_empty(&self) -> bool {
        self.pages.values().all(Vec::is_empty)
    }

    /// Pages that have at least one stroke, ascending.
    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().filter(|(_, s)| !s.is_empty()).map(|(page, _)| *page)
    }

    /// Clear `canvas` and redraw every stroke of `page` in insertion order.
    ///
    /// Returns the number of strokes drawn. Cost is linear in the page's
    /// history and paid on every switch.
    pub fn replay(&self, page: u32, canvas: &mut impl Canvas) -> usize {
        canvas.clear();
        let strokes = self.strokes(page);
        for stroke in strokes {
            canvas.draw_stroke(stroke);
        }
        strokes.len()
    }
}
