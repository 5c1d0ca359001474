//! Application sync protocol carried over the direct peer channel.
//!
//! Each message is a JSON object discriminated by `type`:
//!
//! ```text
//! {"type":"control","enabled":true}
//! {"type":"draw","point":{"x":..,"y":..,"prevX":..,"prevY":..,"color":"red","width":2},"page":0}
//! {"type":"page-change","page":1}
//! ```
//!
//! The channel carries no schema version, so decoding is lenient at the
//! receiver: anything that fails [`SyncMessage::decode`] is dropped without
//! touching local state.

use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, ProtocolError};

/// A position on the document surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal offset from the left edge
    pub x: f64,
    /// Vertical offset from the top edge
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One segment of a pen gesture, from `(prev_x, prev_y)` to `(x, y)`.
///
/// Immutable once created. The page is not part of the stroke; it is the key
/// under which the stroke is stored and the `page` field of the carrying
/// message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    /// End point x
    pub x: f64,
    /// End point y
    pub y: f64,
    /// Start point x
    pub prev_x: f64,
    /// Start point y
    pub prev_y: f64,
    /// Pen color (CSS color name or hex)
    pub color: String,
    /// Pen width in surface units
    pub width: f64,
}

impl Stroke {
    /// Create a stroke from `from` to `to`.
    pub fn new(from: Point, to: Point, color: impl Into<String>, width: f64) -> Self {
        Self { x: to.x, y: to.y, prev_x: from.x, prev_y: from.y, color: color.into(), width }
    }

    /// Start point.
    #[must_use]
    pub fn from(&self) -> Point {
        Point::new(self.prev_x, self.prev_y)
    }

    /// End point.
    #[must_use]
    pub fn to(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Finite coordinates and a positive finite width.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.prev_x, self.prev_y].iter().all(|v| v.is_finite())
            && self.width.is_finite()
            && self.width > 0.0
    }
}

/// Message exchanged over the peer channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncMessage {
    /// New value of the shared write-access flag.
    Control {
        /// Whether the counter-party may draw
        enabled: bool,
    },
    /// One stroke appended to a page.
    Draw {
        /// The stroke
        point: Stroke,
        /// Page the stroke belongs to
        page: u32,
    },
    /// New value of the shared page cursor.
    PageChange {
        /// Zero-based page index
        page: u32,
    },
}

impl SyncMessage {
    /// Wire name of the message kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Control { .. } => "control",
            Self::Draw { .. } => "draw",
            Self::PageChange { .. } => "page-change",
        }
    }

    /// Serialize to JSON text.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::JsonEncode(e.to_string()))
    }

    /// Parse JSON text.
    ///
    /// Rejects unknown `type` values, missing fields, negative pages and
    /// strokes with non-finite geometry.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let message: Self = serde_json::from_str(text)?;

        if let Self::Draw { point, .. } = &message
            && !point.is_well_formed()
        {
            return Err(DecodeError::InvalidStroke);
        }

        Ok(message)
    }
}
