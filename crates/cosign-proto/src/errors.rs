//! Protocol error types.

use thiserror::Error;

/// Result alias for framing and relay encoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from framing and relay message encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame body exceeds [`crate::codec::MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Claimed or actual body size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Fewer bytes available than the length prefix claims.
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    FrameTruncated {
        /// Body size from the length prefix
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// CBOR serialization failed.
    #[error("CBOR encode error: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode error: {0}")]
    CborDecode(String),

    /// JSON serialization failed.
    #[error("JSON encode error: {0}")]
    JsonEncode(String),

    /// Session identifier is empty or contains forbidden characters.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
}

/// Reasons a sync message is dropped on receipt.
///
/// Receivers never propagate these further than a debug log.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Invalid JSON, unknown `type`, or missing fields.
    #[error("malformed sync message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Stroke carries a non-finite coordinate or a non-positive width.
    #[error("stroke geometry out of range")]
    InvalidStroke,
}
