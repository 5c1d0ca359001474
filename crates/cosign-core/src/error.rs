//! Errors for document state operations.
//!
//! All of these are rejected before any side effect: state is unchanged and
//! nothing reaches the wire.

use thiserror::Error;

/// Rejected document operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// Page index outside `[0, page_count)`.
    #[error("page {page} out of bounds (document has {page_count} pages)")]
    PageOutOfBounds {
        /// Requested page
        page: u32,
        /// Number of pages in the document
        page_count: u32,
    },

    /// Local stroke input while write access is disabled.
    #[error("write access is disabled")]
    WriteAccessDenied,

    /// Stroke with non-finite geometry or non-positive width.
    #[error("malformed stroke")]
    MalformedStroke,
}
