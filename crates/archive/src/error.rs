//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bytes could not be parsed as a zip archive, or an entry inside it could
    /// not be read. Don't retry with the same input.
    #[display("invalid or corrupted archive")]
    InvalidArchive,
    /// Bytes could not be parsed as a PDF document.
    #[display("invalid or corrupted document")]
    InvalidDocument,
    /// An assignment asked for pages the document doesn't have.
    #[display("invalid page range {from}-{to} for part '{id}' (document has {pages} pages)")]
    PageRange { id: String, from: u32, to: u32, pages: u32 },
    /// Writing an archive or document failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
