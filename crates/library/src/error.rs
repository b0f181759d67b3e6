//! Library Error Types
//!
//! Every fallible operation on a resource store or the download pipeline
//! returns one of these kinds. Errors from the storage collaborators and the
//! archive engine are kept as children of the kind that describes what the
//! library was doing at the time.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource has no content matching the request.
    #[display("resource not found: {_0}")]
    ResourceNotFound(#[error(not(source))] String),
    /// No metadata is registered under the resource id.
    #[display("resource metadata not found: {_0}")]
    ResourceMetadataNotFound(#[error(not(source))] String),
    #[display("project not found: {_0}")]
    ProjectNotFound(#[error(not(source))] String),
    #[display("organization not found: {_0}")]
    OrganizationNotFound(#[error(not(source))] String),
    /// Invalid zip bytes, an invalid PDF, or a bad page range.
    #[display("archive error")]
    Archive,
    /// One or more parts of a submission could not be stored. The first
    /// failure is attached as the child error.
    #[display("{failures} part upload(s) failed")]
    Upload { failures: usize },
    #[display("operation cancelled")]
    Cancelled,
    /// The caller-supplied writer failed.
    #[display("failed to write output")]
    Output,
    /// The object store failed.
    #[display("storage error")]
    Storage,
    /// The document store failed.
    #[display("document store error")]
    Documents,
    /// A stored record could not be decoded.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Sanitizing the identifying fields left nothing to identify by.
    #[display("invalid identity: {_0}")]
    InvalidIdentity(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Partially failed submissions are safe to retry: parts are overwritten
    /// by name, never duplicated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upload { .. } | Self::Storage | Self::Documents)
    }
}
