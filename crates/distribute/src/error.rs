//! Distribution Error Types

use derive_more::{Display, Error};

/// A distribution error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for distribution planning.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Two resources share a name, so their last-needed positions would
    /// collide.
    #[display("duplicate resource name: {_0}")]
    DuplicateResource(#[error(not(source))] String),
    #[display("recipient without an email address at position {_0}")]
    InvalidRecipient(#[error(not(source))] usize),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
