//! Document database error types.

use derive_more::{Display, Error};

/// A document database error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for document database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The connection pool could not be created, or a query failed.
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored record is not a JSON object.
    #[display("invalid stored record: {_0}")]
    InvalidData(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
