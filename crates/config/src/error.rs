//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading and validation.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No home directory to look for a configuration file in.
    #[display("could not determine the user configuration directory")]
    NoConfigDirectory,
    /// A source could not be read or parsed.
    #[display("failed to load configuration")]
    Load,
    /// The merged configuration is not usable.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// The backend exists but was not compiled in.
    #[display("backend not supported by this build: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// A configured backend could not be opened.
    #[display("failed to open {_0} backend")]
    Backend(#[error(not(source))] String),
}
