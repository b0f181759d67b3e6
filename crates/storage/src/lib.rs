//! Storage collaborators for partbook.
//!
//! Two narrow interfaces sit underneath the resource stores:
//!
//! - [`ObjectStore`]: flat `bucket/key → bytes` blob storage (S3 and friends).
//! - [`DocumentStore`]: JSON records grouped by collection and organization,
//!   with the single query shape the resource stores need (string prefix on
//!   one field).
//!
//! Both are object-safe async traits; backends are picked at runtime.

pub mod documents;
pub mod error;
mod key;
pub mod objects;

pub use crate::documents::{Document, DocumentStore, Record};
pub use crate::key::{validate_bucket, validate_key};
pub use crate::objects::ObjectStore;
use std::sync::Arc;

pub type ObjectHandle = Arc<dyn ObjectStore + Send + Sync>;
pub type DocumentHandle = Arc<dyn DocumentStore + Send + Sync>;
