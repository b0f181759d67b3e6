//! SQLite document database for partbook.
//!
//! Holds resource metadata, projects and organization registrations as JSON
//! documents, implementing [`DocumentStore`](partbook_storage::DocumentStore)
//! for deployments that need durability without a hosted document database.
//! Part contents never live here; they go to an
//! [`ObjectStore`](partbook_storage::ObjectStore).

mod db;
pub mod error;
mod store;

pub use crate::db::Database;
pub use crate::store::SqliteDocuments;
