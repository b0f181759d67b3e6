//! Resource library for partbook.
//!
//! Ties content addressing ([`identity`]), the record types ([`models`]) and
//! the [`ResourceStore`] implementations together, and provides the
//! [`download`] pipeline that turns a stored resource back into a zip
//! archive or a single part.

pub mod download;
pub mod error;
pub mod fields;
pub mod identity;
pub mod models;
pub mod store;

pub use crate::download::{Delivered, Download, Request};
pub use crate::store::{MemoryStore, PersistentStore, ResourceStore, ScopedStore, StoreHandle};
