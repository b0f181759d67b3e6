//! Layered configuration for partbook.
//!
//! Values are merged in order, later sources winning:
//!
//! 1. built-in defaults (in-memory backends, bucket `partbook`)
//! 2. `partbook.toml`, `partbook.yaml` or `partbook.json` in the user
//!    configuration directory, or an explicit file
//! 3. `PARTBOOK_*` environment variables, with `__` separating nested keys
//!    (`PARTBOOK_OBJECTS__TYPE=local`, `PARTBOOK_OBJECTS__ROOT=/srv/partbook`)

mod backend;
pub mod error;
mod settings;

pub use crate::settings::{Config, DocumentBackend, ObjectBackend, Secret};
