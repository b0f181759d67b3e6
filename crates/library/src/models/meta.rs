use crate::identity;
use serde::{Deserialize, Serialize};

/// Whether every part of a resource has been stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Registered, but at least one part is missing or failed to store.
    #[default]
    Pending,
    Finished,
}

/// Descriptive metadata of a musical piece.
///
/// Only `title`, `composer` and `arranger` take part in the resource id; the
/// rest are free-form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaData {
    pub title: String,
    pub composer: String,
    pub arranger: String,
    pub genre: String,
    pub year: Option<u16>,
    pub instrumentation: String,
    pub duration: String,
    pub publisher: String,
    pub catalog_number: String,
    pub tags: Vec<String>,
    pub notes: String,
    pub status: Status,
}

impl MetaData {
    /// Metadata with only the identifying fields set.
    pub fn new(title: impl Into<String>, composer: impl Into<String>, arranger: impl Into<String>) -> Self {
        Self { title: title.into(), composer: composer.into(), arranger: arranger.into(), ..Self::default() }
    }

    /// See [`identity::resource_id`].
    pub fn id(&self) -> String {
        identity::resource_id(self)
    }
}
