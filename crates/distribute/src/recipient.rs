use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A performer receiving parts by email.
///
/// Instrument-group labels ("Trumpet", "Low Brass", ...) are kept per
/// organization, since the same person may play different instruments in
/// different ensembles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(default)]
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into(), groups: BTreeMap::new() }
    }

    /// Add instrument-group labels for `org`.
    pub fn with_groups<I, S>(mut self, org: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.entry(org.into()).or_default().extend(labels.into_iter().map(Into::into));
        self
    }

    /// Instrument-group labels for `org`; empty for unknown organizations.
    pub fn groups_for<'a>(&'a self, org: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups.get(org).into_iter().flatten().map(String::as_str)
    }
}
