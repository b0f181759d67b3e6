//! Content addressing.
//!
//! A resource is identified by its sanitized title, composer and arranger,
//! so resubmitting the same piece always lands on the same resource.

use crate::models::MetaData;
use regex::Regex;
use std::sync::LazyLock;

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new("[^a-z0-9_]").unwrap());

/// Lowercase `value` and delete every character outside `[a-z0-9_]`.
///
/// ```
/// assert_eq!(partbook_library::identity::sanitize("Boléro (Op. 81)"), "bolroop81");
/// ```
pub fn sanitize(value: &str) -> String {
    DISALLOWED.replace_all(&value.to_lowercase(), "").into_owned()
}

/// Resource id: the non-empty sanitized values of title, composer and
/// arranger, joined with `_`.
///
/// Other metadata fields never affect the id. The result is empty when all
/// three fields sanitize to nothing.
///
/// ```
/// use partbook_library::identity::resource_id;
/// use partbook_library::models::MetaData;
///
/// let meta = MetaData::new("Boléro", "Maurice Ravel", "");
/// assert_eq!(resource_id(&meta), "bolro_mauriceravel");
/// ```
pub fn resource_id(meta: &MetaData) -> String {
    [&meta.title, &meta.composer, &meta.arranger]
        .into_iter()
        .map(|field| sanitize(field))
        .filter(|field| !field.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Project id: the sanitized project name.
pub fn project_id(name: &str) -> String {
    sanitize(name)
}
