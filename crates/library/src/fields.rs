//! Static field registry.
//!
//! Each record kind lists its string fields once, as `(name, extractor)`
//! pairs. Prefix queries are expressed in terms of these names, which lets
//! the in-memory store evaluate them directly and the persistent store map
//! them onto indexed document fields.

use crate::models::{MetaData, Project};

/// A named string field of `T`.
pub struct Field<T: 'static> {
    pub name: &'static str,
    pub extract: fn(&T) -> &str,
}
impl<T: 'static> Field<T> {
    pub fn get<'a>(&self, record: &'a T) -> &'a str {
        (self.extract)(record)
    }

    /// Name of the lowercased copy of this field stored alongside persisted
    /// records, so that prefix queries can ignore case.
    pub fn index_key(&self) -> String {
        format!("{}_key", self.name)
    }
}

/// Record kinds with registered string fields.
pub trait Fields: Sized + 'static {
    const FIELDS: &'static [Field<Self>];

    fn field(name: &str) -> Option<&'static Field<Self>> {
        Self::FIELDS.iter().find(|field| field.name == name)
    }
}

fn title(meta: &MetaData) -> &str {
    &meta.title
}
fn composer(meta: &MetaData) -> &str {
    &meta.composer
}
fn arranger(meta: &MetaData) -> &str {
    &meta.arranger
}
fn genre(meta: &MetaData) -> &str {
    &meta.genre
}
fn publisher(meta: &MetaData) -> &str {
    &meta.publisher
}
fn catalog_number(meta: &MetaData) -> &str {
    &meta.catalog_number
}

impl Fields for MetaData {
    const FIELDS: &'static [Field<Self>] = &[
        Field { name: "title", extract: title },
        Field { name: "composer", extract: composer },
        Field { name: "arranger", extract: arranger },
        Field { name: "genre", extract: genre },
        Field { name: "publisher", extract: publisher },
        Field { name: "catalog_number", extract: catalog_number },
    ];
}

fn project_name(project: &Project) -> &str {
    &project.name
}

impl Fields for Project {
    const FIELDS: &'static [Field<Self>] = &[Field { name: "name", extract: project_name }];
}

/// Fields searched by [`meta_by_pattern`](crate::ResourceStore::meta_by_pattern).
pub(crate) const SEARCHABLE: [&str; 3] = ["title", "composer", "arranger"];

/// A case-insensitive prefix condition on one field.
pub(crate) struct Term {
    pub field: &'static Field<MetaData>,
    /// Already lowercased.
    pub prefix: String,
}
impl Term {
    pub fn matches(&self, meta: &MetaData) -> bool {
        self.field.get(meta).to_lowercase().starts_with(&self.prefix)
    }
}

/// The prefix terms of a search pattern: one per non-empty searchable field.
/// No terms means "match everything".
pub(crate) fn terms(pattern: &MetaData) -> Vec<Term> {
    SEARCHABLE
        .iter()
        .filter_map(|name| MetaData::field(name))
        .filter(|field| !field.get(pattern).is_empty())
        .map(|field| Term { field, prefix: field.get(pattern).to_lowercase() })
        .collect()
}

/// Whether `meta` satisfies any of `terms` (or there are none).
pub(crate) fn matches_any(meta: &MetaData, terms: &[Term]) -> bool {
    terms.is_empty() || terms.iter().any(|term| term.matches(meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_registry_lookup() {
        let meta = MetaData::new("Bolero", "Ravel", "");
        assert_eq!(MetaData::field("composer").unwrap().get(&meta), "Ravel");
        assert!(MetaData::field("status").is_none());
        assert_eq!(MetaData::field("title").unwrap().index_key(), "title_key");
        let project = Project::new("Gala", &[], time::OffsetDateTime::UNIX_EPOCH);
        assert_eq!(Project::field("name").unwrap().get(&project), "Gala");
    }

    #[test]
    fn test_searchable_fields_are_registered() {
        for name in SEARCHABLE {
            assert!(MetaData::field(name).is_some(), "{name} is not registered");
        }
    }

    #[test]
    fn test_terms_skip_empty_fields() {
        let mut pattern = MetaData::new("TEST", "", "Arr");
        pattern.genre = "ignored".to_string();
        let terms = terms(&pattern);
        let names: Vec<_> = terms.iter().map(|t| (t.field.name, t.prefix.as_str())).collect();
        assert_eq!(names, vec![("title", "test"), ("arranger", "arr")]);
        assert!(super::terms(&MetaData::default()).is_empty());
    }

    #[rstest]
    #[case(("test", "", ""), ("Testing Piece", "Someone", ""), true)]
    #[case(("test", "", ""), ("A Test", "Someone", ""), false)]
    #[case(("nomatch", "rav", ""), ("Bolero", "Ravel", ""), true)]
    #[case(("", "", ""), ("Anything", "", ""), true)]
    #[case(("", "", "x"), ("Bolero", "Ravel", ""), false)]
    fn test_matches_any(
        #[case] pattern: (&str, &str, &str),
        #[case] meta: (&str, &str, &str),
        #[case] expected: bool,
    ) {
        let pattern = MetaData::new(pattern.0, pattern.1, pattern.2);
        let meta = MetaData::new(meta.0, meta.1, meta.2);
        assert_eq!(matches_any(&meta, &terms(&pattern)), expected);
    }
}
