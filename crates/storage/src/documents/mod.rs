//! Document storage trait and the in-memory implementation.
//!
//! Documents are JSON objects addressed by `(collection, org, id)`. The
//! interface mirrors what a hosted document database offers and nothing
//! more: whole-record upsert, shallow field patches, point reads, deletes,
//! and string-prefix queries against a single field.

mod memory;

pub use self::memory::MemoryDocuments;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A document body: a JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A stored document and its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub record: Record,
}
impl Document {
    /// Decode the record into a typed value.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        decode(self.record)
    }
}

/// Encode a typed value as a [`Record`]. The value must serialize to a JSON
/// object.
pub fn encode<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value).or_raise(|| ErrorKind::InvalidRecord("unserializable value".to_string()))? {
        serde_json::Value::Object(record) => Ok(record),
        other => exn::bail!(ErrorKind::InvalidRecord(format!("expected an object, got {other}"))),
    }
}

/// Decode a [`Record`] into a typed value.
pub fn decode<T: DeserializeOwned>(record: Record) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(record))
        .or_raise(|| ErrorKind::InvalidRecord("record does not match the expected shape".to_string()))
}

/// Unified interface for document storage backends.
///
/// All methods are scoped to one organization; documents of different
/// organizations never see each other, even within the same collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Create or fully replace a document.
    async fn upsert(&self, collection: &str, org: &str, id: &str, record: Record) -> Result<()>;

    /// Shallow-merge `patches` into an existing document: each top-level
    /// field in `patches` replaces the field of the same name.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// document does not exist.
    async fn update(&self, collection: &str, org: &str, id: &str, patches: Record) -> Result<()>;

    /// Fetch a document, or `None` if it does not exist.
    async fn get(&self, collection: &str, org: &str, id: &str) -> Result<Option<Record>>;

    /// Delete a document.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the
    /// document does not exist.
    async fn delete(&self, collection: &str, org: &str, id: &str) -> Result<()>;

    /// All documents whose string field `field` starts with `prefix`
    /// (case-sensitive), ordered by id. Documents where the field is missing
    /// or not a string never match. An empty prefix matches every document
    /// that has the field.
    async fn query_by_field_prefix(&self, collection: &str, org: &str, field: &str, prefix: &str)
    -> Result<Vec<Document>>;

    /// All documents in a collection for an organization, ordered by id.
    async fn list(&self, collection: &str, org: &str) -> Result<Vec<Document>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Piece {
        title: String,
        year: Option<u16>,
    }

    #[test]
    fn test_encode_decode() {
        let piece = Piece { title: "Bolero".to_string(), year: Some(1928) };
        let record = encode(&piece).unwrap();
        assert_eq!(record.get("title").and_then(|v| v.as_str()), Some("Bolero"));
        assert_eq!(decode::<Piece>(record).unwrap(), piece);
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        let err = encode(&"just a string").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRecord(_)));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let mut record = Record::new();
        record.insert("title".to_string(), serde_json::Value::from(42));
        assert!(decode::<Piece>(record).is_err());
    }
}
