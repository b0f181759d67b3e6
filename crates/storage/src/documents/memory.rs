//! In-memory document storage backend.

use super::{Document, DocumentStore, Record};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

type Collection = BTreeMap<(String, String), BTreeMap<String, Record>>;

/// In-memory document storage backend.
///
/// Documents live in nested `BTreeMap`s behind a [`RwLock`], keyed by
/// `(collection, org)` and then by id, so listings are naturally ordered by
/// id. Prefix queries are a linear scan.
///
/// # Examples
///
/// ```
/// use partbook_storage::DocumentStore;
/// use partbook_storage::documents::MemoryDocuments;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryDocuments::default();
/// let record = json!({ "title": "Bolero" }).as_object().cloned().unwrap();
/// store.upsert("meta", "org", "bolero", record).await?;
///
/// let found = store.query_by_field_prefix("meta", "org", "title", "Bol").await?;
/// assert_eq!(found[0].id, "bolero");
/// # Ok(())
/// # }
/// ```
pub struct MemoryDocuments {
    name: String,
    storage: RwLock<Collection>,
}

impl MemoryDocuments {
    /// Change the name of the store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn address(collection: &str, org: &str, id: &str) -> String {
        format!("{collection}/{org}/{id}")
    }
}
impl Default for MemoryDocuments {
    fn default() -> Self {
        Self { name: "memory".to_string(), storage: RwLock::new(BTreeMap::new()) }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, collection: &str, org: &str, id: &str, record: Record) -> Result<()> {
        let mut guard = self.storage.write().await;
        guard.entry((collection.to_string(), org.to_string())).or_default().insert(id.to_string(), record);
        Ok(())
    }

    async fn update(&self, collection: &str, org: &str, id: &str, patches: Record) -> Result<()> {
        let mut guard = self.storage.write().await;
        let existing = guard
            .get_mut(&(collection.to_string(), org.to_string()))
            .and_then(|documents| documents.get_mut(id));
        match existing {
            Some(record) => {
                record.extend(patches);
                Ok(())
            },
            None => exn::bail!(ErrorKind::NotFound(Self::address(collection, org, id))),
        }
    }

    async fn get(&self, collection: &str, org: &str, id: &str) -> Result<Option<Record>> {
        let guard = self.storage.read().await;
        Ok(guard.get(&(collection.to_string(), org.to_string())).and_then(|documents| documents.get(id)).cloned())
    }

    async fn delete(&self, collection: &str, org: &str, id: &str) -> Result<()> {
        let mut guard = self.storage.write().await;
        let removed = guard
            .get_mut(&(collection.to_string(), org.to_string()))
            .and_then(|documents| documents.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(Self::address(collection, org, id))),
        }
    }

    async fn query_by_field_prefix(
        &self,
        collection: &str,
        org: &str,
        field: &str,
        prefix: &str,
    ) -> Result<Vec<Document>> {
        let guard = self.storage.read().await;
        let Some(documents) = guard.get(&(collection.to_string(), org.to_string())) else {
            return Ok(Vec::new());
        };
        Ok(documents
            .iter()
            .filter(|(_, record)| record.get(field).and_then(|v| v.as_str()).is_some_and(|v| v.starts_with(prefix)))
            .map(|(id, record)| Document { id: id.clone(), record: record.clone() })
            .collect())
    }

    async fn list(&self, collection: &str, org: &str) -> Result<Vec<Document>> {
        let guard = self.storage.read().await;
        Ok(guard
            .get(&(collection.to_string(), org.to_string()))
            .map(|documents| {
                documents.iter().map(|(id, record)| Document { id: id.clone(), record: record.clone() }).collect()
            })
            .unwrap_or_default())
    }
}
