//! Opening the configured backends.

use crate::error::{ErrorKind, Result};
use crate::settings::{Config, DocumentBackend, ObjectBackend};
use exn::ResultExt;
use partbook_documents::{Database, SqliteDocuments};
use partbook_library::{PersistentStore, StoreHandle};
use partbook_storage::documents::MemoryDocuments;
use partbook_storage::objects::{LocalObjects, MemoryObjects};
use partbook_storage::{DocumentHandle, ObjectHandle};
use std::sync::Arc;

impl Config {
    pub fn object_store(&self) -> Result<ObjectHandle> {
        let store: ObjectHandle = match &self.objects {
            ObjectBackend::Memory => Arc::new(MemoryObjects::default()),
            ObjectBackend::Local { root } => {
                Arc::new(LocalObjects::new("local", root).or_raise(|| ErrorKind::Backend("local".to_string()))?)
            },
            #[cfg(feature = "s3")]
            ObjectBackend::S3 { region, endpoint, key_id, key_secret, .. } => Arc::new(
                partbook_storage::objects::S3Objects::new("s3", region, endpoint.as_deref(), key_id, key_secret.expose()),
            ),
            #[cfg(not(feature = "s3"))]
            ObjectBackend::S3 { .. } => exn::bail!(ErrorKind::Unsupported("s3".to_string())),
        };
        tracing::info!(backend = store.name(), "Opened object store");
        Ok(store)
    }

    /// Open the document store. SQLite databases are created and migrated as
    /// needed.
    pub async fn document_store(&self) -> Result<DocumentHandle> {
        let store: DocumentHandle = match &self.documents {
            DocumentBackend::Memory => Arc::new(MemoryDocuments::default()),
            DocumentBackend::Sqlite { path } => {
                let db = Database::connect(path).await.or_raise(|| ErrorKind::Backend("sqlite".to_string()))?;
                Arc::new(SqliteDocuments::from(&db))
            },
        };
        tracing::info!(backend = store.name(), "Opened document store");
        Ok(store)
    }

    /// A [`PersistentStore`] over the configured backends.
    pub async fn resource_store(&self) -> Result<StoreHandle> {
        let store = PersistentStore::new(self.object_store()?, self.document_store().await?, self.bucket())
            .with_upload_concurrency(self.upload_concurrency);
        Ok(Arc::new(store))
    }
}
