//! [`DocumentStore`] implementation over the SQLite database.

use crate::Database;
use async_trait::async_trait;
use exn::ResultExt;
use partbook_storage::error::{ErrorKind, Result};
use partbook_storage::{Document, DocumentStore, Record};
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    record: String,
}
impl TryFrom<DocumentRow> for Document {
    type Error = partbook_storage::error::Error;
    fn try_from(row: DocumentRow) -> Result<Self> {
        let record: Record = serde_json::from_str(&row.record)
            .or_raise(|| ErrorKind::InvalidRecord(format!("stored record for `{}` is not an object", row.id)))?;
        Ok(Self { id: row.id, record })
    }
}

fn database() -> ErrorKind {
    ErrorKind::BackendError("sqlite query failed".to_string())
}

fn serialize(record: &Record) -> Result<String> {
    serde_json::to_string(record).or_raise(|| ErrorKind::InvalidRecord("record is not serializable".to_string()))
}

/// Documents stored as JSON text in a single SQLite table.
///
/// # Examples
///
/// ```
/// use partbook_documents::{Database, SqliteDocuments};
/// use partbook_storage::DocumentStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SqliteDocuments::from(&Database::connect_in_memory().await?);
/// assert!(store.list("meta", "org").await?.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteDocuments {
    name: String,
    pool: SqlitePool,
}
impl From<&Database> for SqliteDocuments {
    fn from(db: &Database) -> Self {
        Self { name: "sqlite".to_string(), pool: db.pool().clone() }
    }
}
impl SqliteDocuments {
    /// Change the name of the store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn address(collection: &str, org: &str, id: &str) -> String {
        format!("{collection}/{org}/{id}")
    }

    fn json_path(field: &str) -> String {
        format!("$.\"{}\"", field.replace('"', "\\\""))
    }
}

#[async_trait]
impl DocumentStore for SqliteDocuments {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "debug", skip(self, record), fields(backend = %self.name))]
    async fn upsert(&self, collection: &str, org: &str, id: &str, record: Record) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_document.sql"))
            .bind(collection)
            .bind(org)
            .bind(id)
            .bind(serialize(&record)?)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(database)?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, patches), fields(backend = %self.name))]
    async fn update(&self, collection: &str, org: &str, id: &str, patches: Record) -> Result<()> {
        // SQLite's json_patch() merges nested objects recursively and treats
        // nulls as deletions, so the shallow merge happens here instead.
        let mut tx = self.pool.begin().await.or_raise(database)?;
        let row: Option<DocumentRow> = sqlx::query_as(include_str!("../queries/get_document.sql"))
            .bind(collection)
            .bind(org)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(database)?;
        let Some(row) = row else {
            exn::bail!(ErrorKind::NotFound(Self::address(collection, org, id)));
        };
        let mut document = Document::try_from(row)?;
        document.record.extend(patches);
        sqlx::query(include_str!("../queries/replace_record.sql"))
            .bind(collection)
            .bind(org)
            .bind(id)
            .bind(serialize(&document.record)?)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&mut *tx)
            .await
            .or_raise(database)?;
        tx.commit().await.or_raise(database)?;
        Ok(())
    }

    async fn get(&self, collection: &str, org: &str, id: &str) -> Result<Option<Record>> {
        let row: Option<DocumentRow> = sqlx::query_as(include_str!("../queries/get_document.sql"))
            .bind(collection)
            .bind(org)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(database)?;
        Ok(row.map(Document::try_from).transpose()?.map(|document| document.record))
    }

    #[instrument(level = "debug", skip(self), fields(backend = %self.name))]
    async fn delete(&self, collection: &str, org: &str, id: &str) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_document.sql"))
            .bind(collection)
            .bind(org)
            .bind(id)
            .execute(&self.pool)
            .await
            .or_raise(database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(Self::address(collection, org, id)));
        }
        Ok(())
    }

    async fn query_by_field_prefix(
        &self,
        collection: &str,
        org: &str,
        field: &str,
        prefix: &str,
    ) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(include_str!("../queries/query_by_field_prefix.sql"))
            .bind(collection)
            .bind(org)
            .bind(Self::json_path(field))
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .or_raise(database)?;
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn list(&self, collection: &str, org: &str) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(include_str!("../queries/list_documents.sql"))
            .bind(collection)
            .bind(org)
            .fetch_all(&self.pool)
            .await
            .or_raise(database)?;
        rows.into_iter().map(Document::try_from).collect()
    }
}
