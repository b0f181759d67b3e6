//! Resource store over an object store and a document store.

use super::{PartStream, ResourceStore, cancellable, ensure_active, latest_by_name, require_identity};
use crate::error::{Error, ErrorKind, Result};
use crate::fields::{self, Fields, SEARCHABLE};
use crate::identity::project_id;
use crate::models::{MetaData, Part, Project, Status};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use partbook_storage::documents::{decode, encode};
use partbook_storage::{Document, DocumentHandle, ObjectHandle, Record, validate_bucket};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const ORGANIZATIONS: &str = "organizations";
const METADATA: &str = "metadata";
const PROJECTS: &str = "projects";
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// First failure and failure count of one submission's uploads.
#[derive(Default)]
struct Failures {
    first: Option<Error>,
    count: usize,
}

fn record_failure(cell: &Mutex<Failures>, err: Error) {
    let mut failures = cell.lock().unwrap_or_else(PoisonError::into_inner);
    failures.count += 1;
    if failures.first.is_none() {
        failures.first = Some(err);
    }
}

/// Resource store backed by storage collaborators.
///
/// Each part is its own object, keyed `{org}/{resource id}/{part name}`
/// inside one bucket, so resubmitting simply overwrites parts by name.
/// Organizations, metadata and projects are documents. Metadata documents
/// carry a lowercased copy of every searchable field (`title_key` and so
/// on) so the document store's case-sensitive prefix query can serve
/// case-insensitive searches.
///
/// Parts of one submission are uploaded concurrently, at most
/// `upload_concurrency` at a time.
///
/// # Examples
///
/// ```
/// use partbook_library::models::{MetaData, Part};
/// use partbook_library::{PersistentStore, ResourceStore};
/// use partbook_storage::documents::MemoryDocuments;
/// use partbook_storage::objects::MemoryObjects;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cancel = CancellationToken::new();
/// let store = PersistentStore::new(Arc::new(MemoryObjects::default()), Arc::new(MemoryDocuments::default()), "scores")
///     .with_upload_concurrency(4);
/// store.register_organization(&cancel, "orchestra").await?;
///
/// let parts = vec![Part::new("Flute.pdf", b"%PDF".to_vec()), Part::new("Oboe.pdf", b"%PDF".to_vec())];
/// let id = store.submit(&cancel, "orchestra", MetaData::new("Bolero", "Ravel", ""), parts).await?;
/// assert_eq!(store.parts(&cancel, "orchestra", &id).await?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct PersistentStore {
    name: String,
    objects: ObjectHandle,
    documents: DocumentHandle,
    bucket: String,
    upload_concurrency: usize,
}

impl PersistentStore {
    pub fn new(objects: ObjectHandle, documents: DocumentHandle, bucket: impl Into<String>) -> Self {
        Self {
            name: format!("{}+{}", objects.name(), documents.name()),
            objects,
            documents,
            bucket: bucket.into(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Maximum number of parts uploaded at once (at least one).
    pub fn with_upload_concurrency(mut self, upload_concurrency: usize) -> Self {
        self.upload_concurrency = upload_concurrency.max(1);
        self
    }

    /// Change the name of the store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn object_prefix(org: &str, id: &str) -> String {
        format!("{org}/{id}/")
    }

    fn meta_record(meta: &MetaData) -> Result<Record> {
        let mut record = encode(meta).or_raise(|| ErrorKind::InvalidData("metadata".to_string()))?;
        for field in SEARCHABLE.iter().filter_map(|name| MetaData::field(name)) {
            record.insert(field.index_key(), Value::String(field.get(meta).to_lowercase()));
        }
        Ok(record)
    }

    fn decode_meta(document: Document) -> Result<MetaData> {
        let id = document.id.clone();
        document.decode().or_raise(|| ErrorKind::InvalidData(format!("metadata `{id}`")))
    }

    fn decode_project(id: &str, record: Record) -> Result<Project> {
        decode(record).or_raise(|| ErrorKind::InvalidData(format!("project `{id}`")))
    }

    async fn ensure_org(&self, org: &str) -> Result<()> {
        match self.documents.get(ORGANIZATIONS, org, org).await.or_raise(|| ErrorKind::Documents)? {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::OrganizationNotFound(org.to_string())),
        }
    }

    async fn find_meta(&self, org: &str, id: &str) -> Result<Option<Record>> {
        self.documents.get(METADATA, org, id).await.or_raise(|| ErrorKind::Documents)
    }

    async fn find_project(&self, org: &str, id: &str) -> Result<Project> {
        match self.documents.get(PROJECTS, org, id).await.or_raise(|| ErrorKind::Documents)? {
            Some(record) => Self::decode_project(id, record),
            None => exn::bail!(ErrorKind::ProjectNotFound(id.to_string())),
        }
    }

    async fn save_project(&self, org: &str, id: &str, project: &Project) -> Result<()> {
        let record = encode(project).or_raise(|| ErrorKind::InvalidData(format!("project `{id}`")))?;
        self.documents.upsert(PROJECTS, org, id, record).await.or_raise(|| ErrorKind::Documents)
    }

    async fn upload(&self, org: &str, id: &str, part: Part) -> Result<()> {
        let key = format!("{}{}", Self::object_prefix(org, id), part.name);
        self.objects.put(&self.bucket, &key, &part.data).await.or_raise(|| ErrorKind::Storage)?;
        tracing::debug!(org, id, part = %part.name, size = part.data.len(), "Stored part");
        Ok(())
    }

    async fn store(&self, org: &str, meta: MetaData, parts: Vec<Part>) -> Result<String> {
        let id = require_identity(meta.id(), "resource")?;
        self.ensure_org(org).await?;
        let created = self.find_meta(org, &id).await?.is_none();
        if created {
            let record = Self::meta_record(&MetaData { status: Status::Pending, ..meta })?;
            self.documents.upsert(METADATA, org, &id, record).await.or_raise(|| ErrorKind::Documents)?;
            tracing::info!(org, id, "Registered new resource");
        }
        // Nothing to store: a resource left pending by a failed upload stays so.
        if parts.is_empty() && !created {
            return Ok(id);
        }

        // Concurrent puts of one key finish in any order; keep the last part.
        let parts = latest_by_name(parts);
        let total = parts.len();
        let failures = Mutex::new(Failures::default());
        {
            let (failures, id) = (&failures, id.as_str());
            let mut queue = parts.into_iter().map(|part| async move {
                if let Err(e) = self.upload(org, id, part).await {
                    record_failure(failures, e);
                }
            });
            let mut uploading = FuturesUnordered::new();
            uploading.extend(queue.by_ref().take(self.upload_concurrency));
            while uploading.next().await.is_some() {
                if let Some(next) = queue.next() {
                    uploading.push(next);
                }
            }
        }
        let Failures { first, count } = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = first {
            tracing::warn!(org, id, failures = count, total, "Resource left pending after failed uploads");
            return Err(first.raise(ErrorKind::Upload { failures: count }));
        }

        let mut patch = Record::new();
        let status = serde_json::to_value(Status::Finished).or_raise(|| ErrorKind::InvalidData("status".to_string()))?;
        patch.insert("status".to_string(), status);
        self.documents.update(METADATA, org, &id, patch).await.or_raise(|| ErrorKind::Documents)?;
        tracing::info!(org, id, parts = total, "Resource finished");
        Ok(id)
    }

    async fn search(&self, org: &str, pattern: &MetaData) -> Result<Vec<MetaData>> {
        self.ensure_org(org).await?;
        let terms = fields::terms(pattern);
        let documents = match terms.is_empty() {
            true => self.documents.list(METADATA, org).await.or_raise(|| ErrorKind::Documents)?,
            false => {
                // Union of one query per term, ordered by id.
                let mut found = BTreeMap::new();
                for term in &terms {
                    let matches = self
                        .documents
                        .query_by_field_prefix(METADATA, org, &term.field.index_key(), &term.prefix)
                        .await
                        .or_raise(|| ErrorKind::Documents)?;
                    found.extend(matches.into_iter().map(|document| (document.id.clone(), document)));
                }
                found.into_values().collect()
            },
        };
        documents.into_iter().map(Self::decode_meta).collect()
    }

    /// Object keys of a resource's parts, sorted.
    async fn part_keys(&self, org: &str, id: &str) -> Result<Vec<String>> {
        self.ensure_org(org).await?;
        if self.find_meta(org, id).await?.is_none() {
            exn::bail!(ErrorKind::ResourceNotFound(id.to_string()));
        }
        let mut keys = self
            .objects
            .list(&self.bucket, &Self::object_prefix(org, id))
            .await
            .or_raise(|| ErrorKind::Storage)?;
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ResourceStore for PersistentStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_organization(&self, cancel: &CancellationToken, org: &str) -> Result<()> {
        ensure_active(cancel)?;
        if validate_bucket(org).is_err() {
            exn::bail!(ErrorKind::InvalidIdentity(format!("organization `{org}`")));
        }
        cancellable(cancel, async {
            if self.documents.get(ORGANIZATIONS, org, org).await.or_raise(|| ErrorKind::Documents)?.is_none() {
                let mut record = Record::new();
                record.insert("name".to_string(), Value::String(org.to_string()));
                self.documents.upsert(ORGANIZATIONS, org, org, record).await.or_raise(|| ErrorKind::Documents)?;
                tracing::info!(store = %self.name, org, "Registered organization");
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, cancel, meta, parts), fields(store = %self.name, parts = parts.len()))]
    async fn submit(&self, cancel: &CancellationToken, org: &str, meta: MetaData, parts: Vec<Part>) -> Result<String> {
        ensure_active(cancel)?;
        cancellable(cancel, self.store(org, meta, parts)).await
    }

    async fn meta_by_pattern(
        &self,
        cancel: &CancellationToken,
        org: &str,
        pattern: &MetaData,
    ) -> Result<Vec<MetaData>> {
        ensure_active(cancel)?;
        cancellable(cancel, self.search(org, pattern)).await
    }

    async fn meta_by_id(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<MetaData> {
        ensure_active(cancel)?;
        cancellable(cancel, async {
            self.ensure_org(org).await?;
            match self.find_meta(org, id).await? {
                Some(record) => Self::decode_meta(Document { id: id.to_string(), record }),
                None => exn::bail!(ErrorKind::ResourceMetadataNotFound(id.to_string())),
            }
        })
        .await
    }

    fn resource<'a>(&'a self, cancel: &'a CancellationToken, org: &'a str, id: &'a str) -> PartStream<'a> {
        Box::pin(stream! {
            let prefix = Self::object_prefix(org, id);
            let keys = match ensure_active(cancel) {
                Ok(()) => cancellable(cancel, self.part_keys(org, id)).await,
                Err(e) => Err(e),
            };
            let keys = match keys {
                Ok(keys) => keys,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            for key in keys {
                let name = key.strip_prefix(&prefix).unwrap_or(&key).to_string();
                let data = cancellable(cancel, async {
                    self.objects.get(&self.bucket, &key).await.or_raise(|| ErrorKind::Storage)
                })
                .await;
                match data {
                    Ok(data) => yield Ok(Part::new(name, data)),
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }
        })
    }

    #[instrument(skip(self, cancel, resource_ids), fields(store = %self.name))]
    async fn upsert_project(
        &self,
        cancel: &CancellationToken,
        org: &str,
        name: &str,
        resource_ids: &[String],
    ) -> Result<Project> {
        ensure_active(cancel)?;
        let id = require_identity(project_id(name), "project")?;
        cancellable(cancel, async {
            self.ensure_org(org).await?;
            let now = OffsetDateTime::now_utc();
            let project = match self.find_project(org, &id).await {
                Ok(mut project) => {
                    project.merge(resource_ids, now);
                    tracing::info!(org, project = %id, "Merged into existing project");
                    project
                },
                Err(e) if matches!(&*e, ErrorKind::ProjectNotFound(_)) => Project::new(name, resource_ids, now),
                Err(e) => return Err(e),
            };
            self.save_project(org, &id, &project).await?;
            Ok(project)
        })
        .await
    }

    async fn project_by_id(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<Project> {
        ensure_active(cancel)?;
        cancellable(cancel, async {
            self.ensure_org(org).await?;
            self.find_project(org, id).await
        })
        .await
    }

    async fn projects(&self, cancel: &CancellationToken, org: &str) -> Result<Vec<Project>> {
        ensure_active(cancel)?;
        cancellable(cancel, async {
            self.ensure_org(org).await?;
            let documents = self.documents.list(PROJECTS, org).await.or_raise(|| ErrorKind::Documents)?;
            documents.into_iter().map(|document| Self::decode_project(&document.id, document.record)).collect()
        })
        .await
    }

    async fn remove_resource(
        &self,
        cancel: &CancellationToken,
        org: &str,
        project_id: &str,
        resource_id: &str,
    ) -> Result<Project> {
        ensure_active(cancel)?;
        cancellable(cancel, async {
            self.ensure_org(org).await?;
            let mut project = self.find_project(org, project_id).await?;
            if !project.remove(resource_id, OffsetDateTime::now_utc()) {
                tracing::warn!(org, project_id, resource_id, "Resource was not part of the project");
            }
            self.save_project(org, project_id, &project).await?;
            Ok(project)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{self as shared, part};
    use partbook_documents::{Database, SqliteDocuments};
    use partbook_storage::{DocumentStore, ObjectStore};
    use partbook_storage::documents::MemoryDocuments;
    use partbook_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
    use partbook_storage::objects::{KeyStream, MemoryObjects};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Wraps [`MemoryObjects`]: fails puts of keys containing `fail`, never
    /// finishes puts of keys containing `hang`, and tracks concurrency.
    #[derive(Default)]
    struct TestObjects {
        inner: MemoryObjects,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for TestObjects {
        fn name(&self) -> &str {
            "test"
        }

        async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> StorageResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if key.contains("hang") {
                std::future::pending::<()>().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if key.contains("fail") {
                exn::bail!(StorageErrorKind::Network(format!("refused {key}")));
            }
            self.inner.put(bucket, key, data).await
        }

        async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
            self.inner.get(bucket, key).await
        }

        fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyStream<'a> {
            self.inner.list_stream(bucket, prefix)
        }
    }

    async fn registered(store: PersistentStore) -> PersistentStore {
        store.register_organization(&CancellationToken::new(), "org").await.unwrap();
        store
    }

    async fn memory_backed() -> (Arc<TestObjects>, PersistentStore) {
        let objects = Arc::new(TestObjects::default());
        let store = PersistentStore::new(objects.clone(), Arc::new(MemoryDocuments::default()), "scores");
        (objects, registered(store).await)
    }

    async fn sqlite_backed() -> PersistentStore {
        let documents = SqliteDocuments::from(&Database::connect_in_memory().await.unwrap());
        registered(PersistentStore::new(Arc::new(MemoryObjects::default()), Arc::new(documents), "scores")).await
    }

    #[tokio::test]
    async fn test_resubmission_keeps_parts() {
        shared::resubmission_keeps_parts(&memory_backed().await.1).await;
        shared::resubmission_keeps_parts(&sqlite_backed().await).await;
    }

    #[tokio::test]
    async fn test_existing_metadata_untouched() {
        shared::existing_metadata_untouched(&memory_backed().await.1).await;
        shared::existing_metadata_untouched(&sqlite_backed().await).await;
    }

    #[tokio::test]
    async fn test_pattern_search() {
        shared::pattern_search(&memory_backed().await.1).await;
        shared::pattern_search(&sqlite_backed().await).await;
    }

    #[tokio::test]
    async fn test_unknown_things() {
        shared::unknown_things(&memory_backed().await.1).await;
        shared::unknown_things(&sqlite_backed().await).await;
    }

    #[tokio::test]
    async fn test_registered_resource_without_parts() {
        shared::registered_resource_without_parts(&memory_backed().await.1).await;
    }

    #[tokio::test]
    async fn test_duplicate_part_names() {
        shared::duplicate_part_names(&memory_backed().await.1).await;
        shared::duplicate_part_names(&sqlite_backed().await).await;
    }

    #[tokio::test]
    async fn test_empty_resubmission_keeps_pending() {
        let (_, store) = memory_backed().await;
        let meta = MetaData::new("Carmen", "Bizet", "");
        let parts = vec![part("Oboe.pdf", "o"), part("fail.pdf", "x")];
        let err = store.submit(&CancellationToken::new(), "org", meta.clone(), parts).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Upload { failures: 1 });
        shared::empty_resubmission_keeps_pending(&store, meta).await;
    }

    #[tokio::test]
    async fn test_project_lifecycle() {
        shared::project_lifecycle(&memory_backed().await.1).await;
        shared::project_lifecycle(&sqlite_backed().await).await;
    }

    #[tokio::test]
    async fn test_cancelled_operations() {
        shared::cancelled_operations(&memory_backed().await.1).await;
    }

    #[tokio::test]
    async fn test_register_organization_rejects_separators() {
        let (_, store) = memory_backed().await;
        let err = store.register_organization(&CancellationToken::new(), "a/b").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn test_failed_uploads_are_aggregated() {
        let (objects, store) = memory_backed().await;
        let cancel = CancellationToken::new();
        let meta = MetaData::new("Bolero", "Ravel", "");
        let parts = vec![part("Flute.pdf", "a"), part("fail-1.pdf", "b"), part("Oboe.pdf", "c"), part("fail-2.pdf", "d")];
        let err = store.submit(&cancel, "org", meta.clone(), parts).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Upload { failures: 2 });
        assert!(err.is_retryable());

        let id = meta.id();
        assert_eq!(store.meta_by_id(&cancel, "org", &id).await.unwrap().status, Status::Pending);
        let stored = store.parts(&cancel, "org", &id).await.unwrap();
        assert_eq!(shared::names(&stored), vec!["Flute.pdf", "Oboe.pdf"]);
        assert_eq!(objects.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_concurrency_is_bounded() {
        let (objects, store) = memory_backed().await;
        let store = store.with_upload_concurrency(3);
        let parts = (0..10).map(|i| part(&format!("Part {i}.pdf"), "x")).collect();
        let cancel = CancellationToken::new();
        store.submit(&cancel, "org", MetaData::new("Bolero", "", ""), parts).await.unwrap();
        let peak = objects.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "{peak} uploads ran at once");
        assert!(peak >= 2, "uploads did not overlap");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_upload() {
        let (_, store) = memory_backed().await;
        let store = Arc::new(store.with_upload_concurrency(1));
        let cancel = CancellationToken::new();
        let meta = MetaData::new("Bolero", "Ravel", "");
        let parts = vec![part("a.pdf", "a"), part("hang.pdf", "b"), part("z.pdf", "c")];

        let task = {
            let (store, cancel, meta) = (store.clone(), cancel.clone(), meta.clone());
            tokio::spawn(async move { store.submit(&cancel, "org", meta, parts).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));

        // Completed uploads are not undone, and the resource stays pending.
        let fresh = CancellationToken::new();
        let stored = store.parts(&fresh, "org", &meta.id()).await.unwrap();
        assert_eq!(shared::names(&stored), vec!["a.pdf"]);
        assert_eq!(store.meta_by_id(&fresh, "org", &meta.id()).await.unwrap().status, Status::Pending);
    }

    #[tokio::test]
    async fn test_metadata_records_carry_index_keys() {
        let documents = Arc::new(MemoryDocuments::default());
        let store = registered(PersistentStore::new(Arc::new(MemoryObjects::default()), documents.clone(), "scores")).await;
        let id = store.submit(&CancellationToken::new(), "org", MetaData::new("Boléro", "RAVEL", ""), vec![]).await.unwrap();
        let record = documents.get(METADATA, "org", &id).await.unwrap().unwrap();
        assert_eq!(record["title_key"], Value::String("boléro".to_string()));
        assert_eq!(record["composer_key"], Value::String("ravel".to_string()));
        assert_eq!(record["status"], Value::String("finished".to_string()));
    }
}
