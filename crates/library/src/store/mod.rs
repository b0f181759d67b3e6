//! Resource stores.
//!
//! [`ResourceStore`] is the capability interface over metadata, part content
//! and projects. Two implementations are provided:
//!
//! - [`MemoryStore`] keeps everything in process, one merged zip archive per
//!   resource.
//! - [`PersistentStore`] keeps part contents as individual objects in an
//!   [`ObjectStore`](partbook_storage::ObjectStore) and records in a
//!   [`DocumentStore`](partbook_storage::DocumentStore).
//!
//! Every operation is scoped to an organization that must have been
//! registered first, and takes a [`CancellationToken`] so a caller can
//! abandon it. Cancelling never undoes work that already completed.

mod memory;
mod persistent;
mod scoped;

pub use self::memory::MemoryStore;
pub use self::persistent::{DEFAULT_UPLOAD_CONCURRENCY, PersistentStore};
pub use self::scoped::ScopedStore;
use crate::error::{ErrorKind, Result};
use crate::models::{MetaData, Part, Project};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type PartStream<'a> = Pin<Box<dyn Stream<Item = Result<Part>> + Send + 'a>>;
pub type StoreHandle = Arc<dyn ResourceStore + Send + Sync>;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Name of the store (used for logging only).
    fn name(&self) -> &str;

    /// Create the tenant boundary for `org`. Registering twice is a no-op.
    async fn register_organization(&self, cancel: &CancellationToken, org: &str) -> Result<()>;

    /// Register `meta` (as [`Pending`](crate::models::Status::Pending)) if
    /// its resource id is new to the organization, then store every part.
    ///
    /// Existing metadata is left untouched. Previously stored parts are only
    /// ever replaced by a part of the same name. Once every part is stored
    /// the status becomes [`Finished`](crate::models::Status::Finished);
    /// otherwise it stays pending and [`ErrorKind::Upload`] is returned with
    /// the first failure attached. Submitting no parts finishes a new
    /// resource but leaves an existing one's status alone. When several parts
    /// share a name, the last one is kept. Returns the resource id.
    async fn submit(&self, cancel: &CancellationToken, org: &str, meta: MetaData, parts: Vec<Part>) -> Result<String>;

    /// Metadata matching `pattern`.
    ///
    /// Each non-empty field among title, composer and arranger of `pattern`
    /// is a case-insensitive prefix; a record matches if any of them does.
    /// A pattern with none of those fields set matches everything. Results
    /// are ordered by resource id.
    async fn meta_by_pattern(&self, cancel: &CancellationToken, org: &str, pattern: &MetaData)
    -> Result<Vec<MetaData>>;

    /// Fails with [`ErrorKind::ResourceMetadataNotFound`] if unknown.
    async fn meta_by_id(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<MetaData>;

    /// Stream the stored parts of a resource, ordered by name.
    ///
    /// A registered resource without any stored parts yields nothing. An
    /// unknown resource yields a single [`ErrorKind::ResourceNotFound`].
    fn resource<'a>(&'a self, cancel: &'a CancellationToken, org: &'a str, id: &'a str) -> PartStream<'a>;

    /// Create the project named `name`, or merge `resource_ids` into it if
    /// one with the same id exists.
    async fn upsert_project(
        &self,
        cancel: &CancellationToken,
        org: &str,
        name: &str,
        resource_ids: &[String],
    ) -> Result<Project>;

    /// Fails with [`ErrorKind::ProjectNotFound`] if unknown.
    async fn project_by_id(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<Project>;

    /// All projects of the organization, ordered by id.
    async fn projects(&self, cancel: &CancellationToken, org: &str) -> Result<Vec<Project>>;

    /// Remove a single resource from a project. Removing a resource that
    /// isn't a member leaves the project as it is.
    async fn remove_resource(
        &self,
        cancel: &CancellationToken,
        org: &str,
        project_id: &str,
        resource_id: &str,
    ) -> Result<Project>;

    /// Collect [`resource()`](Self::resource) into a [`Vec`].
    async fn parts(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<Vec<Part>> {
        self.resource(cancel, org, id).try_collect().await
    }
}

pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        exn::bail!(ErrorKind::Cancelled);
    }
    Ok(())
}

/// Run `operation` unless `cancel` fires first.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
        result = operation => result,
    }
}

/// Keep only the last part submitted under each name, in submission order.
/// Storing parts one after another would leave the same result.
pub(crate) fn latest_by_name(parts: Vec<Part>) -> Vec<Part> {
    let mut last = HashMap::new();
    for (index, part) in parts.iter().enumerate() {
        last.insert(part.name.clone(), index);
    }
    parts
        .into_iter()
        .enumerate()
        .filter(|(index, part)| last.get(&part.name) == Some(index))
        .map(|(_, part)| part)
        .collect()
}

pub(crate) fn require_identity(id: String, what: &str) -> Result<String> {
    if id.is_empty() {
        exn::bail!(ErrorKind::InvalidIdentity(format!("{what} sanitizes to an empty id")));
    }
    Ok(id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Status;

    pub(crate) fn part(name: &str, data: &str) -> Part {
        Part::new(name, data.as_bytes())
    }

    pub(crate) fn names(parts: &[Part]) -> Vec<&str> {
        parts.iter().map(|p| p.name.as_str()).collect()
    }

    /// Behaviour every store must share. Each store's test module runs these
    /// against its own construction.
    pub(crate) async fn resubmission_keeps_parts(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        let meta = MetaData::new("Bolero", "Ravel", "");
        let id = store.submit(&cancel, "org", meta.clone(), vec![part("Flute.pdf", "x1")]).await.unwrap();
        let again = store.submit(&cancel, "org", meta, vec![part("Oboe.pdf", "y"), part("Flute.pdf", "x2")]).await;
        assert_eq!(again.unwrap(), id);
        let parts = store.parts(&cancel, "org", &id).await.unwrap();
        assert_eq!(names(&parts), vec!["Flute.pdf", "Oboe.pdf"]);
        assert_eq!(parts[0].data, b"x2");
        assert_eq!(store.meta_by_id(&cancel, "org", &id).await.unwrap().status, Status::Finished);
    }

    pub(crate) async fn existing_metadata_untouched(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        let mut first = MetaData::new("Bolero", "Ravel", "");
        first.genre = "Ballet".to_string();
        let id = store.submit(&cancel, "org", first, vec![]).await.unwrap();
        let mut second = MetaData::new("BOLERO", "ravel", "");
        second.genre = "Orchestral".to_string();
        store.submit(&cancel, "org", second, vec![]).await.unwrap();
        assert_eq!(store.meta_by_id(&cancel, "org", &id).await.unwrap().genre, "Ballet");
    }

    pub(crate) async fn pattern_search(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        for (title, composer) in [("Test Piece", "Zed"), ("testing", "Amy"), ("A Test", "Bob"), ("Other", "Tess")] {
            store.submit(&cancel, "org", MetaData::new(title, composer, ""), vec![]).await.unwrap();
        }
        let all = store.meta_by_pattern(&cancel, "org", &MetaData::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["atest_bob", "other_tess", "testing_amy", "testpiece_zed"]);

        let found = store.meta_by_pattern(&cancel, "org", &MetaData::new("test", "", "")).await.unwrap();
        let titles: Vec<_> = found.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["testing", "Test Piece"]);

        let found = store.meta_by_pattern(&cancel, "org", &MetaData::new("Other", "TES", "")).await.unwrap();
        assert_eq!(found.len(), 1);

        let found = store.meta_by_pattern(&cancel, "org", &MetaData::new("", "b", "")).await.unwrap();
        assert_eq!(found[0].composer, "Bob");
    }

    pub(crate) async fn unknown_things(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        let err = store.meta_by_id(&cancel, "nobody", "x").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::OrganizationNotFound(_)));
        let err = store.submit(&cancel, "nobody", MetaData::new("a", "", ""), vec![]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::OrganizationNotFound(_)));
        let err = store.meta_by_id(&cancel, "org", "missing").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ResourceMetadataNotFound(_)));
        let err = store.parts(&cancel, "org", "missing").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ResourceNotFound(_)));
        let err = store.project_by_id(&cancel, "org", "missing").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ProjectNotFound(_)));
        let err = store.remove_resource(&cancel, "org", "missing", "x").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ProjectNotFound(_)));
        let err = store.submit(&cancel, "org", MetaData::new("!!!", "", ""), vec![]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidIdentity(_)));
    }

    pub(crate) async fn registered_resource_without_parts(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        let id = store.submit(&cancel, "org", MetaData::new("Silence", "Cage", ""), vec![]).await.unwrap();
        assert!(store.parts(&cancel, "org", &id).await.unwrap().is_empty());
    }

    pub(crate) async fn duplicate_part_names(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        let parts = vec![part("Flute.pdf", "first"), part("Oboe.pdf", "oboe"), part("Flute.pdf", "second")];
        let id = store.submit(&cancel, "org", MetaData::new("Carmen", "Bizet", ""), parts).await.unwrap();
        let stored = store.parts(&cancel, "org", &id).await.unwrap();
        assert_eq!(names(&stored), vec!["Flute.pdf", "Oboe.pdf"]);
        assert_eq!(stored[0].data, b"second");
        assert_eq!(store.meta_by_id(&cancel, "org", &id).await.unwrap().status, Status::Finished);
    }

    /// Expects `meta` to be registered and left pending by a failed upload.
    pub(crate) async fn empty_resubmission_keeps_pending(store: &dyn ResourceStore, meta: MetaData) {
        let cancel = CancellationToken::new();
        let id = meta.id();
        store.submit(&cancel, "org", meta.clone(), vec![]).await.unwrap();
        assert_eq!(store.meta_by_id(&cancel, "org", &id).await.unwrap().status, Status::Pending);
        store.submit(&cancel, "org", meta, vec![part("Flute.pdf", "f")]).await.unwrap();
        assert_eq!(store.meta_by_id(&cancel, "org", &id).await.unwrap().status, Status::Finished);
    }

    pub(crate) async fn project_lifecycle(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        let ids = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let created = store.upsert_project(&cancel, "org", "Spring Gala", &ids(&["a", "b"])).await.unwrap();
        let merged = store.upsert_project(&cancel, "org", "spring gala!", &ids(&["c", "a"])).await.unwrap();
        assert_eq!(merged.name, "Spring Gala");
        assert_eq!(merged.resource_ids, ids(&["a", "b", "c"]));
        assert_eq!(merged.created_at, created.created_at);
        assert!(merged.updated_at >= created.updated_at);

        let removed = store.remove_resource(&cancel, "org", "springgala", "b").await.unwrap();
        assert_eq!(removed.resource_ids, ids(&["a", "c"]));
        assert_eq!(store.project_by_id(&cancel, "org", "springgala").await.unwrap(), removed);

        store.upsert_project(&cancel, "org", "Autumn", &[]).await.unwrap();
        let names: Vec<_> = store.projects(&cancel, "org").await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Autumn", "Spring Gala"]);
    }

    pub(crate) async fn cancelled_operations(store: &dyn ResourceStore) {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store.submit(&cancel, "org", MetaData::new("a", "", ""), vec![]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        let err = store.meta_by_pattern(&cancel, "org", &MetaData::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        let err = store.parts(&cancel, "org", "a").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn test_cancellable() {
        let cancel = CancellationToken::new();
        assert_eq!(cancellable(&cancel, async { Ok(1) }).await.unwrap(), 1);
        cancel.cancel();
        let err = cancellable(&cancel, std::future::pending::<Result<()>>()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
    }

    #[test]
    fn test_latest_by_name() {
        let parts = vec![part("b", "1"), part("a", "2"), part("b", "3"), part("c", "4"), part("a", "5")];
        let kept = latest_by_name(parts);
        assert_eq!(names(&kept), vec!["b", "c", "a"]);
        assert_eq!(kept[0].data, b"3");
        assert_eq!(kept[2].data, b"5");
    }

    #[test]
    fn test_require_identity() {
        assert_eq!(require_identity("bolero".to_string(), "resource").unwrap(), "bolero");
        assert!(require_identity(String::new(), "resource").is_err());
    }
}
