//! Organization-scoped view of a resource store.

use super::{PartStream, StoreHandle};
use crate::error::Result;
use crate::models::{MetaData, Part, Project};
use tokio_util::sync::CancellationToken;

/// Wraps any [`ResourceStore`](super::ResourceStore) with a pre-selected
/// organization, exposing the same operations without the org argument.
///
/// Nothing is checked on construction; operations fail with
/// [`OrganizationNotFound`](crate::error::ErrorKind::OrganizationNotFound)
/// as usual if the organization was never registered.
#[derive(Clone)]
pub struct ScopedStore {
    inner: StoreHandle,
    org: String,
}
impl ScopedStore {
    pub fn new(inner: StoreHandle, org: impl Into<String>) -> Self {
        Self { inner, org: org.into() }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    /// The wrapped store.
    pub fn store(&self) -> &StoreHandle {
        &self.inner
    }

    pub async fn submit(&self, cancel: &CancellationToken, meta: MetaData, parts: Vec<Part>) -> Result<String> {
        self.inner.submit(cancel, &self.org, meta, parts).await
    }

    pub async fn meta_by_pattern(&self, cancel: &CancellationToken, pattern: &MetaData) -> Result<Vec<MetaData>> {
        self.inner.meta_by_pattern(cancel, &self.org, pattern).await
    }

    pub async fn meta_by_id(&self, cancel: &CancellationToken, id: &str) -> Result<MetaData> {
        self.inner.meta_by_id(cancel, &self.org, id).await
    }

    pub fn resource<'a>(&'a self, cancel: &'a CancellationToken, id: &'a str) -> PartStream<'a> {
        self.inner.resource(cancel, &self.org, id)
    }

    pub async fn upsert_project(
        &self,
        cancel: &CancellationToken,
        name: &str,
        resource_ids: &[String],
    ) -> Result<Project> {
        self.inner.upsert_project(cancel, &self.org, name, resource_ids).await
    }

    pub async fn project_by_id(&self, cancel: &CancellationToken, id: &str) -> Result<Project> {
        self.inner.project_by_id(cancel, &self.org, id).await
    }

    pub async fn projects(&self, cancel: &CancellationToken) -> Result<Vec<Project>> {
        self.inner.projects(cancel, &self.org).await
    }

    pub async fn remove_resource(
        &self,
        cancel: &CancellationToken,
        project_id: &str,
        resource_id: &str,
    ) -> Result<Project> {
        self.inner.remove_resource(cancel, &self.org, project_id, resource_id).await
    }
}
