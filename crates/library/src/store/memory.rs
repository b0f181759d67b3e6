//! In-memory resource store.

use super::{PartStream, ResourceStore, ensure_active, latest_by_name, require_identity};
use crate::error::{ErrorKind, Result};
use crate::fields;
use crate::identity::project_id;
use crate::models::{MetaData, Part, Project, Status};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Default)]
struct Tenant {
    meta: BTreeMap<String, MetaData>,
    /// One zip archive per resource holding every stored part.
    archives: HashMap<String, Vec<u8>>,
    projects: BTreeMap<String, Project>,
}

/// Resource store kept entirely in process memory.
///
/// Each resource's parts live in a single zip archive. Resubmitting a
/// resource builds an archive from the new parts and
/// [merges](partbook_archive::merge) it in front of the existing one, so new
/// parts replace old ones of the same name and everything else is kept.
///
/// # Examples
///
/// ```
/// use partbook_library::models::{MetaData, Part};
/// use partbook_library::{MemoryStore, ResourceStore};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cancel = CancellationToken::new();
/// let store = MemoryStore::default();
/// store.register_organization(&cancel, "orchestra").await?;
///
/// let meta = MetaData::new("Bolero", "Ravel", "");
/// let id = store.submit(&cancel, "orchestra", meta, vec![Part::new("Flute.pdf", b"%PDF".to_vec())]).await?;
/// assert_eq!(store.parts(&cancel, "orchestra", &id).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    name: String,
    tenants: RwLock<HashMap<String, Tenant>>,
}
impl Default for MemoryStore {
    fn default() -> Self {
        Self { name: "memory".to_string(), tenants: RwLock::new(HashMap::new()) }
    }
}
impl MemoryStore {
    /// Change the name of the store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn unknown(org: &str) -> ErrorKind {
        ErrorKind::OrganizationNotFound(org.to_string())
    }

    /// Fold `parts` into the resource's archive. New parts come first so
    /// they win over stored parts of the same name.
    fn store_parts(archives: &mut HashMap<String, Vec<u8>>, id: &str, parts: &[Part]) -> Result<()> {
        let incoming = partbook_archive::write_entries(parts).or_raise(|| ErrorKind::Archive)?;
        let archive = match archives.get(id) {
            Some(existing) => {
                partbook_archive::merge([incoming.as_slice(), existing.as_slice()]).or_raise(|| ErrorKind::Archive)?
            },
            None => incoming,
        };
        archives.insert(id.to_string(), archive);
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register_organization(&self, cancel: &CancellationToken, org: &str) -> Result<()> {
        ensure_active(cancel)?;
        require_identity(org.to_string(), "organization")?;
        self.tenants.write().await.entry(org.to_string()).or_default();
        Ok(())
    }

    #[instrument(skip(self, cancel, meta, parts), fields(store = %self.name, parts = parts.len()))]
    async fn submit(&self, cancel: &CancellationToken, org: &str, meta: MetaData, parts: Vec<Part>) -> Result<String> {
        ensure_active(cancel)?;
        let id = require_identity(meta.id(), "resource")?;
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.get_mut(org).ok_or_else(|| Self::unknown(org))?;
        let created = !tenant.meta.contains_key(&id);
        let record = tenant.meta.entry(id.clone()).or_insert_with(|| {
            tracing::info!(org, id, "Registered new resource");
            MetaData { status: Status::Pending, ..meta }
        });
        if parts.is_empty() {
            // Nothing was stored, so an earlier failed upload is still missing.
            if created {
                record.status = Status::Finished;
            }
            return Ok(id);
        }
        let parts = latest_by_name(parts);
        if let Err(e) = Self::store_parts(&mut tenant.archives, &id, &parts) {
            // The archive is rebuilt as a whole, so every part of this
            // submission failed together.
            return Err(e.raise(ErrorKind::Upload { failures: parts.len() }));
        }
        if let Some(record) = tenant.meta.get_mut(&id) {
            record.status = Status::Finished;
        }
        tracing::info!(org, id, "Resource finished");
        Ok(id)
    }

    async fn meta_by_pattern(
        &self,
        cancel: &CancellationToken,
        org: &str,
        pattern: &MetaData,
    ) -> Result<Vec<MetaData>> {
        ensure_active(cancel)?;
        let terms = fields::terms(pattern);
        let tenants = self.tenants.read().await;
        let tenant = tenants.get(org).ok_or_else(|| Self::unknown(org))?;
        Ok(tenant.meta.values().filter(|meta| fields::matches_any(meta, &terms)).cloned().collect())
    }

    async fn meta_by_id(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<MetaData> {
        ensure_active(cancel)?;
        let tenants = self.tenants.read().await;
        let tenant = tenants.get(org).ok_or_else(|| Self::unknown(org))?;
        match tenant.meta.get(id) {
            Some(meta) => Ok(meta.clone()),
            None => exn::bail!(ErrorKind::ResourceMetadataNotFound(id.to_string())),
        }
    }

    fn resource<'a>(&'a self, cancel: &'a CancellationToken, org: &'a str, id: &'a str) -> PartStream<'a> {
        Box::pin(stream! {
            if let Err(e) = ensure_active(cancel) {
                yield Err(e);
                return;
            }
            // Copy the archive out so the lock isn't held while yielding.
            let archive = {
                let tenants = self.tenants.read().await;
                match tenants.get(org) {
                    None => Err(Self::unknown(org)),
                    Some(tenant) if !tenant.meta.contains_key(id) => Err(ErrorKind::ResourceNotFound(id.to_string())),
                    Some(tenant) => Ok(tenant.archives.get(id).cloned()),
                }
            };
            let parts = match archive {
                Ok(Some(bytes)) => partbook_archive::read_entries(&bytes).or_raise(|| ErrorKind::Archive).map(|mut parts| {
                    parts.sort_by(|a, b| a.name.cmp(&b.name));
                    parts
                }),
                Ok(None) => Ok(Vec::new()),
                Err(kind) => Err(exn::Exn::from(kind)),
            };
            match parts {
                Ok(parts) => {
                    for part in parts {
                        yield Ok(part);
                    }
                },
                Err(e) => yield Err(e),
            }
        })
    }

    async fn upsert_project(
        &self,
        cancel: &CancellationToken,
        org: &str,
        name: &str,
        resource_ids: &[String],
    ) -> Result<Project> {
        ensure_active(cancel)?;
        let id = require_identity(project_id(name), "project")?;
        let now = OffsetDateTime::now_utc();
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.get_mut(org).ok_or_else(|| Self::unknown(org))?;
        let project = tenant
            .projects
            .entry(id)
            .and_modify(|project| project.merge(resource_ids, now))
            .or_insert_with(|| Project::new(name, resource_ids, now));
        Ok(project.clone())
    }

    async fn project_by_id(&self, cancel: &CancellationToken, org: &str, id: &str) -> Result<Project> {
        ensure_active(cancel)?;
        let tenants = self.tenants.read().await;
        let tenant = tenants.get(org).ok_or_else(|| Self::unknown(org))?;
        match tenant.projects.get(id) {
            Some(project) => Ok(project.clone()),
            None => exn::bail!(ErrorKind::ProjectNotFound(id.to_string())),
        }
    }

    async fn projects(&self, cancel: &CancellationToken, org: &str) -> Result<Vec<Project>> {
        ensure_active(cancel)?;
        let tenants = self.tenants.read().await;
        let tenant = tenants.get(org).ok_or_else(|| Self::unknown(org))?;
        Ok(tenant.projects.values().cloned().collect())
    }

    async fn remove_resource(
        &self,
        cancel: &CancellationToken,
        org: &str,
        project_id: &str,
        resource_id: &str,
    ) -> Result<Project> {
        ensure_active(cancel)?;
        let mut tenants = self.tenants.write().await;
        let tenant = tenants.get_mut(org).ok_or_else(|| Self::unknown(org))?;
        let Some(project) = tenant.projects.get_mut(project_id) else {
            exn::bail!(ErrorKind::ProjectNotFound(project_id.to_string()));
        };
        if !project.remove(resource_id, OffsetDateTime::now_utc()) {
            tracing::warn!(org, project_id, resource_id, "Resource was not part of the project");
        }
        Ok(project.clone())
    }
}
