//! Resource download pipeline.
//!
//! A download moves through fixed stages, each one a distinct type:
//!
//! ```text
//! Download<Requested> --metadata()--> Download<Described> --resource()--> Download<Fetched>
//!                                                                            |
//!                                            zip_resource() / extract_single_file()
//! ```
//!
//! Every stage carries a `Result` of its state. Once a stage fails, later
//! stages do nothing and hand back that same error, so callers can chain the
//! whole pipeline and inspect a single result at the end.

use crate::error::{Error, ErrorKind, Result};
use crate::models::MetaData;
use crate::store::{PartStream, ResourceStore, ensure_active};
use exn::ResultExt;
use futures::StreamExt;
use partbook_archive::ZipSink;
use std::io::{Seek, Write};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// What to download: a whole resource, or one named part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub org: String,
    pub resource_id: String,
    /// When set, only this part is extracted (unzipped).
    pub filename: Option<String>,
}

/// Outcome of [`Request::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    /// A zip archive holding this many parts was written.
    Archive { entries: usize },
    /// A single part was written. Zero bytes means the part does not exist.
    File { bytes: u64 },
}

impl Request {
    pub fn new(org: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self { org: org.into(), resource_id: resource_id.into(), filename: None }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Run the whole pipeline: a single part when the request names one, or
    /// every part zipped.
    #[instrument(skip(self, store, cancel, writer), fields(org = %self.org, id = %self.resource_id))]
    pub async fn run<W: Write + Seek>(
        &self,
        store: &dyn ResourceStore,
        cancel: &CancellationToken,
        writer: W,
    ) -> Result<Delivered> {
        let fetched = Download::new(store, cancel, self).metadata().await.resource();
        match &self.filename {
            Some(name) => fetched.extract_single_file(name, writer).await.map(|bytes| Delivered::File { bytes }),
            None => fetched.zip_resource(writer, |_| true).await.map(|entries| Delivered::Archive { entries }),
        }
    }
}

/// Initial stage.
pub struct Requested;

/// Metadata resolved.
pub struct Described {
    meta: MetaData,
}

/// Part stream obtained.
pub struct Fetched<'a> {
    meta: MetaData,
    parts: PartStream<'a>,
}

pub struct Download<'a, S> {
    store: &'a dyn ResourceStore,
    cancel: &'a CancellationToken,
    request: &'a Request,
    state: Result<S>,
}

impl<'a, S> Download<'a, S> {
    /// The error that stopped the pipeline, if any.
    pub fn error(&self) -> Option<&Error> {
        self.state.as_ref().err()
    }
}

impl<'a> Download<'a, Requested> {
    pub fn new(store: &'a dyn ResourceStore, cancel: &'a CancellationToken, request: &'a Request) -> Self {
        Self { store, cancel, request, state: Ok(Requested) }
    }

    /// Resolve the resource's metadata.
    pub async fn metadata(self) -> Download<'a, Described> {
        let Download { store, cancel, request, state } = self;
        let state = match state {
            Ok(Requested) => {
                store.meta_by_id(cancel, &request.org, &request.resource_id).await.map(|meta| Described { meta })
            },
            Err(e) => Err(e),
        };
        Download { store, cancel, request, state }
    }
}

impl<'a> Download<'a, Described> {
    pub fn meta(&self) -> Option<&MetaData> {
        self.state.as_ref().ok().map(|state| &state.meta)
    }

    /// Open the resource's part stream.
    pub fn resource(self) -> Download<'a, Fetched<'a>> {
        let Download { store, cancel, request, state } = self;
        let state = state.and_then(|Described { meta }| {
            ensure_active(cancel)?;
            Ok(Fetched { meta, parts: store.resource(cancel, &request.org, &request.resource_id) })
        });
        Download { store, cancel, request, state }
    }
}

impl<'a> Download<'a, Fetched<'a>> {
    pub fn meta(&self) -> Option<&MetaData> {
        self.state.as_ref().ok().map(|state| &state.meta)
    }

    /// Write every part accepted by `filter` (called with the part name) into
    /// a zip archive, one part at a time. Returns the number of parts written.
    ///
    /// Fails with [`ErrorKind::ResourceNotFound`] if no part was accepted; in
    /// that case nothing is written to `writer`.
    pub async fn zip_resource<W: Write + Seek>(self, writer: W, filter: impl Fn(&str) -> bool) -> Result<usize> {
        let Fetched { meta: _, mut parts } = self.state?;
        // Opened on the first accepted part: dropping a zip writer finishes it.
        let mut writer = Some(writer);
        let mut sink = None;
        while let Some(part) = parts.next().await {
            let part = part?;
            if !filter(&part.name) {
                continue;
            }
            if let Some(writer) = writer.take() {
                sink = Some(ZipSink::new(writer));
            }
            if let Some(sink) = sink.as_mut() {
                sink.append(&part.name, &part.data).or_raise(|| ErrorKind::Output)?;
                tracing::debug!(part = %part.name, size = part.data.len(), "Zipped part");
            }
        }
        let Some(sink) = sink else {
            exn::bail!(ErrorKind::ResourceNotFound(self.request.resource_id.clone()));
        };
        let entries = sink.len();
        sink.finish().or_raise(|| ErrorKind::Output)?;
        Ok(entries)
    }

    /// Copy the part named `name` to `writer`, returning the bytes written.
    ///
    /// A missing part is not an error: nothing is written and `0` is
    /// returned.
    pub async fn extract_single_file(self, name: &str, mut writer: impl Write) -> Result<u64> {
        let Fetched { meta: _, mut parts } = self.state?;
        while let Some(part) = parts.next().await {
            let part = part?;
            if part.name == name {
                writer.write_all(&part.data).or_raise(|| ErrorKind::Output)?;
                return Ok(part.data.len() as u64);
            }
        }
        tracing::debug!(part = name, "Requested part is not stored");
        Ok(0)
    }
}
