//! Object storage trait and implementations.
//!
//! This module defines the `ObjectStore` trait, a flat `bucket/key → bytes`
//! interface shared by the in-memory, local filesystem and S3-compatible
//! backends.

mod local;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalObjects;
pub use self::memory::MemoryObjects;
#[cfg(feature = "s3")]
pub use self::s3::S3Objects;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type KeyStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Unified interface for blob storage backends.
///
/// Keys are `/`-separated strings validated with
/// [`validate_key`](crate::validate_key); buckets are single segments
/// validated with [`validate_bucket`](crate::validate_bucket).
/// Implementations must enforce this validation.
///
/// # Examples
///
/// ```
/// use partbook_storage::{ObjectStore, error::Result};
///
/// async fn copy(store: &dyn ObjectStore, from: &str, to: &str) -> Result<usize> {
///     let data = store.get("scores", from).await?;
///     store.put("scores", to, &data).await?;
///     Ok(data.len())
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Create or overwrite an object.
    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Read an object's contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Stream the keys in `bucket` that start with `prefix`.
    ///
    /// `prefix` is a plain string prefix (S3 semantics), so `"org/res"`
    /// matches both `"org/res/a.pdf"` and `"org/resource/b.pdf"`. Callers
    /// that want a directory-like listing should end the prefix with `/`.
    /// Listing a bucket that doesn't exist yields nothing rather than an
    /// error. Key order is backend-specific.
    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyStream<'a>;

    /// Collect [`list_stream()`](Self::list_stream) into a [`Vec`].
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.list_stream(bucket, prefix).try_collect().await
    }
}
