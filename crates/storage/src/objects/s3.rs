//! S3-compatible object storage backend.
//!
//! Supports AWS S3, Backblaze B2, Tigris (Fly.io), MinIO, Google Cloud
//! Storage's XML interoperability API and other S3-compatible services.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file.

use super::KeyStream;
use crate::ObjectStore;
use crate::error::{ErrorKind, Result};
use crate::key::{validate_bucket, validate_key, validate_prefix};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, retry::RetryConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible object storage backend.
///
/// # Examples
///
/// ```no_run
/// use partbook_storage::objects::S3Objects;
///
/// let store = S3Objects::new(
///     "cloud",
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com"),
///     "access_key_id",
///     "secret_access_key",
/// );
/// ```
#[derive(Debug, Clone)]
pub struct S3Objects {
    name: String,
    client: Client,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Objects {
    /// Create a new S3 object storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "partbook-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // Uploads are never retried by the resource stores, but a single
            // request may still be retried by the SDK on throttling.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        }
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        Ok(self
            .rate_limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ErrorKind::BackendError("S3 rate limiter closed".to_string()))?)
    }

    fn network(err: impl std::error::Error) -> ErrorKind {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl ObjectStore for S3Objects {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let bucket = validate_bucket(bucket)?;
        let key = validate_key(key)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(Self::network)?;
        tracing::debug!(backend = %self.name, bucket, key, size = data.len(), "Uploaded object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let bucket = validate_bucket(bucket)?;
        let key = validate_key(key)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(bucket).key(&key).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(format!("{bucket}/{key}")))
            },
            Err(e) => exn::bail!(Self::network(e)),
        };
        let body = output.body.collect().await.map_err(Self::network)?;
        Ok(body.into_bytes().to_vec())
    }

    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyStream<'a> {
        let validated = validate_bucket(bucket).and_then(|b| Ok((b, validate_prefix(prefix)?)));
        let (bucket, prefix) = match validated {
            Ok(v) => v,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            let mut pages = self.client.list_objects_v2().bucket(bucket).prefix(prefix).into_paginator().send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_bucket()) => return,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::network(e)));
                        return;
                    },
                };
                for object in page.contents() {
                    if let Some(key) = object.key() {
                        yield Ok(key.to_string());
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_invalid_keys_before_network() {
        let store = S3Objects::new("cloud", "us-east-1", Some("http://127.0.0.1:9"), "id", "secret");
        let err = store.get("scores", "../escape").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
        let err = store.put("a/b", "key", b"data").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
        assert_eq!(store.name(), "cloud");
    }
}
