//! In-memory object storage backend.

use super::KeyStream;
use crate::ObjectStore;
use crate::error::{ErrorKind, Result};
use crate::key::{validate_bucket, validate_key, validate_prefix};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-memory object storage backend.
///
/// Objects are stored in a `BTreeMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation, and
/// listings come back sorted by key. Ideal for tests and single-process
/// deployments that don't need durability.
///
/// # Examples
///
/// ```
/// use partbook_storage::ObjectStore;
/// use partbook_storage::objects::MemoryObjects;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryObjects::with_objects([("scores", "org/a/Flute.pdf", b"%PDF")]);
/// assert_eq!(store.get("scores", "org/a/Flute.pdf").await?, b"%PDF");
///
/// store.put("scores", "org/a/Oboe.pdf", b"%PDF").await?;
/// assert_eq!(store.list("scores", "org/a/").await?.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MemoryObjects {
    name: String,
    storage: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjects {
    /// Create a store pre-populated with `(bucket, key, data)` objects.
    ///
    /// Panics if any bucket or key fails validation. If test setup is wrong,
    /// then test should not pass.
    pub fn with_objects<'a>(objects: impl IntoIterator<Item = (&'a str, &'a str, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        for (bucket, key, data) in objects {
            let (Ok(bucket), Ok(key)) = (validate_bucket(bucket), validate_key(key)) else {
                panic!("MemoryObjects::with_objects: invalid key {bucket}/{key}");
            };
            map.insert((bucket.to_string(), key), data.into());
        }
        Self { name: "memory".to_string(), storage: RwLock::new(map) }
    }

    /// Change the name of the store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
impl Default for MemoryObjects {
    fn default() -> Self {
        let objects: [(&str, &str, Vec<u8>); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let bucket = validate_bucket(bucket)?.to_string();
        let key = validate_key(key)?;
        self.storage.write().await.insert((bucket, key), data.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let id = (validate_bucket(bucket)?.to_string(), validate_key(key)?);
        match self.storage.read().await.get(&id) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(format!("{}/{}", id.0, id.1))),
        }
    }

    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyStream<'a> {
        let validated = validate_bucket(bucket).and_then(|b| Ok((b, validate_prefix(prefix)?)));
        let (bucket, prefix) = match validated {
            Ok(v) => v,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        Box::pin(stream! {
            // Snapshot matching keys under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let keys: Vec<String> = {
                let guard = self.storage.read().await;
                guard
                    .keys()
                    .filter(|(b, key)| b == bucket && key.starts_with(prefix))
                    .map(|(_, key)| key.clone())
                    .collect()
            };
            for key in keys {
                yield Ok(key);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryObjects::default();
        store.put("scores", "org/res/Flute.pdf", b"hello").await.unwrap();
        assert_eq!(store.get("scores", "org/res/Flute.pdf").await.unwrap(), b"hello");
        // Overwrite
        store.put("scores", "org/res/Flute.pdf", b"again").await.unwrap();
        assert_eq!(store.get("scores", "org/res/Flute.pdf").await.unwrap(), b"again");
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = MemoryObjects::default();
        let err = store.get("scores", "missing").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_buckets_are_separate() {
        let store = MemoryObjects::with_objects([("a", "key", b"one"), ("b", "key", b"two")]);
        assert_eq!(store.get("a", "key").await.unwrap(), b"one");
        assert_eq!(store.get("b", "key").await.unwrap(), b"two");
        assert_eq!(store.list("a", "").await.unwrap(), vec!["key"]);
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let store = MemoryObjects::with_objects([
            ("scores", "org/res/b.pdf", b"b"),
            ("scores", "org/res/a.pdf", b"a"),
            ("scores", "org/resource/c.pdf", b"c"),
            ("scores", "other/res/d.pdf", b"d"),
        ]);
        assert_eq!(store.list("scores", "org/res/").await.unwrap(), vec!["org/res/a.pdf", "org/res/b.pdf"]);
        assert_eq!(store.list("scores", "org/res").await.unwrap().len(), 3);
        assert_eq!(store.list("scores", "").await.unwrap().len(), 4);
        assert!(store.list("nope", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let store = MemoryObjects::default();
        assert!(store.get("scores", "../etc/passwd").await.is_err());
        assert!(store.put("scores", "a/../../escape", b"bad").await.is_err());
        assert!(store.put("../scores", "a", b"bad").await.is_err());
        assert!(store.list("scores", "../").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_objects_panics_on_bad_key() {
        MemoryObjects::with_objects([("scores", "../escape", b"bad")]);
    }
}
