//! Local filesystem object storage backend.
//!
//! Buckets are directories directly under a configured root, and keys are
//! relative paths inside them. Accessed using `tokio::fs` for async I/O.

use super::KeyStream;
use crate::ObjectStore;
use crate::error::{ErrorKind, Result};
use crate::key::{validate_bucket, validate_key, validate_prefix};
use async_stream::stream;
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    Key(String),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem object storage backend.
///
/// # Examples
///
/// ```no_run
/// use partbook_storage::objects::LocalObjects;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalObjects::new("local", "/var/lib/partbook/objects")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalObjects {
    name: String,
    /// Root directory; each bucket is a subdirectory.
    root: PathBuf,
}
impl LocalObjects {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or exists and isn't a
    /// directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidKey(root.display().to_string()));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidKey(root.display().to_string()));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root.display().to_string()))?;
        }
        Ok(Self { name: name.into(), root })
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf> {
        Ok(self.root.join(validate_bucket(bucket)?))
    }

    /// Absolute path of an object. Validated keys never contain `..`, so the
    /// result always stays inside the bucket directory.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_path(bucket)?;
        path.extend(validate_key(key)?.split('/'));
        Ok(path)
    }

    /// Convert a path inside a bucket directory back into an object key.
    fn key_of(bucket_root: &Path, absolute: &Path) -> Result<String> {
        let relative = absolute.strip_prefix(bucket_root).map_err(|_| {
            ErrorKind::BackendError(format!("path `{}` is not within `{}`", absolute.display(), bucket_root.display()))
        })?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(s) => match s.to_str() {
                    Some(s) => segments.push(s),
                    None => exn::bail!(ErrorKind::InvalidKey(relative.display().to_string())),
                },
                _ => exn::bail!(ErrorKind::InvalidKey(relative.display().to_string())),
            }
        }
        Ok(segments.join("/"))
    }

    fn map_io_error(e: std::io::Error, object: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(object.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(object.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Keeps the stream loop below free of error conversion noise: every
    /// fallible step for a single directory entry happens here.
    async fn process_entry(bucket_root: &Path, entry: DirEntry, prefix: &str) -> Result<WalkEntry> {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &path.display().to_string()))?;
        if file_type.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !file_type.is_file() {
            // Silently drop what is most likely a broken symlink.
            return Ok(WalkEntry::Skip);
        }
        let key = Self::key_of(bucket_root, &path)?;
        match key.starts_with(prefix) {
            true => Ok(WalkEntry::Key(key)),
            false => Ok(WalkEntry::Skip),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjects {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        // Create parent directories if needed, to keep behaviour
        // consistent with S3-compatible storage.
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, key))?;
        }
        Ok(fs::write(&path, data).await.map_err(|e| Self::map_io_error(e, key))?)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        Ok(fs::read(&path).await.map_err(|e| Self::map_io_error(e, key))?)
    }

    fn list_stream<'a>(&'a self, bucket: &'a str, prefix: &'a str) -> KeyStream<'a> {
        let validated = self.bucket_path(bucket).and_then(|b| Ok((b, validate_prefix(prefix)?)));
        let (bucket_root, prefix) = match validated {
            Ok(v) => v,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        // Only descend into the directory that holds the prefix; the last
        // segment may be a partial name so it can't be used directly.
        let start_dir = match prefix.rfind('/') {
            Some(index) => bucket_root.join(&prefix[..index]),
            None => bucket_root.clone(),
        };
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // To stay consistent with the behaviour of S3-compatible
                    // backends, listing a directory that doesn't exist
                    // results in an empty list not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current.display().to_string())));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => {
                            yield Err(exn::Exn::from(Self::map_io_error(e, &current.display().to_string())));
                            continue 'entries;
                        },
                    };
                    match Self::process_entry(&bucket_root, entry, prefix).await {
                        Ok(WalkEntry::Key(key)) => yield Ok(key),
                        Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }
}
