use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use partbook_library::store::DEFAULT_UPLOAD_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "PARTBOOK_";
const FILE_STEM: &str = "partbook";
const DEFAULT_BUCKET: &str = "partbook";

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Where resource parts are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectBackend {
    #[default]
    Memory,
    Local {
        root: PathBuf,
    },
    S3 {
        /// Overrides [`Config::bucket`] when set.
        #[serde(default)]
        bucket: Option<String>,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: Secret,
    },
}

/// Where metadata, projects and organizations are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentBackend {
    #[default]
    Memory,
    Sqlite {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub objects: ObjectBackend,
    pub documents: DocumentBackend,
    pub bucket: String,
    /// Upper bound on parts uploaded at once by a single submission.
    pub upload_concurrency: usize,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            objects: ObjectBackend::default(),
            documents: DocumentBackend::default(),
            bucket: DEFAULT_BUCKET.to_string(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load from `partbook.{toml,yaml,json}` in the user configuration
    /// directory (each optional), then `PARTBOOK_*` environment variables.
    pub fn load() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", FILE_STEM).ok_or(ErrorKind::NoConfigDirectory)?;
        let dir = dirs.config_dir();
        tracing::debug!(dir = %dir.display(), "Looking for configuration files");
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file_exact(dir.join(format!("{FILE_STEM}.toml"))))
            .merge(Yaml::file_exact(dir.join(format!("{FILE_STEM}.yaml"))))
            .merge(Json::file_exact(dir.join(format!("{FILE_STEM}.json"))));
        Self::extract(figment, ENV_PREFIX)
    }

    /// Load from the file at `path`, then `PARTBOOK_*` environment variables.
    /// The format follows the file extension.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_file(path.as_ref(), ENV_PREFIX)
    }

    pub(crate) fn load_file(path: &Path, env_prefix: &str) -> Result<Self> {
        if !path.is_file() {
            exn::bail!(ErrorKind::Invalid(format!("no configuration file at {}", path.display())));
        }
        let defaults = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => defaults.merge(Toml::file_exact(path)),
            Some("yaml" | "yml") => defaults.merge(Yaml::file_exact(path)),
            Some("json") => defaults.merge(Json::file_exact(path)),
            _ => exn::bail!(ErrorKind::Invalid(format!("unknown configuration format: {}", path.display()))),
        };
        tracing::debug!(path = %path.display(), "Loading configuration file");
        Self::extract(figment, env_prefix)
    }

    fn extract(figment: Figment, env_prefix: &str) -> Result<Self> {
        let config: Self = figment
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The bucket resource parts are stored in.
    pub fn bucket(&self) -> &str {
        match &self.objects {
            ObjectBackend::S3 { bucket: Some(bucket), .. } => bucket,
            _ => &self.bucket,
        }
    }

    pub fn validate(&self) -> Result<()> {
        partbook_storage::validate_bucket(self.bucket())
            .or_raise(|| ErrorKind::Invalid(format!("bucket `{}`", self.bucket())))?;
        if self.upload_concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("upload_concurrency must be at least 1".to_string()));
        }
        match &self.objects {
            ObjectBackend::Memory => {},
            ObjectBackend::Local { root } if !root.is_absolute() => {
                exn::bail!(ErrorKind::Invalid(format!("objects.root must be absolute: {}", root.display())));
            },
            ObjectBackend::Local { .. } => {},
            ObjectBackend::S3 { region, key_id, key_secret, .. } => {
                let required = [("region", region.as_str()), ("key_id", key_id.as_str()), ("key_secret", key_secret.expose())];
                for (field, value) in required {
                    if value.trim().is_empty() {
                        exn::bail!(ErrorKind::Invalid(format!("objects.{field} is required for s3")));
                    }
                }
            },
        }
        if let DocumentBackend::Sqlite { path } = &self.documents
            && path.as_os_str().is_empty()
        {
            exn::bail!(ErrorKind::Invalid("documents.path is required for sqlite".to_string()));
        }
        Ok(())
    }
}
