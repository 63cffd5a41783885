//! Generic async file-based mapping source with SHA256 change detection.
//!
//! [`FileSource`] implements [`MappingSource`] for any file format by
//! accepting a deserialization function at construction time. It reads the
//! file asynchronously via Tokio and computes a SHA256 hash for version
//! tracking. Validation is left to the mappings provider.

use std::path::PathBuf;

use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::{MappingSource, SourceVersion};
use crate::error::HostgateError;

pub type Deserializer = fn(&str) -> Result<Config, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserializer,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserializer) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    /// YAML document source.
    #[cfg(feature = "yaml")]
    #[must_use]
    pub fn yaml(path: PathBuf) -> Self {
        Self::new(path, "yaml", |content| {
            serde_yml::from_str::<Config>(content).map_err(Into::into)
        })
    }

    /// JSON document source.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn json(path: PathBuf) -> Self {
        Self::new(path, "json", |content| {
            serde_json::from_str::<Config>(content).map_err(Into::into)
        })
    }

    /// TOML document source.
    #[cfg(feature = "toml")]
    #[must_use]
    pub fn toml(path: PathBuf) -> Self {
        Self::new(path, "toml", |content| {
            toml::from_str::<Config>(content).map_err(Into::into)
        })
    }

    /// Pick the deserializer from the file extension.
    pub fn for_path(path: &std::path::Path) -> Result<Self, HostgateError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => Ok(Self::yaml(path.to_path_buf())),

            #[cfg(feature = "json")]
            "json" => Ok(Self::json(path.to_path_buf())),

            #[cfg(feature = "toml")]
            "toml" => Ok(Self::toml(path.to_path_buf())),

            other => Err(HostgateError::UnsupportedFormat(other.to_string())),
        }
    }

    async fn read_content(&self) -> Result<String, HostgateError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HostgateError::MappingFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                HostgateError::Io(e)
            }
        })
    }
}

#[async_trait]
impl MappingSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(Config, SourceVersion), HostgateError> {
        let content = self.read_content().await?;

        let config = (self.deserialize)(&content).map_err(|e| HostgateError::MappingParse {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let hash = sha256_hex(content.as_bytes());
        Ok((config, SourceVersion::Hash(hash)))
    }

    async fn has_changed(&self, current: &SourceVersion) -> Result<bool, HostgateError> {
        let content = self.read_content().await?;
        let hash = sha256_hex(content.as_bytes());
        Ok(*current != SourceVersion::Hash(hash))
    }
}
