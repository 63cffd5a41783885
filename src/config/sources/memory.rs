//! In-memory mapping source for programmatic mappings.
//!
//! [`MemorySource`] holds a mapping document that the embedding
//! application replaces at runtime with [`MemorySource::replace`]. The
//! version is the SHA256 of the document's JSON serialization, so replacing
//! it with an identical document is not seen as a change.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::{MappingSource, SourceVersion};
use crate::error::HostgateError;

#[derive(Clone)]
pub struct MemorySource {
    current: Arc<ArcSwap<Config>>,
}

impl MemorySource {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Replace the document served on the next load. Clones share the
    /// same document, so a handle kept by the caller can drive refreshes.
    pub fn replace(&self, config: Config) {
        self.current.store(Arc::new(config));
    }

    fn version_of(config: &Config) -> Result<SourceVersion, HostgateError> {
        let json = serde_json::to_vec(config).map_err(|e| HostgateError::MappingParse {
            path: "memory".into(),
            source: Box::new(e),
        })?;
        Ok(SourceVersion::Hash(sha256_hex(&json)))
    }
}

#[async_trait]
impl MappingSource for MemorySource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<(Config, SourceVersion), HostgateError> {
        let config = Config::clone(&self.current.load());
        let version = Self::version_of(&config)?;
        Ok((config, version))
    }

    async fn has_changed(&self, current: &SourceVersion) -> Result<bool, HostgateError> {
        Ok(*current != Self::version_of(&self.current.load())?)
    }
}
