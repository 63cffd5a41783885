//! Mapping sources, the mapping document model, and validation.
//!
//! Defines the [`MappingSource`] trait for pluggable mapping backends,
//! the [`SourceResolver`] for primary/fallback source resolution, and
//! the [`SourceVersion`] enum for change detection. Submodules provide
//! the data model, validation logic, and concrete source implementations.

pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;

use crate::error::HostgateError;
use model::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SourceVersion {
    Hash(String),
}

impl SourceVersion {
    /// Short form for logs and the health endpoint.
    #[must_use]
    pub fn short(&self) -> &str {
        match self {
            Self::Hash(h) => h.get(..8).unwrap_or(h),
        }
    }
}

impl std::fmt::Display for SourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(h) => f.write_str(h),
        }
    }
}

// async_trait is required here because MappingSource is used as Box<dyn MappingSource>
// and native async fn in traits does not support dyn dispatch.
/// Supplies raw mapping records on demand. Sources only parse; the
/// [`MappingsProvider`](crate::mapping::provider::MappingsProvider) validates
/// every candidate before it can become active.
#[async_trait]
pub trait MappingSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<(Config, SourceVersion), HostgateError>;
    async fn has_changed(&self, current: &SourceVersion) -> Result<bool, HostgateError>;
}

pub struct SourceResolver {
    primary: Box<dyn MappingSource>,
    fallback: Option<Box<dyn MappingSource>>,
}

impl SourceResolver {
    #[must_use]
    pub fn new(primary: Box<dyn MappingSource>, fallback: Option<Box<dyn MappingSource>>) -> Self {
        Self { primary, fallback }
    }

    pub async fn load_with_fallback(&self) -> Result<(Config, SourceVersion), HostgateError> {
        match self.primary.load().await {
            Ok(result) => Ok(result),
            Err(primary_err) => {
                if let Some(ref fallback) = self.fallback {
                    tracing::warn!(
                        primary = self.primary.name(),
                        fallback = fallback.name(),
                        error = %primary_err,
                        "primary mapping source failed, using fallback"
                    );
                    fallback.load().await
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    #[must_use]
    pub fn primary_name(&self) -> &'static str {
        self.primary.name()
    }

    #[must_use]
    pub fn primary(&self) -> &dyn MappingSource {
        &*self.primary
    }
}

#[async_trait]
impl MappingSource for SourceResolver {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn load(&self) -> Result<(Config, SourceVersion), HostgateError> {
        self.load_with_fallback().await
    }

    async fn has_changed(&self, current: &SourceVersion) -> Result<bool, HostgateError> {
        self.primary.has_changed(current).await
    }
}
