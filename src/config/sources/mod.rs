//! Concrete [`MappingSource`](super::MappingSource) implementations.
//!
//! Provides file-based sources (YAML, JSON, TOML) gated by feature flags,
//! an in-memory source for programmatic mappings, the Redis control-plane
//! source, and the [`parse_config_str`] helper for format-specific
//! deserialization.

pub mod file_source;
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_source;

use sha2::{Digest, Sha256};

use crate::config::model::Config;
use crate::config::SourceVersion;
use crate::error::HostgateError;

/// Parse a mapping document string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, HostgateError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| HostgateError::MappingParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| HostgateError::MappingParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| HostgateError::MappingParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(HostgateError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Deserialize a JSON document into [`Config`] and compute its SHA-256 version hash.
///
/// Shared by the control-plane sources, which all store the mapping
/// document as JSON.
pub fn parse_json_hash(json: &str, source_label: &str) -> Result<(Config, SourceVersion), HostgateError> {
    let config: Config = serde_json::from_str(json).map_err(|e| HostgateError::MappingParse {
        path: source_label.to_string(),
        source: Box::new(e),
    })?;

    let hash = sha256_hex(json.as_bytes());
    Ok((config, SourceVersion::Hash(hash)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_stable_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn parse_json_hash_versions_by_content() {
        let (config, v1) = parse_json_hash(r#"{"mappings": []}"#, "test").unwrap();
        let (_, v2) = parse_json_hash(r#"{"mappings":[]}"#, "test").unwrap();
        assert!(config.mappings.is_empty());
        assert_ne!(v1, v2);
    }

    #[test]
    fn parse_json_hash_reports_label_on_error() {
        let err = parse_json_hash("{", "redis:key").unwrap_err();
        assert!(err.to_string().contains("redis:key"));
    }
}
