//! Redis-backed mapping source with SHA256 change detection.
//!
//! [`RedisSource`] implements [`MappingSource`] for a control plane that
//! publishes the mapping document as a JSON string in Redis under the key
//! `hostgate:{namespace}:mappings`. It reads the value asynchronously via a
//! multiplexed Tokio connection, deserializes the JSON into a
//! [`Config`](crate::config::model::Config) and computes a SHA256 hash for
//! version tracking.

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::{parse_json_hash, sha256_hex};
use crate::config::{MappingSource, SourceVersion};
use crate::error::HostgateError;

pub struct RedisSource {
    connection: Mutex<redis::aio::MultiplexedConnection>,
    key: String,
}

impl RedisSource {
    pub async fn new(url: &str, namespace: &str) -> Result<Self, HostgateError> {
        let client = redis::Client::open(url).map_err(|e| HostgateError::Source {
            backend: "redis",
            source: Box::new(e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HostgateError::Source {
                backend: "redis",
                source: Box::new(e),
            })?;

        Ok(Self {
            connection: Mutex::new(connection),
            key: mappings_key(namespace),
        })
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn read_content(&self) -> Result<String, HostgateError> {
        let mut conn = self.connection.lock().await;

        let value: Option<String> =
            conn.get(&self.key)
                .await
                .map_err(|e| HostgateError::Source {
                    backend: "redis",
                    source: Box::new(e),
                })?;

        value.ok_or_else(|| HostgateError::MappingParse {
            path: self.key.clone(),
            source: format!("key '{}' not found in Redis", self.key).into(),
        })
    }
}

fn mappings_key(namespace: &str) -> String {
    format!("hostgate:{namespace}:mappings")
}

#[async_trait]
impl MappingSource for RedisSource {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn load(
        &self,
    ) -> Result<(crate::config::model::Config, SourceVersion), HostgateError> {
        let content = self.read_content().await?;
        parse_json_hash(&content, &self.key)
    }

    async fn has_changed(&self, current: &SourceVersion) -> Result<bool, HostgateError> {
        let content = self.read_content().await?;
        Ok(*current != SourceVersion::Hash(sha256_hex(content.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_namespaced() {
        assert_eq!(mappings_key("staging"), "hostgate:staging:mappings");
    }
}
