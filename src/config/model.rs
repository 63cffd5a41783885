//! Serde data structures for the hostgate mapping document.
//!
//! Contains [`Config`] (the root), [`MappingRecord`], [`Defaults`],
//! [`PoolSettings`], [`SelectorKind`] and [`HeaderRules`]. All types derive
//! `Serialize` and `Deserialize` with `deny_unknown_fields` for strict
//! parsing. These are the raw records handed over by a mapping source;
//! [`crate::mapping::MappingSet`] turns them into runtime mappings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

const fn default_connect_timeout() -> u64 {
    500
}

const fn default_read_timeout() -> u64 {
    2000
}

const fn default_true() -> bool {
    true
}

const fn default_max_idle_per_host() -> usize {
    32
}

const fn default_idle_timeout() -> u64 {
    30
}

const fn default_max_connections() -> usize {
    256
}

const fn default_acquire_timeout() -> u64 {
    1000
}

fn is_default_connect_timeout(v: &u64) -> bool {
    *v == default_connect_timeout()
}

fn is_default_read_timeout(v: &u64) -> bool {
    *v == default_read_timeout()
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_default_defaults(v: &Defaults) -> bool {
    v.connect_timeout == default_connect_timeout()
        && v.read_timeout == default_read_timeout()
        && v.retry_count == 0
        && v.forward_headers
        && v.proxy_headers
        && v.strip_hop_by_hop
        && v.headers.is_default()
        && v.pool == PoolSettings::default()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "is_default_defaults")]
    pub defaults: Defaults,

    #[serde(default)]
    pub mappings: Vec<MappingRecord>,
}

impl Config {
    #[must_use]
    pub fn total_destinations(&self) -> usize {
        self.mappings.iter().map(|m| m.destinations.len()).sum()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(
        default = "default_connect_timeout",
        skip_serializing_if = "is_default_connect_timeout"
    )]
    pub connect_timeout: u64,

    #[serde(
        default = "default_read_timeout",
        skip_serializing_if = "is_default_read_timeout"
    )]
    pub read_timeout: u64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_count: u32,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub forward_headers: bool,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub proxy_headers: bool,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub strip_hop_by_hop: bool,

    #[serde(default, skip_serializing_if = "HeaderRules::is_default")]
    pub headers: HeaderRules,

    #[serde(default, skip_serializing_if = "PoolSettings::is_default")]
    pub pool: PoolSettings,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            retry_count: 0,
            forward_headers: default_true(),
            proxy_headers: default_true(),
            strip_hop_by_hop: default_true(),
            headers: HeaderRules::default(),
            pool: PoolSettings::default(),
        }
    }
}

/// One routing rule as supplied by a mapping source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MappingRecord {
    /// Stable identity used to key the client pool. Defaults to the
    /// lowercased host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub host: String,

    pub destinations: Vec<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub path_preserved: bool,

    #[serde(default, skip_serializing_if = "SelectorKind::is_default")]
    pub selector: SelectorKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub preserve_host: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub force_https: bool,

    #[serde(default, skip_serializing_if = "HeaderRules::is_default")]
    pub headers: HeaderRules,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolSettings>,
}

impl MappingRecord {
    /// A record with every option left to the document defaults.
    #[must_use]
    pub fn new(host: impl Into<String>, destinations: Vec<String>) -> Self {
        Self {
            name: None,
            host: host.into(),
            destinations,
            path_preserved: true,
            selector: SelectorKind::default(),
            connect_timeout: None,
            read_timeout: None,
            retry_count: None,
            preserve_host: false,
            force_https: false,
            headers: HeaderRules::default(),
            pool: None,
        }
    }

    /// The mapping identity: explicit name, or the lowercased host.
    #[must_use]
    pub fn id(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.host.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorKind {
    #[default]
    RoundRobin,
    FirstAvailable,
    Random,
}

impl SelectorKind {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolSettings {
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,

    /// Seconds an idle upstream connection is kept open.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Upper bound on concurrent in-flight calls through the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Milliseconds a call waits for pool capacity before failing.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_max_idle_per_host(),
            idle_timeout: default_idle_timeout(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

impl PoolSettings {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRules {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub add: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strip: Vec<String>,
}

impl HeaderRules {
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.add.is_empty() && self.strip.is_empty()
    }
}
