//! Runtime routing table.
//!
//! A [`MappingSet`] is built from a validated mapping document and is
//! immutable once built: the [`provider`] publishes whole sets through an
//! atomic pointer swap, so a reader holding an `Arc<MappingSet>` always sees
//! one consistent generation. Each [`Mapping`] carries its parsed
//! destinations, a [`selector`] and fully resolved [`MappingOptions`].

pub mod provider;
pub mod refresh;
pub mod selector;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use url::Url;

use crate::config::model::{Config, Defaults, HeaderRules, MappingRecord, PoolSettings};
use crate::config::validation::validate;
use crate::config::SourceVersion;
use crate::error::HostgateError;
use crate::proxy::client_pool::ClientPool;
use selector::DestinationSelector;

/// Forwarding options of one mapping, with document defaults merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry_count: u32,
    pub forward_headers: bool,
    pub proxy_headers: bool,
    pub strip_hop_by_hop: bool,
    pub preserve_host: bool,
    pub force_https: bool,
    pub headers: HeaderRules,
    pub pool: PoolSettings,
}

impl MappingOptions {
    fn resolve(record: &MappingRecord, defaults: &Defaults) -> Self {
        // Mapping-level header additions override the defaults; strips accumulate.
        let mut add = defaults.headers.add.clone();
        add.extend(record.headers.add.clone());
        let mut strip = defaults.headers.strip.clone();
        strip.extend(record.headers.strip.iter().cloned());

        Self {
            connect_timeout: Duration::from_millis(
                record.connect_timeout.unwrap_or(defaults.connect_timeout),
            ),
            read_timeout: Duration::from_millis(record.read_timeout.unwrap_or(defaults.read_timeout)),
            retry_count: record.retry_count.unwrap_or(defaults.retry_count),
            forward_headers: defaults.forward_headers,
            proxy_headers: defaults.proxy_headers,
            strip_hop_by_hop: defaults.strip_hop_by_hop,
            preserve_host: record.preserve_host,
            force_https: record.force_https,
            headers: HeaderRules { add, strip },
            pool: record.pool.clone().unwrap_or_else(|| defaults.pool.clone()),
        }
    }
}

/// One host-to-destinations routing rule.
#[derive(Debug)]
pub struct Mapping {
    id: String,
    host: String,
    destinations: Vec<Url>,
    path_preserved: bool,
    selector: Box<dyn DestinationSelector>,
    options: MappingOptions,
    pool: OnceLock<Arc<ClientPool>>,
}

impl Mapping {
    pub fn from_record(record: &MappingRecord, defaults: &Defaults) -> Result<Self, HostgateError> {
        let destinations = record
            .destinations
            .iter()
            .map(|d| {
                Url::parse(d).map_err(|e| HostgateError::UriParse {
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: record.id(),
            host: record.host.to_ascii_lowercase(),
            destinations,
            path_preserved: record.path_preserved,
            selector: selector::for_kind(record.selector),
            options: MappingOptions::resolve(record, defaults),
            pool: OnceLock::new(),
        })
    }

    /// Stable identity keying the mapping's client pool.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lowercased inbound host this mapping answers for.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn destinations(&self) -> &[Url] {
        &self.destinations
    }

    #[must_use]
    pub const fn path_preserved(&self) -> bool {
        self.path_preserved
    }

    #[must_use]
    pub const fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// The client pool bound when this mapping's set was prepared. A request
    /// holding the mapping keeps using it even after a later refresh retires
    /// or re-keys the pool.
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<ClientPool>> {
        self.pool.get()
    }

    /// First binding wins; a mapping belongs to exactly one set.
    pub(crate) fn bind_pool(&self, pool: Arc<ClientPool>) {
        let _ = self.pool.set(pool);
    }

    /// Destination indices to try for one request, in order. Holds at most
    /// `retry_count + 1` entries and never repeats a destination.
    #[must_use]
    pub fn attempt_plan(&self) -> Vec<usize> {
        let attempts = (self.options.retry_count as usize)
            .saturating_add(1)
            .min(self.destinations.len());
        let mut plan = self.selector.plan(self.destinations.len());
        plan.truncate(attempts);
        plan
    }
}

/// A validated, atomically activated collection of mappings.
#[derive(Debug)]
pub struct MappingSet {
    mappings: Vec<Arc<Mapping>>,
    by_host: HashMap<String, usize>,
    version: Option<SourceVersion>,
    loaded_at: Instant,
}

impl MappingSet {
    /// The set active before any source has been read.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            mappings: Vec::new(),
            by_host: HashMap::new(),
            version: None,
            loaded_at: Instant::now(),
        }
    }

    /// Validate `config` and build the runtime set. Validation failure
    /// rejects the document as a whole.
    pub fn build(config: &Config, version: SourceVersion) -> Result<Self, HostgateError> {
        validate(config).map_err(|errors| HostgateError::MappingValidation { errors })?;

        let mappings = config
            .mappings
            .iter()
            .map(|record| Mapping::from_record(record, &config.defaults).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let by_host = mappings
            .iter()
            .enumerate()
            .map(|(idx, m)| (m.host.clone(), idx))
            .collect();

        Ok(Self {
            mappings,
            by_host,
            version: Some(version),
            loaded_at: Instant::now(),
        })
    }

    /// Case-insensitive exact match on the inbound host.
    #[must_use]
    pub fn resolve(&self, host: &str) -> Option<Arc<Mapping>> {
        let idx = match self.by_host.get(host) {
            Some(idx) => *idx,
            None => *self.by_host.get(&host.to_ascii_lowercase())?,
        };
        self.mappings.get(idx).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Mapping>> {
        self.mappings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    #[must_use]
    pub fn total_destinations(&self) -> usize {
        self.mappings.iter().map(|m| m.destinations.len()).sum()
    }

    #[must_use]
    pub const fn version(&self) -> Option<&SourceVersion> {
        self.version.as_ref()
    }

    #[must_use]
    pub const fn loaded_at(&self) -> Instant {
        self.loaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::SelectorKind;

    fn version() -> SourceVersion {
        SourceVersion::Hash("test".into())
    }

    fn config(records: Vec<MappingRecord>) -> Config {
        Config {
            defaults: Defaults::default(),
            mappings: records,
        }
    }

    #[test]
    fn resolves_case_insensitively() {
        let set = MappingSet::build(
            &config(vec![MappingRecord::new(
                "a.example.com",
                vec!["http://10.0.0.1:8080".into()],
            )]),
            version(),
        )
        .unwrap();

        let mapping = set.resolve("A.EXAMPLE.COM").unwrap();
        assert_eq!(mapping.host(), "a.example.com");
        assert_eq!(mapping.destinations()[0].as_str(), "http://10.0.0.1:8080/");
        assert!(set.resolve("b.example.com").is_none());
    }

    #[test]
    fn empty_set_resolves_nothing() {
        let set = MappingSet::build(&config(vec![]), version()).unwrap();
        assert!(set.is_empty());
        assert!(set.resolve("anything.com").is_none());
        assert!(MappingSet::empty().version().is_none());
    }

    #[test]
    fn invalid_document_is_rejected_whole() {
        let result = MappingSet::build(
            &config(vec![
                MappingRecord::new("x.com", vec!["http://a:80".into()]),
                MappingRecord::new("x.com", vec!["http://b:80".into()]),
            ]),
            version(),
        );
        assert!(matches!(
            result,
            Err(HostgateError::MappingValidation { .. })
        ));
    }

    #[test]
    fn options_merge_defaults_and_overrides() {
        let mut defaults = Defaults::default();
        defaults.retry_count = 2;
        defaults.headers.add.insert("x-env".into(), "prod".into());
        defaults.headers.strip.push("cookie".into());

        let mut record = MappingRecord::new("a.com", vec!["http://a:80".into()]);
        record.read_timeout = Some(7000);
        record.headers.add.insert("x-env".into(), "canary".into());
        record.headers.strip.push("authorization".into());

        let options = MappingOptions::resolve(&record, &defaults);
        assert_eq!(options.read_timeout, Duration::from_millis(7000));
        assert_eq!(options.connect_timeout, Duration::from_millis(500));
        assert_eq!(options.retry_count, 2);
        assert_eq!(options.headers.add["x-env"], "canary");
        assert_eq!(options.headers.strip, vec!["cookie", "authorization"]);
    }

    #[test]
    fn attempt_plan_is_bounded_by_retries_and_destinations() {
        let mut record = MappingRecord::new(
            "a.com",
            vec!["http://a:80".into(), "http://b:80".into(), "http://c:80".into()],
        );
        record.selector = SelectorKind::FirstAvailable;
        record.retry_count = Some(1);
        let mapping = Mapping::from_record(&record, &Defaults::default()).unwrap();
        assert_eq!(mapping.attempt_plan(), vec![0, 1]);

        record.retry_count = Some(9);
        let mapping = Mapping::from_record(&record, &Defaults::default()).unwrap();
        assert_eq!(mapping.attempt_plan(), vec![0, 1, 2]);
    }
}
