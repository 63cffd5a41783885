//! Owner of the active [`MappingSet`].
//!
//! Readers resolve hosts against an `ArcSwap` snapshot without locking.
//! Refreshes are serialized by an async mutex and follow a fixed order:
//! ask the source whether its version moved, load, validate and
//! build, prepare client pools, swap the set in, then commit the pool table.
//! A rejected document never replaces the active set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use super::refresh::{RefreshContext, RefreshStrategy, RefreshTrigger};
use super::{Mapping, MappingSet};
use crate::config::MappingSource;
use crate::error::HostgateError;
use crate::proxy::client_pool::{HttpClientProvider, ReconcileReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The strategy did not ask for a refresh.
    NotDue,
    /// Another refresh was already running; this check was dropped.
    InFlight,
    /// The source returned the version that is already active.
    Unchanged,
    Applied {
        mappings: usize,
        pools: ReconcileReport,
    },
    /// Loading or validation failed; the previous set stays active.
    Rejected { reason: String },
}

#[derive(Debug, Default)]
pub struct ReloadStats {
    pub applied: AtomicU64,
    pub rejected: AtomicU64,
}

pub struct MappingsProvider {
    active: ArcSwap<MappingSet>,
    source: Box<dyn MappingSource>,
    strategy: Box<dyn RefreshStrategy>,
    clients: Arc<HttpClientProvider>,
    refresh_lock: Mutex<()>,
    epoch: Instant,
    last_attempt_ms: AtomicU64,
    stats: ReloadStats,
}

impl MappingsProvider {
    /// Load the initial set. Unlike a later refresh, a failure here is fatal
    /// because there is no previous set to keep serving.
    pub async fn bootstrap(
        source: Box<dyn MappingSource>,
        strategy: Box<dyn RefreshStrategy>,
        clients: Arc<HttpClientProvider>,
    ) -> Result<Self, HostgateError> {
        let provider = Self {
            active: ArcSwap::from_pointee(MappingSet::empty()),
            source,
            strategy,
            clients,
            refresh_lock: Mutex::new(()),
            epoch: Instant::now(),
            last_attempt_ms: AtomicU64::new(0),
            stats: ReloadStats::default(),
        };
        provider.refresh().await?;
        Ok(provider)
    }

    #[must_use]
    pub fn resolve(&self, host: &str) -> Option<Arc<Mapping>> {
        self.active.load().resolve(host)
    }

    /// The active set as one consistent generation.
    #[must_use]
    pub fn snapshot(&self) -> Arc<MappingSet> {
        self.active.load_full()
    }

    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    #[must_use]
    pub const fn clients(&self) -> &Arc<HttpClientProvider> {
        &self.clients
    }

    #[must_use]
    pub const fn stats(&self) -> &ReloadStats {
        &self.stats
    }

    /// Consult the strategy and refresh when it asks for it. A refresh already
    /// in progress is not waited for. Failures are logged and the active set
    /// stays in place.
    pub async fn refresh_if_due(&self, trigger: RefreshTrigger<'_>) -> RefreshOutcome {
        let ctx = RefreshContext {
            trigger,
            since_last_refresh: self.since_last_attempt(),
        };
        if !self.strategy.should_refresh(&ctx) {
            return RefreshOutcome::NotDue;
        }
        let Ok(_guard) = self.refresh_lock.try_lock() else {
            tracing::trace!("mapping refresh already in flight");
            return RefreshOutcome::InFlight;
        };
        match self.refresh_locked().await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    source = self.source.name(),
                    error = %e,
                    "mapping refresh rejected, keeping active mappings"
                );
                RefreshOutcome::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Refresh now, waiting for any refresh in progress to finish first.
    pub async fn refresh(&self) -> Result<RefreshOutcome, HostgateError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<RefreshOutcome, HostgateError> {
        self.mark_attempt();

        let current = self.active.load().version().cloned();
        if let Some(current) = current {
            let changed = self.source.has_changed(&current).await.inspect_err(|_| {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            })?;
            if !changed {
                return Ok(RefreshOutcome::Unchanged);
            }
        }

        let (config, version) = self.source.load().await.inspect_err(|_| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        })?;

        if self.active.load().version() == Some(&version) {
            tracing::trace!(version = version.short(), "mappings unchanged");
            return Ok(RefreshOutcome::Unchanged);
        }

        let set = MappingSet::build(&config, version).inspect_err(|_| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        })?;

        let plan = self.clients.prepare(&set);
        let mappings = set.len();
        let version = set.version().map(|v| v.short().to_string()).unwrap_or_default();
        self.active.store(Arc::new(set));
        let pools = self.clients.commit(plan).await;
        self.stats.applied.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            source = self.source.name(),
            version = %version,
            mappings,
            "mappings activated"
        );
        Ok(RefreshOutcome::Applied { mappings, pools })
    }

    fn since_last_attempt(&self) -> Duration {
        let now = self.epoch.elapsed();
        let last = Duration::from_millis(self.last_attempt_ms.load(Ordering::Relaxed));
        now.saturating_sub(last)
    }

    fn mark_attempt(&self) {
        let millis = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_attempt_ms.store(millis, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for MappingsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingsProvider")
            .field("source", &self.source.name())
            .field("mappings", &self.active.load().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{Config, MappingRecord};
    use crate::config::sources::memory::MemorySource;
    use crate::mapping::refresh::{Never, OnEveryRequest};

    fn config(hosts: &[&str]) -> Config {
        Config {
            mappings: hosts
                .iter()
                .map(|h| MappingRecord::new(*h, vec!["http://127.0.0.1:9".into()]))
                .collect(),
            ..Config::default()
        }
    }

    async fn provider(
        source: &MemorySource,
        strategy: Box<dyn RefreshStrategy>,
    ) -> MappingsProvider {
        MappingsProvider::bootstrap(
            Box::new(source.clone()),
            strategy,
            Arc::new(HttpClientProvider::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn bootstrap_activates_initial_set() {
        let source = MemorySource::new(config(&["a.com"]));
        let provider = provider(&source, Box::new(Never)).await;
        assert!(provider.resolve("A.com").is_some());
        assert!(provider.clients().get("a.com").is_ok());
        assert_eq!(provider.stats().applied.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn bootstrap_fails_on_invalid_document() {
        let source = MemorySource::new(config(&["a.com", "a.com"]));
        let result = MappingsProvider::bootstrap(
            Box::new(source),
            Box::new(Never),
            Arc::new(HttpClientProvider::new()),
        )
        .await;
        assert!(matches!(result, Err(HostgateError::MappingValidation { .. })));
    }

    #[tokio::test]
    async fn never_strategy_ignores_source_changes() {
        let source = MemorySource::new(config(&["a.com"]));
        let provider = provider(&source, Box::new(Never)).await;
        source.replace(config(&["b.com"]));

        let outcome = provider
            .refresh_if_due(RefreshTrigger::Request { host: "b.com" })
            .await;
        assert_eq!(outcome, RefreshOutcome::NotDue);
        assert!(provider.resolve("b.com").is_none());
    }

    #[tokio::test]
    async fn unchanged_version_is_a_noop() {
        let source = MemorySource::new(config(&["a.com"]));
        let provider = provider(&source, Box::new(OnEveryRequest)).await;
        let before = provider.snapshot();

        let outcome = provider
            .refresh_if_due(RefreshTrigger::Request { host: "a.com" })
            .await;
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert!(Arc::ptr_eq(&before, &provider.snapshot()));
    }

    #[tokio::test]
    async fn rejected_refresh_keeps_active_set() {
        let source = MemorySource::new(config(&["a.com"]));
        let provider = provider(&source, Box::new(OnEveryRequest)).await;
        let before = provider.snapshot();

        source.replace(config(&["x.com", "X.com"]));
        let err = provider.refresh().await.unwrap_err();
        assert!(matches!(err, HostgateError::MappingValidation { .. }));
        assert!(Arc::ptr_eq(&before, &provider.snapshot()));
        assert_eq!(provider.stats().rejected.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn due_refresh_failure_is_reported_not_raised() {
        let source = MemorySource::new(config(&["a.com"]));
        let provider = provider(&source, Box::new(OnEveryRequest)).await;
        source.replace(config(&["a.com", "a.com"]));

        let outcome = provider
            .refresh_if_due(RefreshTrigger::Request { host: "a.com" })
            .await;
        assert!(matches!(outcome, RefreshOutcome::Rejected { .. }));
        assert!(provider.resolve("a.com").is_some());
    }

    #[tokio::test]
    async fn applied_refresh_swaps_set_and_pools() {
        let source = MemorySource::new(config(&["a.com"]));
        let provider = provider(&source, Box::new(OnEveryRequest)).await;

        source.replace(config(&["b.com"]));
        let outcome = provider.refresh().await.unwrap();
        let RefreshOutcome::Applied { mappings, pools } = outcome else {
            panic!("expected applied refresh, got {outcome:?}");
        };
        assert_eq!(mappings, 1);
        assert_eq!(pools.created, vec!["b.com"]);
        assert_eq!(pools.removed, vec!["a.com"]);
        assert!(provider.resolve("a.com").is_none());
        assert!(provider.clients().get("a.com").is_err());
    }
}
