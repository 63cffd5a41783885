//! Per-mapping upstream connection pools.
//!
//! [`HttpClientProvider`] keeps one [`ClientPool`] per mapping id and
//! reconciles that table against each newly activated [`MappingSet`] in two
//! phases. [`prepare`](HttpClientProvider::prepare) binds every mapping of the
//! incoming set to its pool and publishes pools for new mappings before the
//! set becomes visible, so a request never resolves a mapping without a pool. [`commit`](HttpClientProvider::commit) runs
//! after the swap: it stops handing out pools of removed or reconfigured
//! mappings and moves them to a draining list. A draining pool is discarded
//! once no in-flight call holds it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::config::model::PoolSettings;
use crate::error::HostgateError;
use crate::mapping::{MappingOptions, MappingSet};

pub type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Full<Bytes>>;

/// Connection-level settings. Two pools with equal settings are
/// interchangeable, so a mapping whose settings did not change keeps its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub pool: PoolSettings,
}

impl From<&MappingOptions> for ClientSettings {
    fn from(options: &MappingOptions) -> Self {
        Self {
            connect_timeout: options.connect_timeout,
            pool: options.pool.clone(),
        }
    }
}

#[must_use]
pub fn build_http_client(settings: &ClientSettings) -> HttpClient {
    // With both `ring` and `aws-lc-rs` compiled in, rustls cannot pick a
    // provider on its own.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(settings.connect_timeout));
    http.set_nodelay(true);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(settings.pool.idle_timeout))
        .pool_max_idle_per_host(settings.pool.max_idle_per_host)
        .build(https)
}

/// The upstream client of one mapping plus its concurrency bound.
#[derive(Debug)]
pub struct ClientPool {
    mapping_id: String,
    generation: u64,
    settings: ClientSettings,
    client: HttpClient,
    permits: Arc<Semaphore>,
    in_flight: AtomicUsize,
}

impl ClientPool {
    fn new(mapping_id: &str, generation: u64, settings: ClientSettings) -> Self {
        Self {
            mapping_id: mapping_id.to_string(),
            generation,
            client: build_http_client(&settings),
            permits: Arc::new(Semaphore::new(settings.pool.max_connections)),
            settings,
            in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn mapping_id(&self) -> &str {
        &self.mapping_id
    }

    /// Monotonic build counter; a replaced pool always has a new generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Reserve one call slot, waiting up to the pool's acquire timeout.
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolLease, PoolExhausted> {
        let wait = Duration::from_millis(self.settings.pool.acquire_timeout);
        let permit = match tokio::time::timeout(wait, Arc::clone(&self.permits).acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                return Err(PoolExhausted {
                    mapping_id: self.mapping_id.clone(),
                    waited: wait,
                })
            }
        };
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Ok(PoolLease {
            pool: Arc::clone(self),
            _permit: permit,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("client pool for '{mapping_id}' had no free capacity within {}ms", waited.as_millis())]
pub struct PoolExhausted {
    pub mapping_id: String,
    pub waited: Duration,
}

/// One reserved call slot. Keeps its pool alive until dropped.
#[derive(Debug)]
pub struct PoolLease {
    pool: Arc<ClientPool>,
    _permit: OwnedSemaphorePermit,
}

impl PoolLease {
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.pool.client
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// What a reconciliation changed, by mapping id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: Vec<String>,
    pub replaced: Vec<String>,
    pub kept: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.replaced.is_empty() && self.removed.is_empty()
    }
}

/// Result of [`HttpClientProvider::prepare`], consumed by
/// [`HttpClientProvider::commit`].
#[derive(Debug)]
#[must_use = "a prepared plan must be committed"]
pub struct ReconcilePlan {
    next: HashMap<String, Arc<ClientPool>>,
    report: ReconcileReport,
}

impl ReconcilePlan {
    pub const fn report(&self) -> &ReconcileReport {
        &self.report
    }
}

#[derive(Debug, Default)]
pub struct HttpClientProvider {
    pools: ArcSwap<HashMap<String, Arc<ClientPool>>>,
    draining: Mutex<Vec<Arc<ClientPool>>>,
    generation: AtomicU64,
}

impl HttpClientProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The active pool for `mapping_id`.
    pub fn get(&self, mapping_id: &str) -> Result<Arc<ClientPool>, HostgateError> {
        self.pools
            .load()
            .get(mapping_id)
            .cloned()
            .ok_or_else(|| HostgateError::NoSuchPool(mapping_id.to_string()))
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pools.load().len()
    }

    pub async fn draining_count(&self) -> usize {
        self.draining.lock().await.len()
    }

    /// Bring the pool table in line with `set` in one step.
    pub async fn reconcile(&self, set: &MappingSet) -> ReconcileReport {
        let plan = self.prepare(set);
        self.commit(plan).await
    }

    /// Build pools for new and reconfigured mappings, and publish the
    /// brand-new ones alongside the current table. Callers serialize
    /// prepare/commit pairs.
    pub fn prepare(&self, set: &MappingSet) -> ReconcilePlan {
        let current = self.pools.load_full();
        let mut next = HashMap::with_capacity(set.len());
        let mut report = ReconcileReport::default();

        for mapping in set.iter() {
            let id = mapping.id();
            let settings = ClientSettings::from(mapping.options());
            let pool = match current.get(id) {
                Some(existing) if existing.settings == settings => {
                    report.kept.push(id.to_string());
                    Arc::clone(existing)
                }
                Some(_) => {
                    report.replaced.push(id.to_string());
                    Arc::new(self.build_pool(id, settings))
                }
                None => {
                    report.created.push(id.to_string());
                    Arc::new(self.build_pool(id, settings))
                }
            };
            mapping.bind_pool(Arc::clone(&pool));
            next.insert(id.to_string(), pool);
        }
        report.removed = current
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();

        if !report.created.is_empty() {
            // Requests still see the old set until the swap, so old pools stay
            // reachable; new ids only need to exist by the time it happens.
            let mut union = HashMap::clone(&current);
            for id in &report.created {
                if let Some(pool) = next.get(id) {
                    union.insert(id.clone(), Arc::clone(pool));
                }
            }
            self.pools.store(Arc::new(union));
        }

        ReconcilePlan { next, report }
    }

    /// Publish the prepared table and retire pools the active set no longer uses.
    pub async fn commit(&self, plan: ReconcilePlan) -> ReconcileReport {
        let ReconcilePlan { next, report } = plan;
        let next = Arc::new(next);
        let previous = self.pools.swap(Arc::clone(&next));

        let retired: Vec<Arc<ClientPool>> = previous
            .iter()
            .filter(|(id, pool)| {
                next.get(id.as_str())
                    .map_or(true, |active| !Arc::ptr_eq(active, *pool))
            })
            .map(|(_, pool)| Arc::clone(pool))
            .collect();
        drop(previous);

        if !retired.is_empty() {
            let mut draining = self.draining.lock().await;
            for pool in retired {
                tracing::debug!(
                    mapping = %pool.mapping_id,
                    generation = pool.generation,
                    in_flight = pool.in_flight(),
                    "client pool retired"
                );
                draining.push(pool);
            }
        }
        self.sweep().await;

        if !report.is_noop() {
            tracing::info!(
                created = report.created.len(),
                replaced = report.replaced.len(),
                removed = report.removed.len(),
                kept = report.kept.len(),
                "client pools reconciled"
            );
        }
        report
    }

    /// Discard draining pools nothing references any more. Returns how many
    /// were discarded.
    pub async fn sweep(&self) -> usize {
        let mut draining = self.draining.lock().await;
        let before = draining.len();
        draining.retain(|pool| Arc::strong_count(pool) > 1);
        let discarded = before - draining.len();
        if discarded > 0 {
            tracing::debug!(discarded, remaining = draining.len(), "drained client pools");
        }
        discarded
    }

    fn build_pool(&self, mapping_id: &str, settings: ClientSettings) -> ClientPool {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        ClientPool::new(mapping_id, generation, settings)
    }
}
