//! `GET /_hostgate/health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the gateway
//! version, uptime, the active mapping set's source and version, client
//! pool counts, and cumulative request statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub mappings: MappingsHealth,
    pub pools: PoolsHealth,
    pub stats: StatsResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MappingsHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub mappings: usize,
    pub destinations: usize,
    pub reloads: u64,
    pub rejected_reloads: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolsHealth {
    pub active: usize,
    pub draining: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub requests_unmatched: u64,
    pub requests_redirected: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let provider = state.pipeline.mappings();
    let snapshot = provider.snapshot();
    let reloads = provider.stats();
    let stats = state.pipeline.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        mappings: MappingsHealth {
            source: provider.source_name().to_string(),
            version: snapshot
                .version()
                .map(|v| v.short().to_string())
                .unwrap_or_default(),
            loaded_ago_seconds: snapshot.loaded_at().elapsed().as_secs(),
            mappings: snapshot.len(),
            destinations: snapshot.total_destinations(),
            // The initial load is not a reload.
            reloads: reloads.applied.load(Ordering::Relaxed).saturating_sub(1),
            rejected_reloads: reloads.rejected.load(Ordering::Relaxed),
        },
        pools: PoolsHealth {
            active: provider.clients().active_count(),
            draining: provider.clients().draining_count().await,
        },
        stats: StatsResponse {
            requests_forwarded: stats.forwarded.load(Ordering::Relaxed),
            requests_failed: stats.failed.load(Ordering::Relaxed),
            requests_unmatched: stats.unmatched.load(Ordering::Relaxed),
            requests_redirected: stats.redirected.load(Ordering::Relaxed),
        },
    })
}
