//! Per-request orchestration.
//!
//! [`ProxyPipeline::handle`] runs one request through trace id assignment,
//! refresh check, host resolution, the interceptor chain and the forwarder,
//! and always produces a [`ResponseData`]. Completion is reported exactly once
//! whichever way the request ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;

use super::forwarder::{ForwardError, ForwardErrorKind, RequestForwarder};
use super::headers::{drop_client_headers, strip_response_hop_by_hop, X_TRACE_ID};
use super::interceptor::InterceptorChain;
use super::request::{RequestData, ResponseData};
use super::trace::{TraceId, TraceInterceptor};
use crate::mapping::provider::{MappingsProvider, RefreshOutcome};
use crate::mapping::refresh::RefreshTrigger;
use crate::mapping::Mapping;

#[derive(Debug, Default)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub unmatched: AtomicU64,
    pub redirected: AtomicU64,
}

pub struct ProxyPipeline {
    mappings: Arc<MappingsProvider>,
    interceptors: InterceptorChain,
    forwarder: RequestForwarder,
    trace: Arc<dyn TraceInterceptor>,
    stats: Stats,
}

impl ProxyPipeline {
    #[must_use]
    pub fn new(
        mappings: Arc<MappingsProvider>,
        interceptors: InterceptorChain,
        trace: Arc<dyn TraceInterceptor>,
    ) -> Self {
        let forwarder = RequestForwarder::new(Arc::clone(mappings.clients()), Arc::clone(&trace));
        Self {
            mappings,
            interceptors,
            forwarder,
            trace,
            stats: Stats::default(),
        }
    }

    #[must_use]
    pub const fn mappings(&self) -> &Arc<MappingsProvider> {
        &self.mappings
    }

    #[must_use]
    pub const fn stats(&self) -> &Stats {
        &self.stats
    }

    pub async fn handle(&self, request: RequestData) -> ResponseData {
        let started = Instant::now();
        let trace_id = self.trace.generate_trace_id();
        self.trace.on_request_received(&trace_id, &request);

        let mut response = self.dispatch(&trace_id, request).await;

        if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
            response.headers.insert(X_TRACE_ID.clone(), value);
        }
        self.trace
            .on_request_completed(&trace_id, response.status, started.elapsed());
        response
    }

    async fn dispatch(&self, trace_id: &TraceId, mut request: RequestData) -> ResponseData {
        let outcome = self
            .mappings
            .refresh_if_due(RefreshTrigger::Request {
                host: request.host(),
            })
            .await;
        if let RefreshOutcome::Applied { mappings, .. } = outcome {
            tracing::debug!(trace_id = %trace_id, mappings, "mappings refreshed before resolve");
        }

        let Some(mapping) = self.mappings.resolve(request.host()) else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            self.trace.on_no_mapping_found(trace_id, &request);
            return ResponseData::unsupported_domain();
        };

        if !mapping.options().forward_headers {
            drop_client_headers(request.headers_mut());
        }

        if let Some(location) = self.run_interceptors(&mut request, &mapping) {
            self.stats.redirected.fetch_add(1, Ordering::Relaxed);
            self.trace.on_redirect(trace_id, &mapping, &location);
            return ResponseData::redirect(&location);
        }

        match self.forwarder.forward(&request, trace_id, &mapping).await {
            Ok(mut response) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                strip_response_hop_by_hop(&mut response.headers);
                response
            }
            Err(error) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error_response(&error)
            }
        }
    }

    /// Run the chain in order; stop at the first interceptor that leaves a
    /// redirect target and return it.
    fn run_interceptors(&self, request: &mut RequestData, mapping: &Mapping) -> Option<String> {
        for interceptor in self.interceptors.iter() {
            interceptor.intercept(request, mapping);
            if let Some(location) = request.redirect_location() {
                tracing::debug!(interceptor = interceptor.name(), location, "redirect requested");
                return Some(location.to_string());
            }
        }
        None
    }
}

fn error_response(error: &ForwardError) -> ResponseData {
    let reason = match error.kind {
        ForwardErrorKind::Timeout => "Upstream timed out",
        ForwardErrorKind::ConnectionRefused => "Upstream unreachable",
        ForwardErrorKind::UpstreamError => "Upstream protocol error",
        ForwardErrorKind::Other => "Forwarding failed",
    };
    ResponseData::text(error.kind.status(), reason)
}

impl std::fmt::Debug for ProxyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyPipeline")
            .field("mappings", &self.mappings)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}
