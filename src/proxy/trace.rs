//! Per-request trace ids and lifecycle reporting.
//!
//! The pipeline calls a [`TraceInterceptor`] at each checkpoint of a request:
//! received, then not-found or forwarded/error, then completed. Callbacks are
//! reporting only: they return nothing and must not panic, so they cannot
//! change how the request is answered.

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use url::Url;
use uuid::Uuid;

use super::forwarder::ForwardError;
use super::request::{RequestData, ResponseData};
use crate::mapping::Mapping;

/// Opaque per-request correlation id (a random UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(Uuid);

impl TraceId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub trait TraceInterceptor: Send + Sync {
    fn generate_trace_id(&self) -> TraceId {
        TraceId::generate()
    }

    fn on_request_received(&self, trace_id: &TraceId, request: &RequestData);

    fn on_no_mapping_found(&self, trace_id: &TraceId, request: &RequestData);

    /// Before each attempt; `attempt` starts at 1.
    fn on_forward_start(&self, _trace_id: &TraceId, _mapping: &Mapping, _destination: &Url, _attempt: u32) {}

    fn on_redirect(&self, _trace_id: &TraceId, _mapping: &Mapping, _location: &str) {}

    fn on_forwarded(&self, trace_id: &TraceId, mapping: &Mapping, response: &ResponseData, attempts: u32);

    fn on_forward_error(&self, trace_id: &TraceId, mapping: &Mapping, error: &ForwardError);

    /// Exactly once per request, on every exit path.
    fn on_request_completed(&self, trace_id: &TraceId, status: StatusCode, elapsed: Duration);
}

/// Reports through `tracing`. Per-request events can be switched off, which
/// leaves only failures at `warn` and above.
#[derive(Debug, Clone, Copy)]
pub struct LoggingTraceInterceptor {
    enabled: bool,
}

impl LoggingTraceInterceptor {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for LoggingTraceInterceptor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TraceInterceptor for LoggingTraceInterceptor {
    fn on_request_received(&self, trace_id: &TraceId, request: &RequestData) {
        if self.enabled {
            tracing::info!(
                trace_id = %trace_id,
                method = %request.method(),
                host = request.host(),
                uri = %request.uri(),
                client = %request.client_addr(),
                "request received"
            );
        }
    }

    fn on_no_mapping_found(&self, trace_id: &TraceId, request: &RequestData) {
        tracing::warn!(
            trace_id = %trace_id,
            host = request.host(),
            "no mapping for host"
        );
    }

    fn on_forward_start(&self, trace_id: &TraceId, mapping: &Mapping, destination: &Url, attempt: u32) {
        if self.enabled {
            tracing::debug!(
                trace_id = %trace_id,
                mapping = mapping.id(),
                destination = %destination,
                attempt,
                "forwarding"
            );
        }
    }

    fn on_redirect(&self, trace_id: &TraceId, mapping: &Mapping, location: &str) {
        if self.enabled {
            tracing::info!(
                trace_id = %trace_id,
                mapping = mapping.id(),
                location,
                "redirecting"
            );
        }
    }

    fn on_forwarded(&self, trace_id: &TraceId, mapping: &Mapping, response: &ResponseData, attempts: u32) {
        if self.enabled {
            tracing::info!(
                trace_id = %trace_id,
                mapping = mapping.id(),
                status = response.status.as_u16(),
                attempts,
                "forwarded"
            );
        }
    }

    fn on_forward_error(&self, trace_id: &TraceId, mapping: &Mapping, error: &ForwardError) {
        tracing::error!(
            trace_id = %trace_id,
            mapping = mapping.id(),
            kind = ?error.kind,
            destination = %error.destination,
            attempts = error.attempts,
            error = %error.message,
            "forward failed"
        );
    }

    fn on_request_completed(&self, trace_id: &TraceId, status: StatusCode, elapsed: Duration) {
        if self.enabled {
            tracing::info!(
                trace_id = %trace_id,
                status = status.as_u16(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
        }
    }
}
