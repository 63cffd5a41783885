//! Upstream dispatch with destination failover.
//!
//! [`RequestForwarder::forward`] walks the mapping's attempt plan: each attempt
//! rewrites the URI and `Host` for one destination, takes a lease on the
//! mapping's client pool and sends the request under the mapping's read
//! timeout. Timeouts and refused connections move on to the next destination;
//! every other failure, and any response the upstream sends back, ends the
//! request.

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use url::Url;

use super::client_pool::{ClientPool, HttpClientProvider};
use super::headers;
use super::request::{RequestData, ResponseData};
use super::trace::{TraceId, TraceInterceptor};
use crate::mapping::Mapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardErrorKind {
    Timeout,
    ConnectionRefused,
    UpstreamError,
    Other,
}

impl ForwardErrorKind {
    /// Whether the next destination may be tried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionRefused)
    }

    /// Status answered to the client once retries are exhausted.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} forwarding to {destination} after {attempts} attempt(s): {message}")]
pub struct ForwardError {
    pub kind: ForwardErrorKind,
    pub destination: String,
    pub attempts: u32,
    pub message: String,
}

impl ForwardError {
    fn new(kind: ForwardErrorKind, destination: &Url, message: impl Into<String>) -> Self {
        Self {
            kind,
            destination: destination.to_string(),
            attempts: 1,
            message: message.into(),
        }
    }
}

pub struct RequestForwarder {
    clients: Arc<HttpClientProvider>,
    trace: Arc<dyn TraceInterceptor>,
}

impl RequestForwarder {
    #[must_use]
    pub fn new(clients: Arc<HttpClientProvider>, trace: Arc<dyn TraceInterceptor>) -> Self {
        Self { clients, trace }
    }

    pub async fn forward(
        &self,
        request: &RequestData,
        trace_id: &TraceId,
        mapping: &Mapping,
    ) -> Result<ResponseData, ForwardError> {
        let plan = mapping.attempt_plan();
        let outbound_headers = headers::build_outbound_headers(request, mapping.options(), trace_id);

        // The pool bound with the resolved mapping stays valid for this
        // request even if a refresh has since retired it.
        let pool = match mapping.pool() {
            Some(pool) => Arc::clone(pool),
            None => match self.clients.get(mapping.id()) {
                Ok(pool) => pool,
                Err(e) => {
                    let error = ForwardError {
                        kind: ForwardErrorKind::Other,
                        destination: mapping.host().to_string(),
                        attempts: 0,
                        message: e.to_string(),
                    };
                    self.trace.on_forward_error(trace_id, mapping, &error);
                    return Err(error);
                }
            },
        };

        for (n, &idx) in plan.iter().enumerate() {
            let attempt = u32::try_from(n + 1).unwrap_or(u32::MAX);
            let Some(destination) = mapping.destinations().get(idx) else {
                continue;
            };
            self.trace.on_forward_start(trace_id, mapping, destination, attempt);

            match self
                .attempt(request, &outbound_headers, &pool, destination, mapping)
                .await
            {
                Ok(response) => {
                    self.trace.on_forwarded(trace_id, mapping, &response, attempt);
                    return Ok(response);
                }
                Err(mut error) => {
                    error.attempts = attempt;
                    if error.kind.is_retryable() && n + 1 < plan.len() {
                        tracing::warn!(
                            trace_id = %trace_id,
                            mapping = mapping.id(),
                            destination = %destination,
                            kind = ?error.kind,
                            attempt,
                            "destination failed, trying next"
                        );
                        continue;
                    }
                    self.trace.on_forward_error(trace_id, mapping, &error);
                    return Err(error);
                }
            }
        }

        let error = ForwardError {
            kind: ForwardErrorKind::Other,
            destination: mapping.host().to_string(),
            attempts: 0,
            message: "mapping has no destinations".into(),
        };
        self.trace.on_forward_error(trace_id, mapping, &error);
        Err(error)
    }

    async fn attempt(
        &self,
        request: &RequestData,
        outbound_headers: &HeaderMap,
        pool: &Arc<ClientPool>,
        destination: &Url,
        mapping: &Mapping,
    ) -> Result<ResponseData, ForwardError> {
        let uri = destination_uri(destination, request.uri(), mapping.path_preserved())
            .map_err(|e| ForwardError::new(ForwardErrorKind::Other, destination, e.to_string()))?;

        let mut headers = outbound_headers.clone();
        if !mapping.options().preserve_host {
            headers::rewrite_host(&mut headers, destination);
        }

        let lease = pool
            .acquire()
            .await
            .map_err(|e| ForwardError::new(ForwardErrorKind::Other, destination, e.to_string()))?;

        let mut outbound = hyper::Request::new(Full::new(request.body().clone()));
        *outbound.method_mut() = request.method().clone();
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        let read_timeout = mapping.options().read_timeout;
        let exchange = async {
            let response = lease
                .client()
                .request(outbound)
                .await
                .map_err(|e| (classify(&e), e.to_string()))?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| (ForwardErrorKind::UpstreamError, format!("body read error: {e}")))?
                .to_bytes();
            Ok::<_, (ForwardErrorKind, String)>(ResponseData {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        match tokio::time::timeout(read_timeout, exchange).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err((kind, message))) => Err(ForwardError::new(kind, destination, message)),
            Err(_) => Err(ForwardError::new(
                ForwardErrorKind::Timeout,
                destination,
                format!("no response within {}ms", read_timeout.as_millis()),
            )),
        }
    }
}

/// Target URI for one destination. With `path_preserved` the inbound path and
/// query are appended to the destination base path; otherwise the destination
/// path replaces the inbound one and only the query is carried over.
pub fn destination_uri(
    destination: &Url,
    original: &Uri,
    path_preserved: bool,
) -> Result<Uri, axum::http::uri::InvalidUri> {
    let host = destination.host_str().unwrap_or_default();
    let authority = destination
        .port()
        .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
    let base = destination.path().trim_end_matches('/');

    let target = if path_preserved {
        let pq = original.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}://{authority}{base}{pq}", destination.scheme())
    } else {
        let path = if base.is_empty() { "/" } else { destination.path() };
        match original.query() {
            Some(query) => format!("{}://{authority}{path}?{query}", destination.scheme()),
            None => format!("{}://{authority}{path}", destination.scheme()),
        }
    };
    target.parse()
}

/// Map a client error onto a [`ForwardErrorKind`] by the first I/O error in
/// its source chain.
fn classify(err: &hyper_util::client::legacy::Error) -> ForwardErrorKind {
    match find_io_error(err).map(io::Error::kind) {
        Some(io::ErrorKind::TimedOut) => ForwardErrorKind::Timeout,
        Some(io::ErrorKind::ConnectionRefused) => ForwardErrorKind::ConnectionRefused,
        _ if err.is_connect() => ForwardErrorKind::ConnectionRefused,
        _ => ForwardErrorKind::UpstreamError,
    }
}

fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        current = e.source();
    }
    None
}
