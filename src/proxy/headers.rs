//! Header construction, forwarding, and hop-by-hop stripping.
//!
//! [`build_outbound_headers`] starts from the request headers as the
//! interceptor chain left them, strips hop-by-hop headers, adds the
//! `X-Forwarded-*` set and the trace id. With `forward_headers` off the
//! pipeline calls [`drop_client_headers`] before the chain runs, so header
//! rules still reach the upstream. The `Host` header is rewritten per destination attempt by
//! [`rewrite_host`].

use std::sync::LazyLock;

use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::request::RequestData;
use super::trace::TraceId;
use crate::config::model::HeaderRules;
use crate::mapping::MappingOptions;

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub static X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");
pub static X_TRACE_ID: HeaderName = HeaderName::from_static("x-trace-id");

static HOP_BY_HOP: LazyLock<Vec<HeaderName>> = LazyLock::new(|| {
    [
        "connection",
        "keep-alive",
        "transfer-encoding",
        "te",
        "trailer",
        "upgrade",
        "proxy-authorization",
        "proxy-authenticate",
    ]
    .iter()
    .filter_map(|name| name.parse::<HeaderName>().ok())
    .collect()
});

/// Remove hop-by-hop headers, including any the `Connection` header names.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse::<HeaderName>().ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Strip hop-by-hop headers and `content-length` from an upstream response.
///
/// The body has already been fully collected, so the origin's framing headers
/// no longer apply; the server derives `content-length` from the bytes.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    headers.remove(CONTENT_LENGTH);
}

/// Add the `X-Forwarded-*` set for one hop. The client address is appended to
/// an existing `X-Forwarded-For` chain; the other three are replaced.
pub fn add_forwarding_headers(headers: &mut HeaderMap, request: &RequestData) {
    let client = request.client_addr().to_string();
    let chain = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .chain(std::iter::once(client.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }

    headers.insert(
        X_FORWARDED_PROTO.clone(),
        HeaderValue::from_static(request.scheme()),
    );
    if let Ok(value) = HeaderValue::from_str(request.host()) {
        headers.insert(X_FORWARDED_HOST.clone(), value);
    }
    headers.insert(X_FORWARDED_PORT.clone(), HeaderValue::from(request.server_port()));
}

/// Discard everything the client sent except `Host`.
pub fn drop_client_headers(headers: &mut HeaderMap) {
    let host = headers.remove(HOST);
    headers.clear();
    if let Some(host) = host {
        headers.insert(HOST, host);
    }
}

/// Headers sent on every attempt for this request.
#[must_use]
pub fn build_outbound_headers(
    request: &RequestData,
    options: &MappingOptions,
    trace_id: &TraceId,
) -> HeaderMap {
    let mut headers = request.headers().clone();

    if options.strip_hop_by_hop {
        strip_hop_by_hop(&mut headers);
    }
    // The client body is re-sent in full; hyper frames it from its length.
    headers.remove(CONTENT_LENGTH);

    if options.proxy_headers {
        add_forwarding_headers(&mut headers, request);
    }

    if let Ok(value) = HeaderValue::from_str(&trace_id.to_string()) {
        headers.insert(X_TRACE_ID.clone(), value);
    }
    headers
}

/// Point `Host` at the destination authority.
pub fn rewrite_host(headers: &mut HeaderMap, destination: &Url) {
    if let Some(host) = destination.host_str() {
        let host_value = destination
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
        if let Ok(value) = HeaderValue::from_str(&host_value) {
            headers.insert(HOST, value);
        }
    }
}

/// Apply `add` rules, then `strip` rules.
pub fn apply_rules(headers: &mut HeaderMap, rules: &HeaderRules) {
    for (key, value) in &rules.add {
        match (key.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            (Ok(name), Ok(val)) => {
                headers.insert(name, val);
            }
            _ => {
                tracing::warn!(header = %key, "invalid header name or value in headers.add, skipping");
            }
        }
    }
    for key in &rules.strip {
        if let Ok(name) = key.parse::<HeaderName>() {
            headers.remove(&name);
        }
    }
}
