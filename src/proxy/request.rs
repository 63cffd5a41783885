//! Normalized request and response values passed through the pipeline.
//!
//! [`RequestData`] is owned by exactly one in-flight request. Method, URI and
//! body are fixed at construction; interceptors may only touch the headers and
//! the redirect target.

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, HOST, LOCATION};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

#[derive(Debug)]
pub struct RequestData {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    host: String,
    server_port: u16,
    scheme: &'static str,
    client_addr: IpAddr,
    redirect: Option<String>,
}

impl RequestData {
    /// Build from the inbound parts. The origin host and server port come from
    /// the `Host` header, falling back to the URI authority and the scheme's
    /// default port.
    #[must_use]
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        client_addr: SocketAddr,
        scheme: &'static str,
    ) -> Self {
        let default_port = if scheme == "https" { 443 } else { 80 };
        let authority = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
            .or_else(|| uri.authority().map(|a| a.as_str().to_owned()))
            .unwrap_or_default();
        let (host, port) = split_host_port(&authority);

        Self {
            method,
            uri,
            headers,
            body,
            host: host.to_string(),
            server_port: port.unwrap_or(default_port),
            scheme,
            client_addr: client_addr.ip(),
            redirect: None,
        }
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Host the client addressed, without the port, as received.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn server_port(&self) -> u16 {
        self.server_port
    }

    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        self.scheme
    }

    #[must_use]
    pub const fn client_addr(&self) -> IpAddr {
        self.client_addr
    }

    /// Answer the client with a redirect to `location` instead of forwarding.
    pub fn redirect_to(&mut self, location: impl Into<String>) {
        self.redirect = Some(location.into());
    }

    #[must_use]
    pub fn needs_redirect(&self) -> bool {
        self.redirect.as_deref().is_some_and(|l| !l.trim().is_empty())
    }

    #[must_use]
    pub fn redirect_location(&self) -> Option<&str> {
        self.redirect.as_deref().filter(|l| !l.trim().is_empty())
    }
}

/// Split `host[:port]`, keeping IPv6 literals in brackets intact.
fn split_host_port(authority: &str) -> (&str, Option<u16>) {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => {
                let port = authority[end + 1..]
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok());
                (&authority[..=end], port)
            }
            None => (authority, None),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, Some(port)),
            Err(_) => (authority, None),
        },
        None => (authority, None),
    }
}

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseData {
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from(body.into()),
        }
    }

    #[must_use]
    pub fn unsupported_domain() -> Self {
        Self::text(StatusCode::BAD_REQUEST, "Unsupported domain")
    }

    #[must_use]
    pub fn redirect(location: &str) -> Self {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                let mut response = Self::text(StatusCode::FOUND, "");
                response.headers.insert(LOCATION, value);
                response
            }
            Err(_) => {
                tracing::warn!(location, "redirect target is not a valid header value");
                Self::text(StatusCode::BAD_GATEWAY, "Invalid redirect target")
            }
        }
    }
}

impl IntoResponse for ResponseData {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
