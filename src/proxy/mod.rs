//! Reverse-proxy core.
//!
//! [`forward_handler`] is the Axum fallback that receives every request not
//! addressed to the gateway's own `/_hostgate` routes, turns it into a
//! [`RequestData`] and hands it to the [`pipeline`]. Submodules cover the
//! request model ([`request`]), header handling ([`headers`]), interceptors
//! ([`interceptor`]), trace reporting ([`trace`]), per-mapping client pools
//! ([`client_pool`]) and upstream dispatch ([`forwarder`]).

pub mod client_pool;
pub mod forwarder;
pub mod headers;
pub mod interceptor;
pub mod pipeline;
pub mod request;
pub mod trace;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};

use crate::server::AppState;
use request::RequestData;

pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // The listener speaks plain HTTP; TLS, if any, ends in front of it.
    let request = RequestData::new(method, uri, headers, body, addr, "http");
    state.pipeline.handle(request).await.into_response()
}
