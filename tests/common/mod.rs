//! Shared harness: echo upstreams, a silent upstream, and an in-process gateway.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::oneshot;

use hostgate::config::model::{Config, MappingRecord};
use hostgate::config::sources::memory::MemorySource;
use hostgate::config::MappingSource;
use hostgate::mapping::provider::MappingsProvider;
use hostgate::mapping::refresh::{Never, RefreshStrategy};
use hostgate::proxy::client_pool::HttpClientProvider;
use hostgate::proxy::interceptor::InterceptorChain;
use hostgate::proxy::pipeline::ProxyPipeline;
use hostgate::proxy::trace::{LoggingTraceInterceptor, TraceInterceptor};
use hostgate::server::{self, AppState};

/// What an echo upstream saw.
#[derive(Debug, Deserialize)]
pub struct Echo {
    pub upstream: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

impl Echo {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

#[derive(Clone)]
struct EchoState {
    name: String,
    hits: Arc<AtomicUsize>,
}

pub struct Upstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    _shutdown: oneshot::Sender<()>,
}

impl Upstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Answers every request with a JSON [`Echo`]. `/status/<code>` answers with
/// that status instead.
async fn echo(
    State(state): State<EchoState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if let Some(code) = uri.path().strip_prefix("/status/") {
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, format!("{} says {}", state.name, status.as_u16())).into_response();
    }

    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();
        seen.insert(name.as_str().to_owned(), values);
    }

    Json(serde_json::json!({
        "upstream": state.name,
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": seen,
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response()
}

pub async fn start_upstream(name: &str) -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new().fallback(echo).with_state(EchoState {
        name: name.to_owned(),
        hits: Arc::clone(&hits),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    Upstream {
        addr,
        hits,
        _shutdown: shutdown_tx,
    }
}

/// Accepts connections and never answers.
pub async fn start_silent_upstream() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn mapping(host: &str, destinations: &[String]) -> MappingRecord {
    MappingRecord::new(host, destinations.to_vec())
}

pub fn config(mappings: Vec<MappingRecord>) -> Config {
    Config {
        mappings,
        ..Config::default()
    }
}

pub struct Gateway {
    pub addr: SocketAddr,
    pub provider: Arc<MappingsProvider>,
    pub pipeline: Arc<ProxyPipeline>,
    shutdown: oneshot::Sender<()>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn stop(self) {
        let _ = self.shutdown.send(());
    }
}

pub struct GatewayBuilder {
    source: Box<dyn MappingSource>,
    strategy: Box<dyn RefreshStrategy>,
    interceptors: InterceptorChain,
    trace: Arc<dyn TraceInterceptor>,
}

impl GatewayBuilder {
    pub fn new(source: impl MappingSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            strategy: Box::new(Never),
            interceptors: InterceptorChain::with_builtins(),
            trace: Arc::new(LoggingTraceInterceptor::default()),
        }
    }

    pub fn strategy(mut self, strategy: impl RefreshStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn interceptors(mut self, interceptors: InterceptorChain) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn trace(mut self, trace: Arc<dyn TraceInterceptor>) -> Self {
        self.trace = trace;
        self
    }

    pub async fn start(self) -> Gateway {
        let provider = Arc::new(
            MappingsProvider::bootstrap(
                self.source,
                self.strategy,
                Arc::new(HttpClientProvider::new()),
            )
            .await
            .unwrap(),
        );
        let pipeline = Arc::new(ProxyPipeline::new(
            Arc::clone(&provider),
            self.interceptors,
            self.trace,
        ));
        let state = Arc::new(AppState::new(Arc::clone(&pipeline)));
        let router = server::build_router(state, 1_048_576);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
        });

        Gateway {
            addr,
            provider,
            pipeline,
            shutdown: shutdown_tx,
        }
    }
}

pub async fn start_gateway(config: Config) -> Gateway {
    GatewayBuilder::new(MemorySource::new(config)).start().await
}

/// Client that neither follows redirects nor goes through a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}
