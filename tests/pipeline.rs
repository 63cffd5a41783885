//! Integration tests for the request pipeline: interceptor ordering,
//! redirects, header rules, and trace reporting.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{HeaderValue, StatusCode};
use hostgate::config::model::SelectorKind;
use hostgate::config::sources::memory::MemorySource;
use hostgate::mapping::Mapping;
use hostgate::proxy::forwarder::ForwardError;
use hostgate::proxy::interceptor::{InterceptorChain, PreForwardInterceptor};
use hostgate::proxy::request::{RequestData, ResponseData};
use hostgate::proxy::trace::{TraceId, TraceInterceptor};
use url::Url;

use common::{client, config, mapping, refused_addr, start_upstream, Echo, GatewayBuilder};

/// Counts its invocations and tags the request so the upstream can see it ran.
struct Counting {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

impl PreForwardInterceptor for Counting {
    fn name(&self) -> &'static str {
        self.name
    }

    fn intercept(&self, request: &mut RequestData, _mapping: &Mapping) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        request
            .headers_mut()
            .append("x-interceptor", HeaderValue::from_static(self.name));
    }
}

struct Redirecting;

impl PreForwardInterceptor for Redirecting {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    fn intercept(&self, request: &mut RequestData, _mapping: &Mapping) {
        request.redirect_to("https://status.example.com/");
    }
}

#[derive(Default)]
struct Recording {
    events: Mutex<Vec<(String, String)>>,
}

impl Recording {
    fn push(&self, trace_id: &TraceId, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap()
            .push((trace_id.to_string(), event.into()));
    }

    fn events(&self) -> Vec<(String, String)> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|(_, e)| e == event).count()
    }
}

impl TraceInterceptor for Recording {
    fn on_request_received(&self, trace_id: &TraceId, _request: &RequestData) {
        self.push(trace_id, "received");
    }

    fn on_no_mapping_found(&self, trace_id: &TraceId, _request: &RequestData) {
        self.push(trace_id, "no-mapping");
    }

    fn on_forward_start(&self, trace_id: &TraceId, _mapping: &Mapping, _destination: &Url, attempt: u32) {
        self.push(trace_id, format!("attempt-{attempt}"));
    }

    fn on_redirect(&self, trace_id: &TraceId, _mapping: &Mapping, location: &str) {
        self.push(trace_id, format!("redirect {location}"));
    }

    fn on_forwarded(&self, trace_id: &TraceId, _mapping: &Mapping, _response: &ResponseData, attempts: u32) {
        self.push(trace_id, format!("forwarded after {attempts}"));
    }

    fn on_forward_error(&self, trace_id: &TraceId, _mapping: &Mapping, error: &ForwardError) {
        self.push(trace_id, format!("failed after {}", error.attempts));
    }

    fn on_request_completed(&self, trace_id: &TraceId, status: StatusCode, _elapsed: Duration) {
        self.push(trace_id, format!("completed {}", status.as_u16()));
    }
}

#[tokio::test]
async fn redirect_stops_the_chain_and_skips_the_upstream() {
    let app = start_upstream("app").await;
    let first = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));
    let chain = InterceptorChain::new()
        .with(Counting {
            name: "first",
            calls: Arc::clone(&first),
        })
        .with(Redirecting)
        .with(Counting {
            name: "third",
            calls: Arc::clone(&third),
        });
    let trace = Arc::new(Recording::default());

    let gateway = GatewayBuilder::new(MemorySource::new(config(vec![mapping(
        "app.test",
        &[app.url()],
    )])))
    .interceptors(chain)
    .trace(trace.clone())
    .start()
    .await;

    let resp = client()
        .get(gateway.url("/"))
        .header("Host", "app.test")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(
        resp.headers().get("location").unwrap(),
        "https://status.example.com/"
    );

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 0);
    assert_eq!(app.hits(), 0);

    let events: Vec<String> = trace.events().into_iter().map(|(_, e)| e).collect();
    assert_eq!(
        events,
        vec![
            "received".to_string(),
            "redirect https://status.example.com/".to_string(),
            "completed 302".to_string(),
        ]
    );
    gateway.stop();
}

#[tokio::test]
async fn interceptors_run_in_order_before_forwarding() {
    let app = start_upstream("app").await;
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = InterceptorChain::with_builtins()
        .with(Counting {
            name: "one",
            calls: Arc::clone(&calls),
        })
        .with(Counting {
            name: "two",
            calls: Arc::clone(&calls),
        });

    let gateway = GatewayBuilder::new(MemorySource::new(config(vec![mapping(
        "app.test",
        &[app.url()],
    )])))
    .interceptors(chain)
    .start()
    .await;

    let echo: Echo = client()
        .get(gateway.url("/"))
        .header("Host", "app.test")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo.headers["x-interceptor"], vec!["one", "two"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    gateway.stop();
}

#[tokio::test]
async fn force_https_redirects_plain_http_clients() {
    let app = start_upstream("app").await;
    let mut record = mapping("secure.test", &[app.url()]);
    record.force_https = true;
    let gateway = GatewayBuilder::new(MemorySource::new(config(vec![record])))
        .start()
        .await;

    let resp = client()
        .get(gateway.url("/account?tab=2"))
        .header("Host", "secure.test")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(
        resp.headers().get("location").unwrap(),
        "https://secure.test/account?tab=2"
    );
    assert_eq!(app.hits(), 0);
    gateway.stop();
}

#[tokio::test]
async fn header_rules_merge_defaults_with_mapping_rules() {
    let app = start_upstream("app").await;
    let mut record = mapping("app.test", &[app.url()]);
    record
        .headers
        .add
        .insert("X-Gateway".into(), "mapping".into());
    record.headers.strip.push("X-Internal".into());
    let mut cfg = config(vec![record]);
    cfg.defaults
        .headers
        .add
        .insert("X-Gateway".into(), "default".into());
    cfg.defaults
        .headers
        .add
        .insert("X-Region".into(), "eu".into());
    cfg.defaults.headers.strip.push("X-Debug".into());
    let gateway = GatewayBuilder::new(MemorySource::new(cfg)).start().await;

    let echo: Echo = client()
        .get(gateway.url("/"))
        .header("Host", "app.test")
        .header("X-Debug", "1")
        .header("X-Internal", "1")
        .header("X-Kept", "1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echo.header("x-gateway"), Some("mapping"));
    assert_eq!(echo.header("x-region"), Some("eu"));
    assert_eq!(echo.header("x-kept"), Some("1"));
    assert!(echo.header("x-debug").is_none());
    assert!(echo.header("x-internal").is_none());
    gateway.stop();
}

#[tokio::test]
async fn header_rules_survive_when_client_headers_are_not_forwarded() {
    let app = start_upstream("app").await;
    let mut record = mapping("app.test", &[app.url()]);
    record
        .headers
        .add
        .insert("X-Gateway".into(), "hostgate".into());
    let mut cfg = config(vec![record]);
    cfg.defaults.forward_headers = false;
    let gateway = GatewayBuilder::new(MemorySource::new(cfg)).start().await;

    let echo: Echo = client()
        .get(gateway.url("/"))
        .header("Host", "app.test")
        .header("X-Custom", "1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echo.header("x-gateway"), Some("hostgate"));
    assert!(echo.header("x-custom").is_none());
    assert!(echo.header("x-trace-id").is_some());
    gateway.stop();
}

#[tokio::test]
async fn completion_is_reported_once_per_request() {
    let app = start_upstream("app").await;
    let dead = refused_addr().await;
    let mut failing = mapping("down.test", &[format!("http://{dead}"), app.url()]);
    failing.selector = SelectorKind::FirstAvailable;
    failing.retry_count = Some(0);
    let trace = Arc::new(Recording::default());

    let gateway = GatewayBuilder::new(MemorySource::new(config(vec![
        mapping("app.test", &[app.url()]),
        failing,
    ])))
    .trace(trace.clone())
    .start()
    .await;

    let mut trace_ids = Vec::new();
    for (host, expected) in [("app.test", 200), ("down.test", 502), ("nope.test", 400)] {
        let resp = client()
            .get(gateway.url("/"))
            .header("Host", host)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), expected);
        let trace_id = resp.headers()["x-trace-id"].to_str().unwrap().to_string();
        trace_ids.push((trace_id, expected));
    }

    let events = trace.events();
    for (trace_id, status) in &trace_ids {
        let completed: Vec<&String> = events
            .iter()
            .filter(|(id, e)| id == trace_id && e.starts_with("completed"))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(completed, vec![&format!("completed {status}")]);
    }

    assert_eq!(trace.count("received"), 3);
    assert_eq!(trace.count("forwarded after 1"), 1);
    assert_eq!(trace.count("failed after 1"), 1);
    assert_eq!(trace.count("no-mapping"), 1);
    gateway.stop();
}

#[tokio::test]
async fn retried_request_reports_every_attempt() {
    let app = start_upstream("app").await;
    let dead = refused_addr().await;
    let mut record = mapping("app.test", &[format!("http://{dead}"), app.url()]);
    record.selector = SelectorKind::FirstAvailable;
    record.retry_count = Some(1);
    let trace = Arc::new(Recording::default());

    let gateway = GatewayBuilder::new(MemorySource::new(config(vec![record])))
        .trace(trace.clone())
        .start()
        .await;

    let resp = client()
        .get(gateway.url("/"))
        .header("Host", "app.test")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let events: Vec<String> = trace.events().into_iter().map(|(_, e)| e).collect();
    assert_eq!(
        events,
        vec![
            "received".to_string(),
            "attempt-1".to_string(),
            "attempt-2".to_string(),
            "forwarded after 2".to_string(),
            "completed 200".to_string(),
        ]
    );
    gateway.stop();
}
