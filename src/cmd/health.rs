//! `hostgate health`: query a running instance.
//!
//! The request goes out through the same client builder the proxy uses for
//! its upstream pools, so `https://` instance URLs work too.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use crate::cli::HealthArgs;
use crate::config::model::PoolSettings;
use crate::error::HostgateError;
use crate::health::HealthResponse;
use crate::proxy::client_pool::{build_http_client, ClientSettings};
use crate::server::HEALTH_PATH;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn execute(args: HealthArgs) -> Result<(), HostgateError> {
    let body = fetch(&args.url).await?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => print!("{}", render_report(&args.url, &health)),
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }
    Ok(())
}

/// Fetch the health document of the instance at `base_url`. Any non-2xx
/// answer is a [`HostgateError::HealthCheckFailed`].
pub async fn fetch(base_url: &str) -> Result<Bytes, HostgateError> {
    let uri: hyper::Uri = format!("{}{HEALTH_PATH}", base_url.trim_end_matches('/'))
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| HostgateError::UriParse {
            source: Box::new(e),
        })?;

    let client = build_http_client(&ClientSettings {
        connect_timeout: HEALTH_TIMEOUT,
        pool: PoolSettings::default(),
    });
    let request = hyper::Request::get(uri)
        .body(Full::new(Bytes::new()))
        .map_err(request_error)?;

    let exchange = async {
        let response = client.request(request).await.map_err(request_error)?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(request_error)?
            .to_bytes();
        Ok::<_, HostgateError>((status, body))
    };

    let (status, body) = tokio::time::timeout(HEALTH_TIMEOUT, exchange)
        .await
        .map_err(|_| HostgateError::HttpRequest {
            source: format!("health check timed out after {}s", HEALTH_TIMEOUT.as_secs()).into(),
        })??;

    if !status.is_success() {
        return Err(HostgateError::HealthCheckFailed(status));
    }
    Ok(body)
}

fn request_error(e: impl std::error::Error + Send + Sync + 'static) -> HostgateError {
    HostgateError::HttpRequest {
        source: Box::new(e),
    }
}

#[must_use]
pub fn render_report(url: &str, health: &HealthResponse) -> String {
    let mappings = &health.mappings;
    let stats = &health.stats;
    let mut out = String::new();

    let _ = writeln!(out, "\u{2713} hostgate is {} ({url})", health.status);
    let _ = writeln!(out, "  uptime:          {}", format_uptime(health.uptime_seconds));
    let _ = writeln!(out, "  mapping source:  {}", mappings.source);
    let _ = writeln!(
        out,
        "  mapping version: {} (loaded {}s ago, {} reloads, {} rejected)",
        mappings.version, mappings.loaded_ago_seconds, mappings.reloads, mappings.rejected_reloads
    );
    let _ = writeln!(
        out,
        "  mappings:        {} hosts, {} destinations",
        mappings.mappings, mappings.destinations
    );
    let _ = writeln!(
        out,
        "  client pools:    {} active, {} draining",
        health.pools.active, health.pools.draining
    );
    let _ = writeln!(
        out,
        "  requests:        {} forwarded, {} failed, {} unmatched, {} redirected",
        stats.requests_forwarded,
        stats.requests_failed,
        stats.requests_unmatched,
        stats.requests_redirected
    );
    out
}

fn format_uptime(seconds: u64) -> String {
    match (seconds / 3600, (seconds % 3600) / 60, seconds % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, s) => format!("{h}h {m}m {s}s"),
    }
}
