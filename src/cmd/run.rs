//! `hostgate run` — start the gateway.
//!
//! Resolves the mapping source (file, or Redis with the file as fallback),
//! loads and activates the initial mapping set, starts the Axum server with
//! graceful shutdown, and spawns the background ticker that drives interval
//! refreshes and discards drained client pools.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::cli::RunArgs;
use crate::config::sources::file_source::FileSource;
use crate::config::{MappingSource, SourceResolver};
use crate::error::HostgateError;
use crate::logging;
use crate::mapping::provider::{MappingsProvider, RefreshOutcome};
use crate::mapping::refresh::RefreshTrigger;
use crate::proxy::client_pool::HttpClientProvider;
use crate::proxy::interceptor::InterceptorChain;
use crate::proxy::pipeline::ProxyPipeline;
use crate::proxy::trace::{LoggingTraceInterceptor, TraceInterceptor};
use crate::server::{self, AppState};

const AUTO_DETECT: [&str; 4] = [
    "hostgate.yaml",
    "hostgate.yml",
    "hostgate.json",
    "hostgate.toml",
];

pub async fn execute(args: RunArgs) -> Result<(), HostgateError> {
    logging::init(&args.log_level, logging::resolve_format(args.pretty, args.json));

    let resolver = resolve_sources(&args).await?;
    let source_name = resolver.primary_name();

    #[cfg(feature = "sentry-integration")]
    let _sentry_guard = args.sentry_dsn.as_ref().map(|dsn| {
        crate::sentry_integration::init(dsn, args.sentry_environment.as_deref(), source_name)
    });

    let poll_interval = Duration::from_secs(args.poll_interval);
    let provider = Arc::new(
        MappingsProvider::bootstrap(
            Box::new(resolver),
            args.refresh.strategy(poll_interval),
            Arc::new(HttpClientProvider::new()),
        )
        .await?,
    );
    let initial = provider.snapshot();

    let trace: Arc<dyn TraceInterceptor> = Arc::new(LoggingTraceInterceptor::new(args.trace));
    let pipeline = Arc::new(ProxyPipeline::new(
        Arc::clone(&provider),
        InterceptorChain::with_builtins(),
        trace,
    ));
    let state = Arc::new(AppState::new(pipeline));

    // Dropping or signalling shutdown_tx stops the background ticker.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let ticker = tokio::spawn(background_loop(
        Arc::clone(&provider),
        poll_interval,
        shutdown_rx,
    ));

    let router = server::build_router(state, args.max_body);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        source = source_name,
        refresh = ?args.refresh,
        mappings = initial.len(),
        destinations = initial.total_destinations(),
        "hostgate started"
    );
    drop(initial);

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    if let Err(e) = ticker.await {
        tracing::error!(error = %e, "background refresh task failed");
    }

    tracing::info!("hostgate stopped");
    Ok(())
}

async fn resolve_sources(args: &RunArgs) -> Result<SourceResolver, HostgateError> {
    #[allow(unused_mut)]
    let mut primary: Option<Box<dyn MappingSource>> = None;

    #[cfg(feature = "redis")]
    if let Some(ref url) = args.redis_url {
        let source =
            crate::config::sources::redis_source::RedisSource::new(url, &args.namespace).await?;
        primary = Some(Box::new(source));
    }

    let file = resolve_file_source(args.config.as_deref()).await?;

    match (primary, file) {
        (Some(primary), fallback) => Ok(SourceResolver::new(primary, fallback)),
        (None, Some(file)) => Ok(SourceResolver::new(file, None)),
        (None, None) => Err(HostgateError::NoMappingSource {
            hint: "Provide --config <file> or place hostgate.yaml in the working directory.\n  \
                   Run 'hostgate init' to create one."
                .into(),
        }),
    }
}

async fn resolve_file_source(
    explicit: Option<&Path>,
) -> Result<Option<Box<dyn MappingSource>>, HostgateError> {
    if let Some(path) = explicit {
        return Ok(Some(Box::new(FileSource::for_path(path)?)));
    }

    for name in AUTO_DETECT {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected mapping document");
            return Ok(Some(Box::new(FileSource::for_path(&path)?)));
        }
    }

    Ok(None)
}

/// Offers a background refresh every `period` and discards client pools
/// that finished draining.
pub async fn background_loop(
    provider: Arc<MappingsProvider>,
    period: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("background refresh loop shutting down");
                return;
            }
        }

        if let RefreshOutcome::Applied { mappings, pools } =
            provider.refresh_if_due(RefreshTrigger::Background).await
        {
            tracing::debug!(
                mappings,
                removed_pools = pools.removed.len(),
                "background refresh applied"
            );
        }
        provider.clients().sweep().await;
    }
}
