//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, init, validate, health), and their associated
//! argument structs. Every `run` flag has an environment variable
//! equivalent for container deployments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::mapping::refresh::{Interval, Never, OnEveryRequest, RefreshStrategy};

#[derive(Parser)]
#[command(
    name = "hostgate",
    version,
    about = "Host-based HTTP reverse proxy with hot-reloadable mappings",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        hostgate init                     Create a starter mapping document\n  \
        hostgate run                      Start with ./hostgate.yaml\n  \
        hostgate run -c mappings.yaml     Start with a specific document"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway
    Run(Box<RunArgs>),

    /// Generate a starter mapping document
    Init(InitArgs),

    /// Validate a mapping document without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        hostgate run                                   Auto-detect mapping document\n  \
        hostgate run -c mappings.yaml -p 8080 --pretty Local dev mode\n  \
        hostgate run --refresh request                 Re-check the source on every request\n  \
        hostgate run --refresh never                   Freeze mappings after startup")]
pub struct RunArgs {
    /// Mapping document path (.yaml, .json, .toml)
    #[arg(short, long, env = "HOSTGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // -- Mapping source --
    /// When to consult the mapping source again
    #[arg(
        long,
        env = "HOSTGATE_REFRESH",
        default_value = "interval",
        help_heading = "Mapping Source"
    )]
    pub refresh: RefreshPolicy,

    /// Seconds between refreshes in `interval` mode
    #[arg(
        long,
        env = "POLL_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Mapping Source"
    )]
    pub poll_interval: u64,

    /// Redis connection URL (mapping document under hostgate:{namespace}:mappings)
    #[cfg(feature = "redis")]
    #[arg(long, env = "REDIS_URL", help_heading = "Mapping Source")]
    pub redis_url: Option<String>,

    /// Mapping namespace in Redis
    #[cfg(feature = "redis")]
    #[arg(
        short,
        long,
        env = "HOSTGATE_NAMESPACE",
        default_value = "default",
        help_heading = "Mapping Source"
    )]
    pub namespace: String,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    /// Log per-request lifecycle events (received, forwarded, completed)
    #[arg(long, env = "HOSTGATE_TRACE", default_value_t = true, action = ArgAction::Set)]
    pub trace: bool,

    // -- Observability --
    /// Sentry DSN (enables error tracking)
    #[cfg(feature = "sentry-integration")]
    #[arg(long, env = "SENTRY_DSN", help_heading = "Observability")]
    pub sentry_dsn: Option<String>,

    /// Sentry environment tag
    #[cfg(feature = "sentry-integration")]
    #[arg(long, env = "SENTRY_ENVIRONMENT", help_heading = "Observability")]
    pub sentry_environment: Option<String>,

    // -- Tuning --
    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = 1_048_576,
        help_heading = "Tuning"
    )]
    pub max_body: usize,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        hostgate init                            Minimal document (yaml)\n  \
        hostgate init --full                     Every option, with comments\n  \
        hostgate init -f toml -o mappings.toml   TOML format")]
pub struct InitArgs {
    /// Output format
    #[arg(short, long, default_value = "yaml")]
    pub format: DocumentFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include every option with explanatory comments
    #[arg(long)]
    pub full: bool,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Mapping document to validate
    #[arg(default_value = "hostgate.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:8080")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RefreshPolicy {
    /// Load once at startup
    Never,
    /// Check the source before every request
    Request,
    /// Check the source every --poll-interval seconds
    Interval,
}

impl RefreshPolicy {
    #[must_use]
    pub fn strategy(self, poll_interval: Duration) -> Box<dyn RefreshStrategy> {
        match self {
            Self::Never => Box::new(Never),
            Self::Request => Box::new(OnEveryRequest),
            Self::Interval => Box::new(Interval(poll_interval)),
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
