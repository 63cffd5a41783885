//! Hostgate is a host-based HTTP reverse proxy.
//!
//! Every incoming request is matched by its `Host` header against a set of
//! mappings. A matching mapping names one or more upstream destinations; the
//! request runs through a chain of pre-forward interceptors and is then
//! forwarded to one destination, retrying on the next one when the upstream
//! times out or refuses the connection. The mapping set can be reloaded from
//! its source at runtime without dropping in-flight requests.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, init, validate, health).
//! - [`config`] -- The mapping document model, validation, and pluggable
//!   [`MappingSource`](config::MappingSource) backends.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /_hostgate/health` endpoint handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`mapping`] -- Validated mappings, destination selectors, refresh
//!   strategies, and the [`MappingsProvider`](mapping::provider::MappingsProvider)
//!   that owns the active mapping set.
//! - [`proxy`] -- The request pipeline: request model, interceptors, header
//!   handling, per-mapping client pools, forwarding, and tracing hooks.
//! - [`server`] -- Axum server setup, shared application state, and graceful
//!   shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML mapping documents _(enabled by default)_ |
//! | `json` | JSON mapping documents |
//! | `toml` | TOML mapping documents |
//! | `redis` | Redis mapping source |
//! | `sentry-integration` | Sentry error tracking |
//! | `file-backends` | All document formats |
//! | `full` | All features |

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod mapping;
pub mod proxy;
pub mod server;

#[cfg(feature = "sentry-integration")]
pub mod sentry_integration;
