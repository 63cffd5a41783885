//! Optional Sentry error tracking.
//!
//! Initializes the Sentry SDK with the provided DSN and environment. The
//! returned guard must be held for the lifetime of the process so that
//! rejected mapping refreshes, forward failures and panics are reported.
//! Events are tagged with the mapping source so issues from different
//! control planes can be told apart.

pub fn init(dsn: &str, environment: Option<&str>, source: &str) -> sentry::ClientInitGuard {
    let parsed_dsn = match dsn.parse() {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(error = %e, "invalid Sentry DSN, error tracking disabled");
            None
        }
    };

    let guard = sentry::init(sentry::ClientOptions {
        dsn: parsed_dsn,
        environment: environment.map(|e| e.to_string().into()),
        release: Some(concat!("hostgate@", env!("CARGO_PKG_VERSION")).into()),
        ..Default::default()
    });

    sentry::configure_scope(|scope| scope.set_tag("mapping_source", source));
    guard
}
