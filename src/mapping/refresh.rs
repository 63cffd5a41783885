//! Refresh policies deciding when the mapping source is consulted again.
//!
//! The provider asks its [`RefreshStrategy`] on every inbound request and on
//! every background tick. Closures work as strategies, so an embedding
//! application can plug in its own rule without a new type.

use std::time::Duration;

/// What prompted a refresh check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger<'a> {
    /// An inbound request for `host` is about to be resolved.
    Request { host: &'a str },
    /// The periodic background ticker.
    Background,
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshContext<'a> {
    pub trigger: RefreshTrigger<'a>,
    /// Time since the last refresh attempt, successful or not.
    pub since_last_refresh: Duration,
}

pub trait RefreshStrategy: Send + Sync {
    fn should_refresh(&self, ctx: &RefreshContext<'_>) -> bool;
}

impl<F> RefreshStrategy for F
where
    F: Fn(&RefreshContext<'_>) -> bool + Send + Sync,
{
    fn should_refresh(&self, ctx: &RefreshContext<'_>) -> bool {
        self(ctx)
    }
}

/// Mappings loaded at startup stay active for the process lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl RefreshStrategy for Never {
    fn should_refresh(&self, _ctx: &RefreshContext<'_>) -> bool {
        false
    }
}

/// Consult the source before every request. Unchanged documents are
/// detected by version and cost no rebuild.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnEveryRequest;

impl RefreshStrategy for OnEveryRequest {
    fn should_refresh(&self, ctx: &RefreshContext<'_>) -> bool {
        matches!(ctx.trigger, RefreshTrigger::Request { .. })
    }
}

/// Refresh once `interval` has elapsed since the last attempt, whichever
/// trigger comes first.
#[derive(Debug, Clone, Copy)]
pub struct Interval(pub Duration);

impl RefreshStrategy for Interval {
    fn should_refresh(&self, ctx: &RefreshContext<'_>) -> bool {
        ctx.since_last_refresh >= self.0
    }
}
