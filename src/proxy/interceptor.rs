//! Pre-forward interceptors.
//!
//! Interceptors run in registration order and may rewrite headers or ask for
//! a redirect. They do not stop the chain themselves: the pipeline checks the
//! redirect target after each one and skips the rest once it is set.

use std::sync::Arc;

use super::headers::apply_rules;
use super::request::RequestData;
use crate::mapping::Mapping;

pub trait PreForwardInterceptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn intercept(&self, request: &mut RequestData, mapping: &Mapping);
}

/// Ordered interceptor list, shared by every request.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn PreForwardInterceptor>>,
}

impl InterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTPS redirect first, then header rules.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new()
            .with(HttpsRedirectInterceptor)
            .with(HeaderRulesInterceptor)
    }

    #[must_use]
    pub fn with(mut self, interceptor: impl PreForwardInterceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn PreForwardInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PreForwardInterceptor>> {
        self.interceptors.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|i| i.name()))
            .finish()
    }
}

/// Applies the mapping's `headers.add` / `headers.strip` rules, which already
/// include the document defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderRulesInterceptor;

impl PreForwardInterceptor for HeaderRulesInterceptor {
    fn name(&self) -> &'static str {
        "header-rules"
    }

    fn intercept(&self, request: &mut RequestData, mapping: &Mapping) {
        apply_rules(request.headers_mut(), &mapping.options().headers);
    }
}

/// Sends plain-HTTP clients of a `force_https` mapping to the HTTPS URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpsRedirectInterceptor;

impl PreForwardInterceptor for HttpsRedirectInterceptor {
    fn name(&self) -> &'static str {
        "https-redirect"
    }

    fn intercept(&self, request: &mut RequestData, mapping: &Mapping) {
        if !mapping.options().force_https || request.scheme() == "https" {
            return;
        }
        let path = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let location = format!("https://{}{}", request.host(), path);
        request.redirect_to(location);
    }
}
