//! Request-scope rewrite hook.
//!
//! A rewrite stage may interpose on the resolved chain based on the URI and
//! query. Because its decisions can depend on per-request data, a web app
//! that resolves through a rewrite never caches the composed chain.

use crate::chain::FilterChain;
use std::sync::Arc;

/// Chain-level rewrite applied between servlet mapping and filter
/// composition.
pub trait RewriteDispatch: Send + Sync {
    /// Return the chain to use for this URI, typically the tail itself or a
    /// wrapper around it.
    fn map(
        &self,
        uri: &str,
        query: Option<&str>,
        tail: Arc<dyn FilterChain>,
    ) -> Arc<dyn FilterChain>;
}
