//! Invocation caching and pull-based staleness.
//!
//! Resolution results are cached at two levels: the dispatch server caches
//! whole invocations keyed by raw URI, and each web app caches composed
//! filter chains keyed by context URI. Neither cache is pushed fresh data on
//! redeploy; instead every cached value carries a [`Dependency`] and the
//! reader checks `is_modified` before reuse. A redeploy only has to bump an
//! epoch counter and clear the maps.

use crate::chain::FilterChain;
use crate::invocation::{Invocation, MultipartConfig};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Staleness oracle attached to cached resolution results.
pub trait Dependency: Send + Sync {
    /// True when the conditions the cached value was built under no longer
    /// hold.
    fn is_modified(&self) -> bool;
}

/// Never valid; forces rebuild on every reuse attempt. Attached to error
/// resolutions so a fixed deployment is picked up immediately.
pub struct AlwaysModified;

impl Dependency for AlwaysModified {
    fn is_modified(&self) -> bool {
        true
    }
}

/// Always valid. For static resolutions with no deployment to go stale.
pub struct NeverModified;

impl Dependency for NeverModified {
    fn is_modified(&self) -> bool {
        false
    }
}

/// Valid while a shared epoch counter keeps the value captured at build
/// time. Web apps and containers bump their epoch on any configuration or
/// deployment change.
pub struct EpochDependency {
    epoch: Arc<AtomicU64>,
    captured: u64,
}

impl EpochDependency {
    pub fn new(epoch: Arc<AtomicU64>) -> Self {
        let captured = epoch.load(Ordering::Acquire);
        Self { epoch, captured }
    }
}

impl Dependency for EpochDependency {
    fn is_modified(&self) -> bool {
        self.epoch.load(Ordering::Acquire) != self.captured
    }
}

/// Cached result of servlet mapping and filter composition for one context
/// URI within a web app.
pub struct FilterChainEntry {
    chain: Arc<dyn FilterChain>,
    servlet_path: String,
    path_info: Option<String>,
    servlet_name: Option<Arc<str>>,
    async_supported: bool,
    multipart: Option<MultipartConfig>,
    dependency: Arc<dyn Dependency>,
}

impl FilterChainEntry {
    /// Capture the resolution recorded on the invocation.
    pub fn new(chain: Arc<dyn FilterChain>, invocation: &Invocation) -> Self {
        Self {
            chain,
            servlet_path: invocation.servlet_path().to_string(),
            path_info: invocation.path_info().map(str::to_string),
            servlet_name: invocation.servlet_name().cloned(),
            async_supported: invocation.is_async_supported(),
            multipart: invocation.multipart_config().cloned(),
            dependency: Arc::clone(invocation.dependency()),
        }
    }

    pub fn chain(&self) -> &Arc<dyn FilterChain> {
        &self.chain
    }

    pub fn is_modified(&self) -> bool {
        self.dependency.is_modified()
    }

    /// Replay the captured resolution onto a fresh invocation.
    pub fn apply(&self, invocation: &mut Invocation) {
        invocation.set_servlet_path(self.servlet_path.clone());
        invocation.set_path_info(self.path_info.clone());
        if let Some(name) = &self.servlet_name {
            invocation.set_servlet_name(Arc::clone(name));
        }
        invocation.set_async_supported(self.async_supported);
        invocation.set_multipart_config(self.multipart.clone());
        invocation.set_dependency(Arc::clone(&self.dependency));
        invocation.set_chain(Arc::clone(&self.chain));
    }
}

/// Bounded LRU of composed filter chains, one per web app.
pub struct InvocationCache {
    inner: Mutex<LruCache<String, Arc<FilterChainEntry>>>,
}

impl InvocationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch a live entry, dropping it in place when its dependency reports
    /// staleness.
    pub fn get(&self, key: &str) -> Option<Arc<FilterChainEntry>> {
        let mut cache = self.inner.lock().ok()?;
        match cache.get(key) {
            Some(entry) if !entry.is_modified() => Some(Arc::clone(entry)),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, entry: Arc<FilterChainEntry>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key, entry);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
