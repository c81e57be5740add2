//! A deployed web application: registrations, the resolution pipeline, and
//! the per-app chain cache.
//!
//! ## Resolution pipeline
//!
//! `build_invocation` turns a decoded URI into an executable invocation in a
//! fixed order: configuration-error check, active-state wait, chain-cache
//! consult, servlet mapping, rewrite, filter composition, cache store, and
//! finally the per-app wrapper chains (statistics, app entry, response
//! cache, access log). Resolution never returns an error; failures become
//! chains that reproduce the failure at execution time, so they flow through
//! the same caching and error-page machinery as ordinary requests.

use crate::cache::{AlwaysModified, EpochDependency, FilterChainEntry, InvocationCache};
use crate::chain::{
    AccessLog, AccessLogChain, CacheChainProvider, ExceptionChain, FilterChain, RequestListener,
    StatisticsChain, StatusChain, WebAppChain,
};
use crate::dispatch::{DispatcherType, RequestDispatcher};
use crate::error::DispatchError;
use crate::error_pages::ErrorPageManager;
use crate::invocation::{Invocation, InvocationDecoder};
use crate::mapper::{FilterMapper, FilterMapping, RewriteDispatch, ServletMapper};
use crate::runtime_config::RuntimeConfig;
use crate::session::SharedSessionProvider;
use crate::webapp::container::WebAppContainer;
use crate::webapp::lifecycle::Lifecycle;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Builder for [`WebApp`]. All registration happens here; the built app is
/// immutable apart from its caches and counters.
pub struct WebAppBuilder {
    context_path: String,
    version: Option<String>,
    config: RuntimeConfig,
    servlet_mapper: ServletMapper,
    request_filters: FilterMapper,
    include_filters: FilterMapper,
    forward_filters: FilterMapper,
    error_filters: FilterMapper,
    rewrite: Option<Arc<dyn RewriteDispatch>>,
    error_pages: ErrorPageManager,
    session_provider: Option<SharedSessionProvider>,
    access_log: Option<Arc<dyn AccessLog>>,
    cache_provider: Option<Arc<dyn CacheChainProvider>>,
    request_listeners: Vec<Arc<dyn RequestListener>>,
    cache_defeating_markers: Vec<String>,
    config_error: Option<DispatchError>,
    statistics_enabled: bool,
    allow_forward_after_flush: bool,
}

impl WebAppBuilder {
    pub fn new(context_path: &str) -> Self {
        let config = RuntimeConfig::from_env();
        let error_pages = ErrorPageManager::new(config.dev_mode);
        Self {
            context_path: context_path.to_string(),
            version: None,
            config,
            servlet_mapper: ServletMapper::new(),
            request_filters: FilterMapper::new(),
            include_filters: FilterMapper::new(),
            forward_filters: FilterMapper::new(),
            error_filters: FilterMapper::new(),
            rewrite: None,
            error_pages,
            session_provider: None,
            access_log: None,
            cache_provider: None,
            request_listeners: Vec::new(),
            cache_defeating_markers: vec!["jsp_precompile".to_string()],
            config_error: None,
            statistics_enabled: false,
            allow_forward_after_flush: false,
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.error_pages.set_dev_mode(config.dev_mode);
        self.config = config;
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn servlet_mapper(&mut self) -> &mut ServletMapper {
        &mut self.servlet_mapper
    }

    /// Filter table for the given dispatcher type.
    pub fn filter_mapper(&mut self, dispatcher_type: DispatcherType) -> &mut FilterMapper {
        match dispatcher_type {
            DispatcherType::Include => &mut self.include_filters,
            DispatcherType::Forward => &mut self.forward_filters,
            DispatcherType::Error => &mut self.error_filters,
            _ => &mut self.request_filters,
        }
    }

    /// Register a filter under the request dispatcher type.
    pub fn add_filter(&mut self, mapping: FilterMapping) -> &mut Self {
        self.request_filters.add_mapping(mapping);
        self
    }

    pub fn rewrite(mut self, rewrite: Arc<dyn RewriteDispatch>) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    pub fn error_pages(&mut self) -> &mut ErrorPageManager {
        &mut self.error_pages
    }

    pub fn session_provider(mut self, provider: SharedSessionProvider) -> Self {
        self.session_provider = Some(provider);
        self
    }

    pub fn access_log(mut self, log: Arc<dyn AccessLog>) -> Self {
        self.access_log = Some(log);
        self
    }

    pub fn cache_provider(mut self, provider: Arc<dyn CacheChainProvider>) -> Self {
        self.cache_provider = Some(provider);
        self
    }

    pub fn add_request_listener(mut self, listener: Arc<dyn RequestListener>) -> Self {
        self.request_listeners.push(listener);
        self
    }

    /// Query substrings whose presence bypasses the chain cache.
    pub fn cache_defeating_markers(mut self, markers: Vec<String>) -> Self {
        self.cache_defeating_markers = markers;
        self
    }

    /// Record a startup failure. Every request to the built app reproduces
    /// this error until a corrected deployment replaces it.
    pub fn config_error(mut self, error: DispatchError) -> Self {
        self.config_error = Some(error);
        self
    }

    pub fn statistics_enabled(mut self, enabled: bool) -> Self {
        self.statistics_enabled = enabled;
        self
    }

    pub fn allow_forward_after_flush(mut self, allow: bool) -> Self {
        self.allow_forward_after_flush = allow;
        self
    }

    pub fn build(self) -> Arc<WebApp> {
        let chain_capacity = self.config.chain_cache_capacity;
        let dispatcher_capacity =
            NonZeroUsize::new(self.config.chain_cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        let lifecycle_name = if self.context_path.is_empty() {
            "/".to_string()
        } else {
            self.context_path.clone()
        };
        Arc::new(WebApp {
            context_path: self.context_path,
            version: self.version,
            active_wait: self.config.active_wait,
            stop_wait: self.config.stop_wait,
            lifecycle: Lifecycle::new(lifecycle_name),
            epoch: Arc::new(AtomicU64::new(0)),
            decoder: InvocationDecoder::new(),
            chain_cache: InvocationCache::new(chain_capacity),
            dispatcher_cache: Mutex::new(LruCache::new(dispatcher_capacity)),
            servlet_mapper: self.servlet_mapper,
            request_filters: self.request_filters,
            include_filters: self.include_filters,
            forward_filters: self.forward_filters,
            error_filters: self.error_filters,
            rewrite: self.rewrite,
            error_pages: Arc::new(self.error_pages),
            session_provider: self.session_provider,
            access_log: self.access_log,
            cache_provider: self.cache_provider,
            request_listeners: self.request_listeners,
            cache_defeating_markers: self.cache_defeating_markers,
            config_error: self.config_error,
            statistics_enabled: self.statistics_enabled,
            allow_forward_after_flush: self.allow_forward_after_flush,
            parent: Mutex::new(Weak::new()),
            active_count: AtomicUsize::new(0),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            disconnect_count: AtomicU64::new(0),
            total_latency_micros: AtomicU64::new(0),
        })
    }
}

/// One deployed application instance. Replaced wholesale on redeploy; never
/// mutated in place after build apart from caches, counters and lifecycle.
pub struct WebApp {
    context_path: String,
    version: Option<String>,
    active_wait: Duration,
    stop_wait: Duration,
    lifecycle: Lifecycle,
    epoch: Arc<AtomicU64>,
    decoder: InvocationDecoder,
    chain_cache: InvocationCache,
    dispatcher_cache: Mutex<LruCache<String, Arc<RequestDispatcher>>>,
    servlet_mapper: ServletMapper,
    request_filters: FilterMapper,
    include_filters: FilterMapper,
    forward_filters: FilterMapper,
    error_filters: FilterMapper,
    rewrite: Option<Arc<dyn RewriteDispatch>>,
    error_pages: Arc<ErrorPageManager>,
    session_provider: Option<SharedSessionProvider>,
    access_log: Option<Arc<dyn AccessLog>>,
    cache_provider: Option<Arc<dyn CacheChainProvider>>,
    request_listeners: Vec<Arc<dyn RequestListener>>,
    cache_defeating_markers: Vec<String>,
    config_error: Option<DispatchError>,
    statistics_enabled: bool,
    allow_forward_after_flush: bool,
    parent: Mutex<Weak<WebAppContainer>>,
    active_count: AtomicUsize,
    request_count: AtomicU64,
    error_count: AtomicU64,
    disconnect_count: AtomicU64,
    total_latency_micros: AtomicU64,
}

impl WebApp {
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn error_pages(&self) -> &Arc<ErrorPageManager> {
        &self.error_pages
    }

    pub fn session_provider(&self) -> Option<&SharedSessionProvider> {
        self.session_provider.as_ref()
    }

    pub fn request_listeners(&self) -> &[Arc<dyn RequestListener>] {
        &self.request_listeners
    }

    pub fn is_allow_forward_after_flush(&self) -> bool {
        self.allow_forward_after_flush
    }

    pub(crate) fn set_parent(&self, container: &Arc<WebAppContainer>) {
        if let Ok(mut parent) = self.parent.lock() {
            *parent = Arc::downgrade(container);
        }
    }

    fn parent(&self) -> Option<Arc<WebAppContainer>> {
        self.parent.lock().ok().and_then(|p| p.upgrade())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&self) {
        self.lifecycle.to_starting();
        if self.config_error.is_some() {
            self.lifecycle.to_error();
            return;
        }
        self.lifecycle.to_active();
        tracing::info!(context_path = %self.context_path, version = ?self.version, "web app active");
    }

    /// Graceful stop: no new requests are admitted while in-flight requests
    /// drain, up to the stop budget.
    pub fn stop(&self) {
        self.lifecycle.to_stopping();
        let deadline = std::time::Instant::now() + self.stop_wait;
        while self.active_count.load(Ordering::Acquire) > 0
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(10));
        }
        let leftover = self.active_count.load(Ordering::Acquire);
        if leftover > 0 {
            tracing::warn!(
                context_path = %self.context_path,
                active = leftover,
                "stopping with requests still in flight"
            );
        }
        self.lifecycle.to_stopped();
    }

    pub fn destroy(&self) {
        if !self.lifecycle.is_stopped() {
            self.stop();
        }
        self.lifecycle.to_destroyed();
    }

    // ------------------------------------------------------------------
    // Statistics hooks (called by the wrapper chains)
    // ------------------------------------------------------------------

    pub(crate) fn request_started(&self) {
        self.active_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn request_finished(&self) {
        self.active_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn active_request_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    pub(crate) fn record_request(&self, latency: Duration, failed: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_client_disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn client_disconnect_count(&self) -> u64 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Cache management
    // ------------------------------------------------------------------

    /// Invalidate every derived resolution: bump the epoch (so dependent
    /// cached invocations elsewhere report modified), drop the local caches,
    /// and propagate upward.
    pub fn clear_cache(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.chain_cache.clear();
        if let Ok(mut cache) = self.dispatcher_cache.lock() {
            cache.clear();
        }
        if let Some(parent) = self.parent() {
            parent.clear_cache();
        }
        tracing::debug!(context_path = %self.context_path, "dispatch caches cleared");
    }

    pub fn chain_cache_len(&self) -> usize {
        self.chain_cache.len()
    }

    // ------------------------------------------------------------------
    // Resolution pipeline
    // ------------------------------------------------------------------

    fn derive_context_uri(&self, invocation: &mut Invocation) {
        if !invocation.context_uri().is_empty() {
            return;
        }
        let uri = invocation.uri();
        let tail = uri.strip_prefix(self.context_path.as_str()).unwrap_or(uri);
        let tail = if tail.is_empty() { "/" } else { tail };
        invocation.set_context_uri(tail.to_string());
    }

    fn is_cacheable(&self, invocation: &Invocation) -> bool {
        if self.rewrite.is_some() {
            return false;
        }
        match invocation.query_string() {
            Some(query) => !self
                .cache_defeating_markers
                .iter()
                .any(|marker| query.contains(marker.as_str())),
            None => true,
        }
    }

    /// Outer wrapper chains applied to every top-level resolution, built
    /// inner to outer: statistics, app entry, response cache, access log.
    fn wrap_chain(self: &Arc<Self>, mut chain: Arc<dyn FilterChain>) -> Arc<dyn FilterChain> {
        if self.statistics_enabled {
            chain = Arc::new(StatisticsChain::new(chain, Arc::clone(self)));
        }
        chain = Arc::new(WebAppChain::new(chain, Arc::clone(self)));
        if let Some(provider) = &self.cache_provider {
            chain = provider.create_filter_chain(chain, self);
        }
        if let Some(log) = &self.access_log {
            chain = Arc::new(AccessLogChain::new(chain, Arc::clone(log)));
        }
        chain
    }

    /// Resolve a top-level invocation in place. Never fails: resolution
    /// errors become chains that reproduce the failure when executed.
    pub fn build_invocation(self: &Arc<Self>, invocation: &mut Invocation) {
        invocation.set_web_app(Arc::clone(self));
        invocation.set_context_path(self.context_path.clone());
        self.derive_context_uri(invocation);

        if let Some(err) = &self.config_error {
            tracing::warn!(
                context_path = %self.context_path,
                error = %err,
                "request against misconfigured web app"
            );
            invocation.set_dependency(Arc::new(AlwaysModified));
            invocation.set_chain(self.wrap_chain(Arc::new(ExceptionChain::new(err.clone()))));
            return;
        }

        if !self.lifecycle.wait_for_active(self.active_wait) {
            tracing::warn!(
                context_path = %self.context_path,
                state = %self.lifecycle.state(),
                "web app not active within wait budget"
            );
            invocation.set_dependency(Arc::new(AlwaysModified));
            let retry_after = u32::try_from(self.active_wait.as_secs().max(1)).unwrap_or(u32::MAX);
            invocation.set_chain(self.wrap_chain(Arc::new(StatusChain::unavailable(
                &self.context_path,
                retry_after,
            ))));
            return;
        }

        invocation.set_dependency(Arc::new(EpochDependency::new(Arc::clone(&self.epoch))));

        let cacheable = self.is_cacheable(invocation);
        let cache_key = invocation.context_uri().to_string();
        if cacheable {
            if let Some(entry) = self.chain_cache.get(&cache_key) {
                tracing::trace!(uri = %cache_key, "chain cache hit");
                entry.apply(invocation);
                invocation.set_chain(self.wrap_chain(Arc::clone(entry.chain())));
                return;
            }
        }

        let chain = match self.servlet_mapper.map_servlet(invocation) {
            Ok(chain) => chain,
            Err(err) => {
                tracing::warn!(uri = %cache_key, error = %err, "servlet mapping failed");
                invocation.set_dependency(Arc::new(AlwaysModified));
                invocation.set_chain(self.wrap_chain(Arc::new(ExceptionChain::new(err))));
                return;
            }
        };

        let chain = match &self.rewrite {
            Some(rewrite) => rewrite.map(invocation.uri(), invocation.query_string(), chain),
            None => chain,
        };

        let chain =
            self.request_filters
                .build_dispatch_chain(invocation, DispatcherType::Request, chain);

        if cacheable {
            self.chain_cache.put(
                cache_key,
                Arc::new(FilterChainEntry::new(Arc::clone(&chain), invocation)),
            );
        }

        invocation.set_chain(self.wrap_chain(chain));
    }

    /// Resolve a sub-dispatch target (forward, include, error) in place.
    /// Unlike top-level resolution this fails eagerly, since the caller
    /// already has an executing request to surface the error through.
    pub fn build_dispatch_invocation(
        self: &Arc<Self>,
        invocation: &mut Invocation,
        dispatcher_type: DispatcherType,
    ) -> Result<(), DispatchError> {
        invocation.set_web_app(Arc::clone(self));
        invocation.set_context_path(self.context_path.clone());
        self.derive_context_uri(invocation);

        if let Some(err) = &self.config_error {
            return Err(err.clone());
        }
        if !self.lifecycle.wait_for_active(self.active_wait) {
            return Err(DispatchError::Unavailable {
                context_path: self.context_path.clone(),
                permanent: false,
                retry_after_secs: Some(
                    u32::try_from(self.active_wait.as_secs().max(1)).unwrap_or(u32::MAX),
                ),
            });
        }

        invocation.set_dependency(Arc::new(EpochDependency::new(Arc::clone(&self.epoch))));
        let chain = self.servlet_mapper.map_servlet(invocation)?;
        let filters = match dispatcher_type {
            DispatcherType::Include => &self.include_filters,
            DispatcherType::Forward => &self.forward_filters,
            DispatcherType::Error => &self.error_filters,
            _ => &self.request_filters,
        };
        filters.build_dispatch_chain(invocation, dispatcher_type, chain);
        Ok(())
    }

    /// Resolve a dispatcher for a context-relative URL, cached per URL until
    /// the deployment changes.
    pub fn get_request_dispatcher(
        self: &Arc<Self>,
        url: &str,
    ) -> Result<Arc<RequestDispatcher>, DispatchError> {
        if !url.starts_with('/') {
            return Err(DispatchError::BadRequest(format!(
                "dispatcher url '{url}' must be context-relative"
            )));
        }

        if let Ok(mut cache) = self.dispatcher_cache.lock() {
            match cache.get(url) {
                Some(dispatcher) if !dispatcher.is_modified() => {
                    return Ok(Arc::clone(dispatcher));
                }
                Some(_) => {
                    cache.pop(url);
                }
                None => {}
            }
        }

        let raw = format!("{}{}", self.context_path, url);
        let forward = self.resolve_dispatch_target(&raw, DispatcherType::Forward)?;
        let include = self.resolve_dispatch_target(&raw, DispatcherType::Include)?;
        let error = self.resolve_dispatch_target(&raw, DispatcherType::Error)?;

        let dispatcher = Arc::new(RequestDispatcher::new(
            forward,
            include,
            error,
            Arc::clone(self),
        ));
        if let Ok(mut cache) = self.dispatcher_cache.lock() {
            cache.put(url.to_string(), Arc::clone(&dispatcher));
        }
        Ok(dispatcher)
    }

    fn resolve_dispatch_target(
        self: &Arc<Self>,
        raw_uri: &str,
        dispatcher_type: DispatcherType,
    ) -> Result<Invocation, DispatchError> {
        let mut invocation = Invocation::new();
        self.decoder.split_query(&mut invocation, raw_uri)?;
        // Cross-context targets route through the container when deployed
        // inside one; a standalone app resolves locally.
        match self.parent() {
            Some(container) => {
                container.build_dispatch_invocation(&mut invocation, dispatcher_type)?;
            }
            None => self.build_dispatch_invocation(&mut invocation, dispatcher_type)?,
        }
        Ok(invocation)
    }
}

impl std::fmt::Debug for WebApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApp")
            .field("context_path", &self.context_path)
            .field("version", &self.version)
            .field("state", &self.lifecycle.state().to_string())
            .finish_non_exhaustive()
    }
}
