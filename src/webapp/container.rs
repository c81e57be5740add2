//! Container mapping URI prefixes to deployed web apps.
//!
//! Context paths resolve by longest prefix: `/app/sub/x` tries `/app/sub/x`,
//! then `/app/sub`, then `/app`, then the root app at `""`. Lookups go
//! through a bounded LRU that also records misses; the whole cache is
//! invalidated by a deploy-epoch stamp checked on every lookup, so a deploy
//! or undeploy never serves a stale mapping.

use crate::cache::{AlwaysModified, EpochDependency};
use crate::chain::{StatusChain, VersionSwitchChain};
use crate::dispatch::DispatcherType;
use crate::error::DispatchError;
use crate::invocation::Invocation;
use crate::runtime_config::RuntimeConfig;
use crate::webapp::controller::WebAppController;
use crate::webapp::versioning::VersioningController;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Either a plain controller or a versioned deployment slot.
#[derive(Clone)]
enum ControllerRef {
    Direct(Arc<WebAppController>),
    Versioned(Arc<VersioningController>),
}

impl ControllerRef {
    fn controller(&self) -> Arc<WebAppController> {
        match self {
            ControllerRef::Direct(c) => Arc::clone(c),
            ControllerRef::Versioned(v) => Arc::clone(v.controller()),
        }
    }
}

pub struct WebAppContainer {
    controllers: DashMap<String, ControllerRef>,
    uri_cache: Mutex<LruCache<String, Option<Arc<WebAppController>>>>,
    deploy_epoch: Arc<AtomicU64>,
    cache_stamp: AtomicU64,
    rollover_window: std::time::Duration,
}

impl WebAppContainer {
    pub fn new(config: &RuntimeConfig) -> Arc<Self> {
        let capacity =
            NonZeroUsize::new(config.uri_cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Arc::new(Self {
            controllers: DashMap::new(),
            uri_cache: Mutex::new(LruCache::new(capacity)),
            deploy_epoch: Arc::new(AtomicU64::new(0)),
            cache_stamp: AtomicU64::new(0),
            rollover_window: config.rollover_window,
        })
    }

    /// Epoch bumped on every deployment change. Cached resolutions built
    /// against an older epoch are stale.
    pub fn deploy_epoch(&self) -> u64 {
        self.deploy_epoch.load(Ordering::Acquire)
    }

    pub(crate) fn epoch_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.deploy_epoch)
    }

    pub fn rollover_window(&self) -> std::time::Duration {
        self.rollover_window
    }

    // ------------------------------------------------------------------
    // Deployment
    // ------------------------------------------------------------------

    /// Register a controller under its context path.
    pub fn deploy(self: &Arc<Self>, controller: Arc<WebAppController>) {
        controller.set_parent(self);
        let path = controller.context_path().to_string();
        tracing::info!(context_path = %path, "controller registered");
        self.controllers
            .insert(path, ControllerRef::Direct(controller));
        self.clear_cache();
    }

    /// Register a versioned deployment slot under its context path.
    pub fn deploy_versioned(self: &Arc<Self>, versioning: Arc<VersioningController>) {
        versioning.controller().set_parent(self);
        let path = versioning.context_path().to_string();
        tracing::info!(context_path = %path, "versioned slot registered");
        self.controllers
            .insert(path, ControllerRef::Versioned(versioning));
        self.clear_cache();
    }

    /// Stop and remove the deployment at a context path.
    pub fn undeploy(&self, context_path: &str) {
        if let Some((_, removed)) = self.controllers.remove(context_path) {
            tracing::info!(context_path = %context_path, "controller removed");
            removed.controller().undeploy();
        }
        self.clear_cache();
    }

    pub fn controller(&self, context_path: &str) -> Option<Arc<WebAppController>> {
        self.controllers
            .get(context_path)
            .map(|r| r.value().controller())
    }

    /// Drop all cached URI resolutions and advance the deploy epoch so
    /// dependent caches go stale.
    pub fn clear_cache(&self) {
        self.deploy_epoch.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut cache) = self.uri_cache.lock() {
            cache.clear();
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    fn sync_cache_stamp(&self) {
        let epoch = self.deploy_epoch.load(Ordering::Acquire);
        if self.cache_stamp.swap(epoch, Ordering::AcqRel) != epoch {
            if let Ok(mut cache) = self.uri_cache.lock() {
                cache.clear();
            }
        }
    }

    fn lookup(&self, context_path: &str) -> Option<Arc<WebAppController>> {
        self.controllers
            .get(context_path)
            .map(|r| r.value().controller())
    }

    fn find_by_uri_impl(&self, uri: &str) -> Option<Arc<WebAppController>> {
        let mut candidate = uri;
        loop {
            if let Some(controller) = self.lookup(candidate) {
                return Some(controller);
            }
            if candidate.is_empty() {
                return None;
            }
            candidate = &candidate[..candidate.rfind('/').unwrap_or(0)];
        }
    }

    /// Longest-prefix controller lookup, cached per URI including misses.
    pub fn find_by_uri(&self, uri: &str) -> Option<Arc<WebAppController>> {
        self.sync_cache_stamp();
        if let Ok(mut cache) = self.uri_cache.lock() {
            if let Some(entry) = cache.get(uri) {
                return entry.clone();
            }
        }
        let found = self.find_by_uri_impl(uri);
        if let Ok(mut cache) = self.uri_cache.lock() {
            cache.put(uri.to_string(), found.clone());
        }
        found
    }

    pub fn find_web_app_by_uri(&self, uri: &str) -> Option<Arc<crate::webapp::WebApp>> {
        self.find_by_uri(uri).and_then(|c| c.instance())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolve a decoded URI to its owning web app and delegate chain
    /// building. No deployment or no live instance resolve to status chains
    /// rather than errors.
    pub fn build_invocation(self: &Arc<Self>, invocation: &mut Invocation) {
        let uri = invocation.uri().to_string();
        let Some(controller) = self.find_by_uri(&uri) else {
            tracing::debug!(uri = %uri, "no web app deployed for uri");
            invocation.set_servlet_path(uri.clone());
            invocation
                .set_dependency(Arc::new(EpochDependency::new(self.epoch_handle())));
            invocation.set_chain(Arc::new(StatusChain::not_found(&uri)));
            return;
        };

        let Some(web_app) = controller.instance() else {
            tracing::warn!(context_path = %controller.context_path(), "controller has no live instance");
            invocation.set_dependency(Arc::new(AlwaysModified));
            invocation.set_chain(Arc::new(StatusChain::unavailable(
                controller.context_path(),
                10,
            )));
            return;
        };

        let retired = controller.retired_instance();
        web_app.build_invocation(invocation);

        // During a rollover grace window, route session-affine requests to
        // the retired version. The composite chain is request-dependent, so
        // it is never cached.
        if let Some(retired) = retired {
            let mut old_invocation = Invocation::new();
            old_invocation.copy_uri_from(invocation);
            retired.web_app.build_invocation(&mut old_invocation);
            if let (Some(new_chain), Some(old_chain)) =
                (invocation.chain().cloned(), old_invocation.chain().cloned())
            {
                invocation.set_chain(Arc::new(VersionSwitchChain::new(
                    new_chain,
                    old_chain,
                    Arc::clone(&retired.web_app),
                    retired.expires_at,
                )));
                invocation.set_dependency(Arc::new(AlwaysModified));
            }
        }
    }

    /// Resolve a sub-dispatch target to its owning web app, failing eagerly.
    pub fn build_dispatch_invocation(
        self: &Arc<Self>,
        invocation: &mut Invocation,
        dispatcher_type: DispatcherType,
    ) -> Result<(), DispatchError> {
        let uri = invocation.uri().to_string();
        let web_app = self.find_web_app_by_uri(&uri).ok_or_else(|| {
            DispatchError::status(404, format!("{uri} was not found on this server"))
        })?;
        web_app.build_dispatch_invocation(invocation, dispatcher_type)
    }
}

impl std::fmt::Debug for WebAppContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAppContainer")
            .field("deployments", &self.controllers.len())
            .field("deploy_epoch", &self.deploy_epoch())
            .finish()
    }
}
