//! Process-wide dispatch entry point.
//!
//! One [`DispatchServer`] fronts a [`WebAppContainer`]: it decodes the raw
//! request target, caches the resolved invocation keyed by the raw URI plus
//! query, and drives execution with top-level error handling. Callers run
//! one blocking `service` call per request thread.

use crate::dispatch::{DispatcherType, Request, Response};
use crate::error::DispatchError;
use crate::error_pages::ErrorPageManager;
use crate::invocation::{Invocation, InvocationDecoder};
use crate::runtime_config::RuntimeConfig;
use crate::webapp::WebAppContainer;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub struct DispatchServer {
    container: Arc<WebAppContainer>,
    decoder: InvocationDecoder,
    invocation_cache: Mutex<LruCache<String, Arc<Invocation>>>,
    cache_stamp: AtomicU64,
    fallback_error_pages: ErrorPageManager,
}

impl DispatchServer {
    pub fn new(config: &RuntimeConfig, container: Arc<WebAppContainer>) -> Arc<Self> {
        let capacity =
            NonZeroUsize::new(config.uri_cache_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Arc::new(Self {
            container,
            decoder: InvocationDecoder::new(),
            invocation_cache: Mutex::new(LruCache::new(capacity)),
            cache_stamp: AtomicU64::new(0),
            fallback_error_pages: ErrorPageManager::new(config.dev_mode),
        })
    }

    pub fn container(&self) -> &Arc<WebAppContainer> {
        &self.container
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.invocation_cache.lock() {
            cache.clear();
        }
    }

    /// Invalidate wholesale when the container's deployments changed since
    /// the cache was filled.
    fn sync_cache_stamp(&self) {
        let epoch = self.container.deploy_epoch();
        if self.cache_stamp.swap(epoch, Ordering::AcqRel) != epoch {
            self.clear_cache();
        }
    }

    /// Resolve the raw request target to an invocation, reusing a cached
    /// resolution while its dependency holds.
    pub fn build_invocation(&self, raw_target: &str) -> Result<Arc<Invocation>, DispatchError> {
        self.sync_cache_stamp();

        if let Ok(mut cache) = self.invocation_cache.lock() {
            match cache.get(raw_target) {
                Some(invocation) if !invocation.is_modified() => {
                    return Ok(Arc::clone(invocation));
                }
                Some(_) => {
                    cache.pop(raw_target);
                }
                None => {}
            }
        }

        let mut invocation = Invocation::new();
        self.decoder.split_query(&mut invocation, raw_target)?;
        self.container.build_invocation(&mut invocation);
        let invocation = Arc::new(invocation);

        if let Ok(mut cache) = self.invocation_cache.lock() {
            cache.put(raw_target.to_string(), Arc::clone(&invocation));
        }
        Ok(invocation)
    }

    /// Serve one request to completion: resolve, execute, route failures to
    /// error pages, and commit the response. Blocks the calling thread for
    /// the duration of the request.
    ///
    /// A client disconnect is re-raised so the connection layer can drop the
    /// connection; no error page is rendered for it.
    pub fn service(
        &self,
        raw_target: &str,
        req: &mut Request,
        res: &mut Response,
    ) -> Result<(), DispatchError> {
        let invocation = match self.build_invocation(raw_target) {
            Ok(invocation) => invocation,
            Err(err) => {
                tracing::debug!(target = %raw_target, error = %err, "request target rejected");
                self.fallback_error_pages
                    .send_servlet_error(&err, req, res, None);
                res.close();
                return Ok(());
            }
        };

        req.set_top_frame(invocation.to_frame(DispatcherType::Request));

        if let Err(err) = invocation.service(req, res) {
            if err.is_client_disconnect() {
                tracing::debug!(request_id = %req.id, "client disconnected");
                res.reset_buffer();
                res.close();
                return Err(err);
            }
            let error_pages = invocation
                .web_app()
                .map(|app| Arc::clone(app.error_pages()));
            match &error_pages {
                Some(pages) => pages.send_servlet_error(&err, req, res, invocation.web_app()),
                None => self
                    .fallback_error_pages
                    .send_servlet_error(&err, req, res, None),
            }
        }
        res.close();
        Ok(())
    }
}

impl std::fmt::Debug for DispatchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchServer")
            .field("container", &self.container)
            .finish()
    }
}
