//! Per-web-app wrapper chains.
//!
//! Every cached invocation chain is wrapped so that execution enters the
//! owning web app: the active-request counter moves, the thread's app scope
//! switches, request listeners fire, and dangling transactions are closed on
//! the way out regardless of outcome. Statistics and access logging are
//! separate wrappers so they can be toggled per app.

use super::core::FilterChain;
use crate::dispatch::{Request, Response};
use crate::error::DispatchError;
use crate::txn;
use crate::webapp::WebApp;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Instant;

thread_local! {
    static CURRENT_APP: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Marks the current thread as executing inside a web app for the lifetime
/// of the guard, restoring the previous scope on drop. The rough analogue of
/// a context-class-loader switch.
pub struct AppScope {
    prev: Option<String>,
}

impl AppScope {
    pub fn enter(context_path: &str) -> Self {
        let prev = CURRENT_APP
            .with(|c| c.borrow_mut().replace(context_path.to_string()));
        Self { prev }
    }

    /// Context path of the web app the current thread is executing in, if
    /// any.
    pub fn current() -> Option<String> {
        CURRENT_APP.with(|c| c.borrow().clone())
    }
}

impl Drop for AppScope {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_APP.with(|c| *c.borrow_mut() = prev);
    }
}

/// Notified at the start and end of every request entering a web app.
pub trait RequestListener: Send + Sync {
    fn request_initialized(&self, req: &Request);
    fn request_destroyed(&self, req: &Request);
}

/// Sink for completed-request log lines.
pub trait AccessLog: Send + Sync {
    fn log(&self, req: &Request, res: &Response);
}

/// Access log emitting common-log-format lines through `tracing` under the
/// `access_log` target.
pub struct TracingAccessLog;

impl AccessLog for TracingAccessLog {
    fn log(&self, req: &Request, res: &Response) {
        let timestamp = chrono::Utc::now().format("%d/%b/%Y:%H:%M:%S %z");
        let target = match req.query_string() {
            Some(query) => format!("{}?{query}", req.uri()),
            None => req.uri().to_string(),
        };
        tracing::info!(
            target: "access_log",
            request_id = %req.id,
            "{} \"{} {} HTTP/1.1\" {} {}",
            timestamp,
            req.method,
            target,
            res.status(),
            res.body().len()
        );
    }
}

/// Hook for an external response cache to interpose on the resolved chain.
pub trait CacheChainProvider: Send + Sync {
    fn create_filter_chain(
        &self,
        next: Arc<dyn FilterChain>,
        web_app: &Arc<WebApp>,
    ) -> Arc<dyn FilterChain>;
}

/// Entry chain of a web app: scope switch, active-count bookkeeping,
/// listeners, and end-of-request cleanup.
pub struct WebAppChain {
    next: Arc<dyn FilterChain>,
    web_app: Arc<WebApp>,
}

impl WebAppChain {
    pub fn new(next: Arc<dyn FilterChain>, web_app: Arc<WebApp>) -> Self {
        Self { next, web_app }
    }
}

/// Decrements the active count and closes dangling transactions when the
/// request unwinds, no matter how the chain below exits.
struct RequestCleanup<'a> {
    web_app: &'a WebApp,
    context_path: &'a str,
}

impl Drop for RequestCleanup<'_> {
    fn drop(&mut self) {
        txn::close_dangling(self.context_path);
        self.web_app.request_finished();
    }
}

impl FilterChain for WebAppChain {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        let context_path = self.web_app.context_path();
        let _scope = AppScope::enter(context_path);
        self.web_app.request_started();
        let _cleanup = RequestCleanup {
            web_app: &self.web_app,
            context_path,
        };

        for listener in self.web_app.request_listeners() {
            listener.request_initialized(req);
        }

        let result = self.next.service(req, res);

        for listener in self.web_app.request_listeners() {
            listener.request_destroyed(req);
        }

        if let Err(err) = &result {
            if err.is_client_disconnect() {
                tracing::debug!(
                    request_id = %req.id,
                    uri = %req.uri(),
                    "client disconnected during dispatch"
                );
                self.web_app.record_client_disconnect();
            }
        }
        result
    }
}

/// Records per-app request counts and latency around the wrapped chain.
pub struct StatisticsChain {
    next: Arc<dyn FilterChain>,
    web_app: Arc<WebApp>,
}

impl StatisticsChain {
    pub fn new(next: Arc<dyn FilterChain>, web_app: Arc<WebApp>) -> Self {
        Self { next, web_app }
    }
}

impl FilterChain for StatisticsChain {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        let start = Instant::now();
        let result = self.next.service(req, res);
        self.web_app
            .record_request(start.elapsed(), result.is_err());
        result
    }
}

/// Writes one access-log line after the wrapped chain completes, error or
/// not.
pub struct AccessLogChain {
    next: Arc<dyn FilterChain>,
    log: Arc<dyn AccessLog>,
}

impl AccessLogChain {
    pub fn new(next: Arc<dyn FilterChain>, log: Arc<dyn AccessLog>) -> Self {
        Self { next, log }
    }
}

impl FilterChain for AccessLogChain {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        let result = self.next.service(req, res);
        self.log.log(req, res);
        result
    }
}

/// During a versioned rollover, routes requests carrying a live session of
/// the previous version back to that version until the grace window closes.
pub struct VersionSwitchChain {
    new_chain: Arc<dyn FilterChain>,
    old_chain: Arc<dyn FilterChain>,
    old_app: Arc<WebApp>,
    expires_at: Instant,
}

impl VersionSwitchChain {
    pub fn new(
        new_chain: Arc<dyn FilterChain>,
        old_chain: Arc<dyn FilterChain>,
        old_app: Arc<WebApp>,
        expires_at: Instant,
    ) -> Self {
        Self {
            new_chain,
            old_chain,
            old_app,
            expires_at,
        }
    }

    fn routes_to_old(&self, req: &Request) -> bool {
        if Instant::now() >= self.expires_at {
            return false;
        }
        let Some(session_id) = req.requested_session_id() else {
            return false;
        };
        self.old_app
            .session_provider()
            .map(|p| p.get_session(Some(session_id), false).is_some())
            .unwrap_or(false)
    }
}

impl FilterChain for VersionSwitchChain {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        if self.routes_to_old(req) {
            tracing::debug!(
                context_path = %self.old_app.context_path(),
                "routing session-affine request to previous version"
            );
            self.old_chain.service(req, res)
        } else {
            self.new_chain.service(req, res)
        }
    }
}
