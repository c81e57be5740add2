//! Filter-chain traits and the built-in terminal chains.
//!
//! A resolved invocation executes as a linked chain: zero or more
//! [`FilterLink`]s around a terminal chain, usually a [`ServletChain`].
//! Resolution failures also become chains ([`ExceptionChain`],
//! [`StatusChain`]) so a broken deployment still produces an executable,
//! cacheable pipeline instead of a special-cased early return.

use crate::dispatch::{Request, Response};
use crate::error::DispatchError;
use std::sync::Arc;

/// One executable step of request processing.
pub trait FilterChain: Send + Sync {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError>;
}

/// Terminal request handler.
pub trait Servlet: Send + Sync {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError>;
}

/// Interposed processing step. A filter decides whether and when to invoke
/// the rest of the chain.
pub trait Filter: Send + Sync {
    fn do_filter(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: &dyn FilterChain,
    ) -> Result<(), DispatchError>;
}

/// Terminal chain delegating to a servlet.
pub struct ServletChain {
    name: Arc<str>,
    servlet: Arc<dyn Servlet>,
}

impl ServletChain {
    pub fn new(name: Arc<str>, servlet: Arc<dyn Servlet>) -> Self {
        Self { name, servlet }
    }

    pub fn servlet_name(&self) -> &str {
        &self.name
    }
}

impl FilterChain for ServletChain {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        tracing::trace!(servlet = %self.name, uri = %req.uri(), "servlet service");
        self.servlet.service(req, res)
    }
}

/// One filter plus the rest of the chain.
pub struct FilterLink {
    name: Arc<str>,
    filter: Arc<dyn Filter>,
    next: Arc<dyn FilterChain>,
}

impl FilterLink {
    pub fn new(name: Arc<str>, filter: Arc<dyn Filter>, next: Arc<dyn FilterChain>) -> Self {
        Self { name, filter, next }
    }

    pub fn filter_name(&self) -> &str {
        &self.name
    }
}

impl FilterChain for FilterLink {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        tracing::trace!(filter = %self.name, uri = %req.uri(), "filter service");
        self.filter.do_filter(req, res, self.next.as_ref())
    }
}

/// Chain whose execution reproduces a resolution-time failure. A web app
/// with a configuration error maps every request to one of these so the
/// error surfaces through the normal error-page machinery.
pub struct ExceptionChain {
    error: DispatchError,
}

impl ExceptionChain {
    pub fn new(error: DispatchError) -> Self {
        Self { error }
    }
}

impl FilterChain for ExceptionChain {
    fn service(&self, _req: &mut Request, _res: &mut Response) -> Result<(), DispatchError> {
        Err(self.error.clone())
    }
}

/// Chain that completes with a fixed status code. Used for 404 on unmapped
/// URIs and 503 while a web app is unavailable.
pub struct StatusChain {
    status: u16,
    message: String,
    retry_after_secs: Option<u32>,
}

impl StatusChain {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(uri: &str) -> Self {
        Self::new(404, format!("{uri} was not found on this server"))
    }

    pub fn unavailable(context_path: &str, retry_after_secs: u32) -> Self {
        Self {
            status: 503,
            message: format!("{context_path} is temporarily unavailable"),
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }
}

impl FilterChain for StatusChain {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        tracing::debug!(status = self.status, uri = %req.uri(), "status chain");
        if let Some(secs) = self.retry_after_secs {
            res.set_header("Retry-After", secs.to_string());
        }
        Err(DispatchError::Status {
            status: self.status,
            message: self.message.clone(),
        })
    }
}
