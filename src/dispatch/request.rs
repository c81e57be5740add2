//! Dispatch-side request view.
//!
//! Resin models forward/include/error targets as a hierarchy of request
//! wrapper classes that shadow the path accessors of the enclosing request.
//! Here that collapses into a single frame stack: each sub-dispatch pushes a
//! [`DispatchFrame`] carrying the dispatcher-type tag and the target paths,
//! and the accessor policy decides which frame is visible. A forward or error
//! frame replaces the visible paths; an include frame is skipped by the path
//! accessors (the enclosing request's paths stay visible) and exposes its
//! target only through the `javax.servlet.include.*` attributes.

use crate::error::{DispatchError, MAX_DISPATCH_DEPTH};
use crate::ids::RequestId;
use crate::session::{Session, SharedSessionProvider};
use http::Method;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// Maximum inline headers before heap allocation; most requests carry fewer.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the hot path. Header names use
/// `Arc<str>` since they repeat across requests; values are per-request.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// How the current processing was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherType {
    Request,
    Forward,
    Include,
    Error,
    Login,
}

impl std::fmt::Display for DispatcherType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DispatcherType::Request => "REQUEST",
            DispatcherType::Forward => "FORWARD",
            DispatcherType::Include => "INCLUDE",
            DispatcherType::Error => "ERROR",
            DispatcherType::Login => "LOGIN",
        };
        f.write_str(s)
    }
}

/// One dispatch target: the decoded paths of a top-level request or of a
/// forward/include/error sub-dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFrame {
    pub dispatcher_type: DispatcherType,
    pub uri: String,
    pub context_path: String,
    pub servlet_path: String,
    pub path_info: Option<String>,
    pub query_string: Option<String>,
    pub servlet_name: Option<Arc<str>>,
}

impl DispatchFrame {
    pub fn new(dispatcher_type: DispatcherType, uri: impl Into<String>) -> Self {
        Self {
            dispatcher_type,
            uri: uri.into(),
            context_path: String::new(),
            servlet_path: String::new(),
            path_info: None,
            query_string: None,
            servlet_name: None,
        }
    }
}

/// The request as seen by filters and servlets during dispatch.
///
/// Owns the raw request data (method, headers, body, attributes) plus the
/// frame stack that tracks nested sub-dispatches. The frame stack length,
/// minus the top-level frame, is the dispatch depth checked against
/// [`MAX_DISPATCH_DEPTH`].
pub struct Request {
    pub id: RequestId,
    pub method: Method,
    raw_uri: String,
    pub headers: HeaderVec,
    pub body: Option<Value>,
    attributes: HashMap<String, Value>,
    frames: Vec<DispatchFrame>,
    requested_session_id: Option<String>,
    session: Option<Session>,
    session_provider: Option<SharedSessionProvider>,
}

impl Request {
    pub fn new(method: Method, raw_uri: impl Into<String>) -> Self {
        let raw_uri = raw_uri.into();
        Self {
            id: RequestId::new(),
            method,
            raw_uri,
            headers: HeaderVec::new(),
            body: None,
            attributes: HashMap::new(),
            frames: Vec::new(),
            requested_session_id: None,
            session: None,
            session_provider: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.requested_session_id = Some(id.into());
        self
    }

    pub fn with_session_provider(mut self, provider: SharedSessionProvider) -> Self {
        self.session_provider = Some(provider);
        self
    }

    /// Get a header by name (case-insensitive).
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn raw_uri(&self) -> &str {
        &self.raw_uri
    }

    // ------------------------------------------------------------------
    // Frame stack
    // ------------------------------------------------------------------

    /// Install the top-level frame. Replaces any existing stack; called once
    /// per request by the dispatch server before chain execution.
    pub fn set_top_frame(&mut self, frame: DispatchFrame) {
        self.frames.clear();
        self.frames.push(frame);
    }

    /// Push a sub-dispatch frame, enforcing the nesting bound. The caller
    /// must pop the frame in all outcomes (the request dispatcher does this
    /// unconditionally after chain execution).
    pub(crate) fn push_frame(&mut self, frame: DispatchFrame) -> Result<(), DispatchError> {
        if self.dispatch_depth() >= MAX_DISPATCH_DEPTH {
            return Err(DispatchError::DepthExceeded {
                servlet_path: self.servlet_path().to_string(),
                depth: self.dispatch_depth() + 1,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub(crate) fn pop_frame(&mut self) -> Option<DispatchFrame> {
        // Frame 0 is the top-level request; only sub-frames pop.
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// Nesting depth of sub-dispatches: 0 for a top-level request.
    pub fn dispatch_depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// Number of frames including the top-level one. Exposed so callers can
    /// verify the wrapper graph is restored after a sub-dispatch.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn dispatcher_type(&self) -> DispatcherType {
        self.frames
            .last()
            .map(|f| f.dispatcher_type)
            .unwrap_or(DispatcherType::Request)
    }

    /// The frame whose paths are visible: the topmost non-include frame.
    /// Include targets stay invisible to the path accessors per the include
    /// contract; their paths live in the `javax.servlet.include.*`
    /// attributes instead.
    fn effective_frame(&self) -> Option<&DispatchFrame> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.dispatcher_type != DispatcherType::Include)
    }

    /// The innermost frame regardless of type: what the currently executing
    /// chain was resolved against. Used by mappers and access logging.
    pub fn current_frame(&self) -> Option<&DispatchFrame> {
        self.frames.last()
    }

    pub fn uri(&self) -> &str {
        self.effective_frame().map(|f| f.uri.as_str()).unwrap_or("")
    }

    pub fn context_path(&self) -> &str {
        self.effective_frame()
            .map(|f| f.context_path.as_str())
            .unwrap_or("")
    }

    pub fn servlet_path(&self) -> &str {
        self.effective_frame()
            .map(|f| f.servlet_path.as_str())
            .unwrap_or("")
    }

    pub fn path_info(&self) -> Option<&str> {
        self.effective_frame().and_then(|f| f.path_info.as_deref())
    }

    pub fn query_string(&self) -> Option<&str> {
        self.effective_frame()
            .and_then(|f| f.query_string.as_deref())
    }

    pub fn servlet_name(&self) -> Option<&str> {
        self.effective_frame()
            .and_then(|f| f.servlet_name.as_deref())
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set an attribute, returning the previous value so sub-dispatch can
    /// restore it on exit.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(name.into(), value)
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn requested_session_id(&self) -> Option<&str> {
        self.requested_session_id.as_deref()
    }

    /// Resolve the session through the configured provider, caching the
    /// result for the remainder of the (sub-)request.
    pub fn session(&mut self, create: bool) -> Option<Session> {
        if self.session.is_none() {
            let provider = self.session_provider.clone()?;
            self.session = provider.get_session(self.requested_session_id(), create);
        }
        self.session.clone()
    }

    /// Drop the per-request session reference. Called when a sub-request
    /// finishes so a stale handle never leaks into the enclosing request.
    pub fn release_session(&mut self) {
        self.session = None;
    }
}
