//! Forward, include and error dispatch.
//!
//! A [`RequestDispatcher`] holds pre-resolved invocations for one target
//! URL, one per dispatcher type, since forward and include can compose
//! different filter pipelines. Dispatch pushes a frame onto the request and
//! a policy onto the response, runs the target chain, and unconditionally
//! pops both and restores any shadowed attributes, so the caller's view of
//! the request is identical after the dispatch whether the target succeeded
//! or failed.

use super::attributes::{
    FORWARD_CONTEXT_PATH, FORWARD_PATH_INFO, FORWARD_QUERY_STRING, FORWARD_REQUEST_URI,
    FORWARD_SERVLET_PATH, INCLUDE_CONTEXT_PATH, INCLUDE_PATH_INFO, INCLUDE_QUERY_STRING,
    INCLUDE_REQUEST_URI, INCLUDE_SERVLET_PATH,
};
use super::request::{DispatcherType, Request};
use super::response::{Response, ResponsePolicy};
use crate::error::DispatchError;
use crate::invocation::Invocation;
use crate::webapp::WebApp;
use serde_json::Value;
use std::sync::Arc;

/// Attribute values shadowed by a sub-dispatch, restored on exit in reverse
/// order.
struct SavedAttributes {
    entries: Vec<(&'static str, Option<Value>)>,
}

impl SavedAttributes {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn set(&mut self, req: &mut Request, name: &'static str, value: Option<Value>) {
        let old = match value {
            Some(value) => req.set_attribute(name, value),
            None => req.remove_attribute(name),
        };
        self.entries.push((name, old));
    }

    fn restore(self, req: &mut Request) {
        for (name, old) in self.entries.into_iter().rev() {
            match old {
                Some(value) => {
                    req.set_attribute(name, value);
                }
                None => {
                    req.remove_attribute(name);
                }
            }
        }
    }
}

fn opt_str(value: Option<&str>) -> Option<Value> {
    value.map(|v| Value::String(v.to_string()))
}

/// Dispatcher for one target URL within (or across) web apps.
pub struct RequestDispatcher {
    forward_invocation: Invocation,
    include_invocation: Invocation,
    error_invocation: Invocation,
    web_app: Arc<WebApp>,
}

impl RequestDispatcher {
    pub fn new(
        forward_invocation: Invocation,
        include_invocation: Invocation,
        error_invocation: Invocation,
        web_app: Arc<WebApp>,
    ) -> Self {
        Self {
            forward_invocation,
            include_invocation,
            error_invocation,
            web_app,
        }
    }

    /// Whether any underlying resolution has gone stale; a cached dispatcher
    /// reporting modified is rebuilt by its web app.
    pub fn is_modified(&self) -> bool {
        self.forward_invocation.is_modified()
            || self.include_invocation.is_modified()
            || self.error_invocation.is_modified()
    }

    /// Abandon the current response and restart output at the target.
    /// Illegal once the response is committed, unless the app opts into
    /// forward-after-flush or an error response is already in flight.
    pub fn forward(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        self.forward_like(req, res, DispatcherType::Forward, &self.forward_invocation)
    }

    /// Forward to an error page. Skips the committed-response restriction
    /// and always discards unflushed output; the `javax.servlet.error.*`
    /// attributes are the caller's responsibility.
    pub fn error(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        self.forward_like(req, res, DispatcherType::Error, &self.error_invocation)
    }

    /// Re-enter the engine at the target as if it were a fresh request:
    /// forward semantics under the request dispatcher type. Used for async
    /// resume and rewrite re-entry, where the target must not observe itself
    /// as forwarded-to.
    pub fn dispatch(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        self.forward_like(req, res, DispatcherType::Request, &self.forward_invocation)
    }

    fn forward_like(
        &self,
        req: &mut Request,
        res: &mut Response,
        dispatcher_type: DispatcherType,
        invocation: &Invocation,
    ) -> Result<(), DispatchError> {
        if dispatcher_type == DispatcherType::Forward
            && res.is_committed()
            && !self.web_app.is_allow_forward_after_flush()
        {
            if !res.has_error() {
                res.set_has_error(true);
                return Err(DispatchError::IllegalState(
                    "forward after the response was committed".to_string(),
                ));
            }
            // An error response already went out; swallow the late forward
            // instead of cascading a second failure.
            tracing::debug!(uri = %invocation.uri(), "late forward on committed error response ignored");
            return Ok(());
        }

        res.reset_buffer();

        // The forward attributes describe the original request, so the
        // caller's paths are captured before the target frame shadows them.
        // The first forward in a chain sets them; later forwards leave them
        // alone.
        let original = (dispatcher_type == DispatcherType::Forward
            && req.get_attribute(FORWARD_REQUEST_URI).is_none())
        .then(|| {
            (
                req.uri().to_string(),
                req.context_path().to_string(),
                req.servlet_path().to_string(),
                req.path_info().map(str::to_string),
                req.query_string().map(str::to_string),
            )
        });

        req.push_frame(invocation.to_frame(dispatcher_type))?;
        res.push_policy(ResponsePolicy::Full);

        let mut saved = SavedAttributes::new();
        if let Some((uri, context_path, servlet_path, path_info, query)) = original {
            saved.set(req, FORWARD_REQUEST_URI, Some(Value::String(uri)));
            saved.set(req, FORWARD_CONTEXT_PATH, Some(Value::String(context_path)));
            saved.set(req, FORWARD_SERVLET_PATH, Some(Value::String(servlet_path)));
            saved.set(req, FORWARD_PATH_INFO, opt_str(path_info.as_deref()));
            saved.set(req, FORWARD_QUERY_STRING, opt_str(query.as_deref()));
        }

        tracing::debug!(
            request_id = %req.id,
            dispatcher = %dispatcher_type,
            uri = %invocation.uri(),
            depth = req.dispatch_depth(),
            "sub-dispatch"
        );
        let result = invocation.service(req, res);

        saved.restore(req);
        res.pop_policy();
        req.pop_frame();
        req.release_session();

        if result.is_ok()
            && dispatcher_type == DispatcherType::Forward
            && !self.web_app.is_allow_forward_after_flush()
        {
            res.close();
        }
        result
    }

    /// Run the target and interleave its output into the current response.
    /// The target sees its own paths only through the
    /// `javax.servlet.include.*` attributes, and its header and status
    /// mutations are suppressed.
    pub fn include(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        let invocation = &self.include_invocation;

        req.push_frame(invocation.to_frame(DispatcherType::Include))?;
        res.push_policy(ResponsePolicy::IncludeSuppressed);

        // Include attributes describe the target and nest: each include
        // shadows the enclosing one and restores it on exit.
        let mut saved = SavedAttributes::new();
        saved.set(
            req,
            INCLUDE_REQUEST_URI,
            Some(Value::String(invocation.uri().to_string())),
        );
        saved.set(
            req,
            INCLUDE_CONTEXT_PATH,
            Some(Value::String(invocation.context_path().to_string())),
        );
        saved.set(
            req,
            INCLUDE_SERVLET_PATH,
            Some(Value::String(invocation.servlet_path().to_string())),
        );
        saved.set(req, INCLUDE_PATH_INFO, opt_str(invocation.path_info()));
        saved.set(req, INCLUDE_QUERY_STRING, opt_str(invocation.query_string()));

        tracing::debug!(
            request_id = %req.id,
            dispatcher = %DispatcherType::Include,
            uri = %invocation.uri(),
            depth = req.dispatch_depth(),
            "sub-dispatch"
        );
        let result = invocation.service(req, res);

        saved.restore(req);
        res.pop_policy();
        req.pop_frame();
        req.release_session();
        result
    }
}
