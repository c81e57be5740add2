//! Dispatch-side response with a policy stack.
//!
//! Resin suppresses header and status mutation during an include by wrapping
//! the response in an include wrapper whose setters are no-ops. Here the
//! response carries an explicit policy stack instead: the request dispatcher
//! pushes [`ResponsePolicy::IncludeSuppressed`] around an include and pops it
//! afterward, and every header/status setter consults the top of the stack.
//! Body writes are never suppressed; included content interleaves into the
//! enclosing body.

use crate::dispatch::request::HeaderVec;
use crate::error::DispatchError;
use std::sync::{Arc, Mutex};

/// Governs which response mutations are honored at the current dispatch
/// level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    /// All mutations honored (top-level, forward, error dispatch).
    Full,
    /// Status, headers, cookies, content-type and content-length changes are
    /// silently ignored; body writes pass through.
    IncludeSuppressed,
}

/// Buffered response. Output accumulates in an unflushed buffer until the
/// first flush commits the response; committed output is visible through the
/// shared sink and can no longer be reset.
pub struct Response {
    status: u16,
    reason: Option<String>,
    headers: HeaderVec,
    cookies: Vec<String>,
    content_type: Option<String>,
    content_length: Option<u64>,
    buffer: Vec<u8>,
    sink: Arc<Mutex<Vec<u8>>>,
    committed: bool,
    closed: bool,
    has_error: bool,
    policies: Vec<ResponsePolicy>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: 200,
            reason: None,
            headers: HeaderVec::new(),
            cookies: Vec::new(),
            content_type: None,
            content_length: None,
            buffer: Vec::new(),
            sink: Arc::new(Mutex::new(Vec::new())),
            committed: false,
            closed: false,
            has_error: false,
            policies: Vec::new(),
        }
    }

    fn policy(&self) -> ResponsePolicy {
        self.policies.last().copied().unwrap_or(ResponsePolicy::Full)
    }

    pub(crate) fn push_policy(&mut self, policy: ResponsePolicy) {
        self.policies.push(policy);
    }

    pub(crate) fn pop_policy(&mut self) -> Option<ResponsePolicy> {
        self.policies.pop()
    }

    /// Depth of the policy stack; restored to its pre-dispatch value after
    /// every sub-dispatch, success or failure.
    pub fn policy_depth(&self) -> usize {
        self.policies.len()
    }

    // ------------------------------------------------------------------
    // Status and headers (policy-gated)
    // ------------------------------------------------------------------

    pub fn set_status(&mut self, status: u16) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.status = status;
        self.reason = None;
    }

    pub fn set_status_with_reason(&mut self, status: u16, reason: impl Into<String>) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.status = status;
        self.reason = Some(reason.into());
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        let value = value.into();
        for (k, v) in &mut self.headers {
            if k.eq_ignore_ascii_case(name) {
                *v = value;
                return;
            }
        }
        self.headers.push((Arc::from(name), value));
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.headers.push((Arc::from(name), value.into()));
    }

    pub fn add_cookie(&mut self, cookie: impl Into<String>) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.cookies.push(cookie.into());
    }

    pub fn set_content_type(&mut self, value: impl Into<String>) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.content_type = Some(value.into());
    }

    pub fn set_content_length(&mut self, len: u64) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.content_length = Some(len);
    }

    // ------------------------------------------------------------------
    // Body
    // ------------------------------------------------------------------

    pub fn write(&mut self, bytes: &[u8]) {
        // Output after close is silently dropped, like writing to a stream
        // the container already finished.
        if self.closed {
            return;
        }
        self.buffer.extend_from_slice(bytes);
    }

    pub fn print(&mut self, s: &str) {
        if self.closed {
            return;
        }
        self.buffer.extend_from_slice(s.as_bytes());
    }

    pub fn println(&mut self, s: &str) {
        if self.closed {
            return;
        }
        self.buffer.extend_from_slice(s.as_bytes());
        self.buffer.push(b'\n');
    }

    /// Commit the response: any buffered output becomes visible and the
    /// status line is frozen.
    pub fn flush(&mut self) {
        if !self.buffer.is_empty() {
            if let Ok(mut sink) = self.sink.lock() {
                sink.extend_from_slice(&self.buffer);
            }
            self.buffer.clear();
        }
        self.committed = true;
    }

    /// Flush and mark the response finished. A forward closes the response
    /// on success so the forwarding servlet cannot append trailing output.
    pub fn close(&mut self) {
        self.flush();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Discard unflushed output only. Safe after commit (there is nothing
    /// buffered to discard).
    pub fn reset_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Full reset: status, headers and unflushed output. Illegal once the
    /// response is committed.
    pub fn reset(&mut self) -> Result<(), DispatchError> {
        if self.committed {
            return Err(DispatchError::IllegalState(
                "cannot reset a committed response".to_string(),
            ));
        }
        self.status = 200;
        self.reason = None;
        self.headers.clear();
        self.cookies.clear();
        self.content_type = None;
        self.content_length = None;
        self.buffer.clear();
        Ok(())
    }

    /// Error short-circuit without error-page resolution. Suppressed during
    /// an include like any other status change.
    pub fn send_error(&mut self, status: u16, message: &str) {
        if self.policy() == ResponsePolicy::IncludeSuppressed {
            return;
        }
        self.reset_buffer();
        self.status = status;
        self.reason = Some(message.to_string());
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Marks that an error response is in flight; a forward over a committed
    /// error response is tolerated once instead of raising illegal state.
    pub fn set_has_error(&mut self, has_error: bool) {
        self.has_error = has_error;
    }

    /// Committed plus buffered output, in write order.
    pub fn body(&self) -> Vec<u8> {
        let mut out = self
            .sink
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        out.extend_from_slice(&self.buffer);
        out
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }

    /// Handle to the committed-output sink. The handle is stable across
    /// sub-dispatches: included and forwarded servlets write into the same
    /// underlying stream as the top-level request.
    pub fn sink(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.sink)
    }
}
