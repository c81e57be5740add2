//! Raw-URI decoding and normalization.
//!
//! Splits the query string off the raw URI, percent-decodes the path, and
//! resolves `.` and `..` segments. A path that climbs above the context root
//! is rejected outright so an encoded traversal can never reach dispatch.

use super::core::Invocation;
use crate::error::DispatchError;
use std::borrow::Cow;

/// Decodes raw request URIs into normalized invocation paths.
#[derive(Debug, Clone)]
pub struct InvocationDecoder {
    case_insensitive: bool,
    max_uri_length: usize,
}

impl Default for InvocationDecoder {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            max_uri_length: 8192,
        }
    }
}

impl InvocationDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive path matching, for deployments fronted by
    /// case-folding filesystems.
    pub fn set_case_insensitive(&mut self, case_insensitive: bool) {
        self.case_insensitive = case_insensitive;
    }

    pub fn set_max_uri_length(&mut self, max_uri_length: usize) {
        self.max_uri_length = max_uri_length;
    }

    /// Populate the invocation's raw URI, query string, and decoded URI from
    /// the raw request target.
    pub fn split_query(
        &self,
        invocation: &mut Invocation,
        raw_uri: &str,
    ) -> Result<(), DispatchError> {
        if raw_uri.len() > self.max_uri_length {
            return Err(DispatchError::BadRequest(format!(
                "request URI exceeds {} bytes",
                self.max_uri_length
            )));
        }
        invocation.set_raw_uri(raw_uri);

        let (path, query) = match raw_uri.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (raw_uri, None),
        };
        invocation.set_query_string(query);

        let uri = self.normalize_uri(path)?;
        invocation.set_uri(uri);
        Ok(())
    }

    /// Percent-decode and canonicalize a path: collapse `.` and empty
    /// segments, resolve `..`, and reject escapes above the root.
    pub fn normalize_uri(&self, raw_path: &str) -> Result<String, DispatchError> {
        let decoded: Cow<'_, str> = urlencoding::decode(raw_path)
            .map_err(|_| DispatchError::BadRequest("malformed percent-encoding".to_string()))?;

        if decoded.contains('\0') {
            return Err(DispatchError::BadRequest(
                "NUL byte in request path".to_string(),
            ));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(DispatchError::BadRequest(
                            "request path escapes the context root".to_string(),
                        ));
                    }
                }
                s => segments.push(s),
            }
        }

        let mut uri = String::with_capacity(decoded.len() + 1);
        for segment in &segments {
            uri.push('/');
            uri.push_str(segment);
        }
        if uri.is_empty() {
            uri.push('/');
        } else if decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..") {
            // Preserve directory form so welcome-file matching still sees it.
            uri.push('/');
        }

        if self.case_insensitive {
            uri = uri.to_ascii_lowercase();
        }
        Ok(uri)
    }
}
