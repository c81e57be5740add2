//! Resolved dispatch target for one raw URI.
//!
//! An invocation starts as a bare carrier of the raw and decoded URI, is
//! progressively filled in by the container and web-app pipeline (context
//! split, servlet match, chain composition), and finally executes requests.
//! Cached invocations carry a [`Dependency`] so the dispatch server can
//! detect staleness before reuse.

use crate::cache::{AlwaysModified, Dependency};
use crate::chain::FilterChain;
use crate::dispatch::{DispatchFrame, DispatcherType, Request, Response};
use crate::error::DispatchError;
use crate::webapp::WebApp;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Multipart handling parameters attached to a servlet registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartConfig {
    pub location: Option<String>,
    pub max_file_size: Option<u64>,
    pub max_request_size: Option<u64>,
    pub file_size_threshold: Option<u64>,
}

/// The result of resolving a raw URI: decoded paths, the owning web app,
/// and the executable chain.
pub struct Invocation {
    raw_uri: String,
    query: Option<String>,
    uri: String,
    context_path: String,
    context_uri: String,
    servlet_path: String,
    path_info: Option<String>,
    servlet_name: Option<Arc<str>>,
    chain: Option<Arc<dyn FilterChain>>,
    dependency: Arc<dyn Dependency>,
    web_app: Option<Arc<WebApp>>,
    async_supported: bool,
    multipart: Option<MultipartConfig>,
}

impl Default for Invocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Invocation {
    pub fn new() -> Self {
        Self {
            raw_uri: String::new(),
            query: None,
            uri: String::new(),
            context_path: String::new(),
            context_uri: String::new(),
            servlet_path: String::new(),
            path_info: None,
            servlet_name: None,
            chain: None,
            dependency: Arc::new(AlwaysModified),
            web_app: None,
            async_supported: false,
            multipart: None,
        }
    }

    /// Raw URI as received, before decoding; the dispatch-server cache key.
    pub fn raw_uri(&self) -> &str {
        &self.raw_uri
    }

    pub fn set_raw_uri(&mut self, raw_uri: impl Into<String>) {
        self.raw_uri = raw_uri.into();
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn set_query_string(&mut self, query: Option<String>) {
        self.query = query;
    }

    /// Decoded, normalized URI including the context path.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub fn set_context_path(&mut self, context_path: impl Into<String>) {
        self.context_path = context_path.into();
    }

    /// URI tail after the context path, the input to servlet mapping.
    pub fn context_uri(&self) -> &str {
        &self.context_uri
    }

    pub fn set_context_uri(&mut self, context_uri: impl Into<String>) {
        self.context_uri = context_uri.into();
    }

    pub fn servlet_path(&self) -> &str {
        &self.servlet_path
    }

    pub fn set_servlet_path(&mut self, servlet_path: impl Into<String>) {
        self.servlet_path = servlet_path.into();
    }

    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }

    pub fn set_path_info(&mut self, path_info: Option<String>) {
        self.path_info = path_info;
    }

    pub fn servlet_name(&self) -> Option<&Arc<str>> {
        self.servlet_name.as_ref()
    }

    pub fn set_servlet_name(&mut self, name: Arc<str>) {
        self.servlet_name = Some(name);
    }

    pub fn chain(&self) -> Option<&Arc<dyn FilterChain>> {
        self.chain.as_ref()
    }

    pub fn set_chain(&mut self, chain: Arc<dyn FilterChain>) {
        self.chain = Some(chain);
    }

    pub fn dependency(&self) -> &Arc<dyn Dependency> {
        &self.dependency
    }

    pub fn set_dependency(&mut self, dependency: Arc<dyn Dependency>) {
        self.dependency = dependency;
    }

    /// Whether the resolution this invocation captured is stale.
    pub fn is_modified(&self) -> bool {
        self.dependency.is_modified()
    }

    pub fn web_app(&self) -> Option<&Arc<WebApp>> {
        self.web_app.as_ref()
    }

    pub fn set_web_app(&mut self, web_app: Arc<WebApp>) {
        self.web_app = Some(web_app);
    }

    pub fn is_async_supported(&self) -> bool {
        self.async_supported
    }

    pub fn set_async_supported(&mut self, async_supported: bool) {
        self.async_supported = async_supported;
    }

    pub fn multipart_config(&self) -> Option<&MultipartConfig> {
        self.multipart.as_ref()
    }

    pub fn set_multipart_config(&mut self, config: Option<MultipartConfig>) {
        self.multipart = config;
    }

    /// Copy the URI fields (not the resolution results) from another
    /// invocation. Used when a cached resolution is stale and must be
    /// rebuilt from the same raw input.
    pub fn copy_uri_from(&mut self, other: &Invocation) {
        self.raw_uri = other.raw_uri.clone();
        self.query = other.query.clone();
        self.uri = other.uri.clone();
    }

    /// Snapshot this invocation's paths into a dispatch frame.
    pub fn to_frame(&self, dispatcher_type: DispatcherType) -> DispatchFrame {
        DispatchFrame {
            dispatcher_type,
            uri: self.uri.clone(),
            context_path: self.context_path.clone(),
            servlet_path: self.servlet_path.clone(),
            path_info: self.path_info.clone(),
            query_string: self.query.clone(),
            servlet_name: self.servlet_name.clone(),
        }
    }

    /// Execute the resolved chain. The caller is responsible for frame
    /// management; a top-level caller installs the frame from
    /// [`Invocation::to_frame`] first.
    pub fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        match &self.chain {
            Some(chain) => chain.service(req, res),
            None => Err(DispatchError::Config(format!(
                "invocation for {} has no filter chain",
                self.uri
            ))),
        }
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("raw_uri", &self.raw_uri)
            .field("uri", &self.uri)
            .field("context_path", &self.context_path)
            .field("servlet_path", &self.servlet_path)
            .field("path_info", &self.path_info)
            .field("servlet_name", &self.servlet_name)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}
