//! Servlet registration and URI-to-servlet mapping.
//!
//! Holds the servlet registrations of one web app plus the pattern table,
//! and resolves a context URI to a terminal chain: pattern match first, then
//! welcome files for directory requests, then the default servlet, then 404.

use super::url_map::UrlMap;
use crate::chain::{FilterChain, ServletChain, StatusChain};
use crate::error::DispatchError;
use crate::invocation::{Invocation, MultipartConfig};
use crate::chain::Servlet;
use std::collections::HashMap;
use std::sync::Arc;

/// A servlet plus its per-registration dispatch options.
pub struct ServletRegistration {
    pub servlet: Arc<dyn Servlet>,
    pub async_supported: bool,
    pub multipart: Option<MultipartConfig>,
}

/// Maps context URIs to servlet chains for one web app.
pub struct ServletMapper {
    servlets: HashMap<Arc<str>, ServletRegistration>,
    map: UrlMap<Arc<str>>,
    default_servlet: Option<Arc<str>>,
    welcome_files: Vec<String>,
}

impl Default for ServletMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ServletMapper {
    pub fn new() -> Self {
        Self {
            servlets: HashMap::new(),
            map: UrlMap::new(),
            default_servlet: None,
            welcome_files: Vec::new(),
        }
    }

    pub fn add_servlet(&mut self, name: &str, servlet: Arc<dyn Servlet>) {
        self.add_registration(
            name,
            ServletRegistration {
                servlet,
                async_supported: false,
                multipart: None,
            },
        );
    }

    pub fn add_registration(&mut self, name: &str, registration: ServletRegistration) {
        self.servlets.insert(Arc::from(name), registration);
    }

    /// Map a URL pattern to a registered servlet name. The `/` pattern
    /// designates the default servlet.
    pub fn add_mapping(&mut self, pattern: &str, servlet_name: &str) -> Result<(), DispatchError> {
        if pattern == "/" {
            self.default_servlet = Some(Arc::from(servlet_name));
            Ok(())
        } else {
            self.map.add_map(pattern, Arc::from(servlet_name))
        }
    }

    pub fn add_regexp_mapping(
        &mut self,
        pattern: &str,
        weight: usize,
        servlet_name: &str,
    ) -> Result<(), DispatchError> {
        self.map.add_regexp(pattern, weight, Arc::from(servlet_name))
    }

    pub fn set_welcome_files(&mut self, files: Vec<String>) {
        self.welcome_files = files;
    }

    fn registration(&self, name: &Arc<str>) -> Result<&ServletRegistration, DispatchError> {
        self.servlets.get(name).ok_or_else(|| {
            DispatchError::Config(format!("servlet '{name}' is mapped but not registered"))
        })
    }

    fn chain_for(
        &self,
        name: &Arc<str>,
        invocation: &mut Invocation,
        servlet_path: String,
        path_info: Option<String>,
    ) -> Result<Arc<dyn FilterChain>, DispatchError> {
        let registration = self.registration(name)?;
        invocation.set_servlet_name(Arc::clone(name));
        invocation.set_servlet_path(servlet_path);
        invocation.set_path_info(path_info);
        invocation.set_async_supported(registration.async_supported);
        invocation.set_multipart_config(registration.multipart.clone());
        Ok(Arc::new(ServletChain::new(
            Arc::clone(name),
            Arc::clone(&registration.servlet),
        )))
    }

    /// Resolve the invocation's context URI to a terminal chain, recording
    /// the servlet name and path split on the invocation.
    pub fn map_servlet(
        &self,
        invocation: &mut Invocation,
    ) -> Result<Arc<dyn FilterChain>, DispatchError> {
        let context_uri = if invocation.context_uri().is_empty() {
            "/".to_string()
        } else {
            invocation.context_uri().to_string()
        };

        // Directory request: probe welcome files against the pattern table.
        if context_uri.ends_with('/') {
            for welcome in &self.welcome_files {
                let candidate = format!("{context_uri}{welcome}");
                if let Some(m) = self.map.map_non_default(&candidate) {
                    let name = Arc::clone(m.value);
                    let servlet_path = m.servlet_path;
                    let path_info = m.path_info;
                    tracing::debug!(uri = %context_uri, welcome = %candidate, "welcome file match");
                    invocation.set_context_uri(candidate);
                    return self.chain_for(&name, invocation, servlet_path, path_info);
                }
            }
        }

        if let Some(m) = self.map.map(&context_uri) {
            let name = Arc::clone(m.value);
            let servlet_path = m.servlet_path;
            let path_info = m.path_info;
            return self.chain_for(&name, invocation, servlet_path, path_info);
        }

        if let Some(default) = &self.default_servlet {
            let name = Arc::clone(default);
            return self.chain_for(&name, invocation, context_uri, None);
        }

        tracing::debug!(uri = %context_uri, "no servlet mapping");
        invocation.set_servlet_path(context_uri.clone());
        Ok(Arc::new(StatusChain::not_found(&context_uri)))
    }
}
