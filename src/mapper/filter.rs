//! Filter registration and chain composition.
//!
//! Filters match by URL pattern or by target servlet name, scoped to the
//! dispatcher types they were registered for. Matching filters compose
//! around the terminal chain in declaration order, the first-declared filter
//! outermost.

use super::url_map::UrlPattern;
use crate::chain::{Filter, FilterChain, FilterLink};
use crate::dispatch::DispatcherType;
use crate::error::DispatchError;
use crate::invocation::Invocation;
use std::sync::Arc;

/// One filter registration: the filter, its match criteria, and the
/// dispatcher types it applies to.
pub struct FilterMapping {
    name: Arc<str>,
    filter: Arc<dyn Filter>,
    patterns: Vec<UrlPattern>,
    servlet_names: Vec<Arc<str>>,
    dispatcher_types: Vec<DispatcherType>,
}

impl FilterMapping {
    pub fn new(name: &str, filter: Arc<dyn Filter>) -> Self {
        Self {
            name: Arc::from(name),
            filter,
            patterns: Vec::new(),
            servlet_names: Vec::new(),
            dispatcher_types: vec![DispatcherType::Request],
        }
    }

    pub fn add_url_pattern(mut self, pattern: &str) -> Result<Self, DispatchError> {
        self.patterns.push(UrlPattern::parse(pattern)?);
        Ok(self)
    }

    pub fn add_servlet_name(mut self, servlet_name: &str) -> Self {
        self.servlet_names.push(Arc::from(servlet_name));
        self
    }

    pub fn set_dispatcher_types(mut self, types: Vec<DispatcherType>) -> Self {
        self.dispatcher_types = types;
        self
    }

    fn applies_to(&self, dispatcher_type: DispatcherType) -> bool {
        self.dispatcher_types.contains(&dispatcher_type)
    }

    fn matches(&self, invocation: &Invocation) -> bool {
        let context_uri = invocation.context_uri();
        for pattern in &self.patterns {
            let matched = match pattern {
                UrlPattern::Exact(path) => context_uri == path,
                UrlPattern::Prefix(prefix) => {
                    context_uri == prefix.as_str()
                        || (context_uri.len() > prefix.len()
                            && context_uri.starts_with(prefix.as_str())
                            && context_uri.as_bytes()[prefix.len()] == b'/')
                }
                UrlPattern::Suffix(suffix) => context_uri.ends_with(suffix.as_str()),
                UrlPattern::Default => true,
                UrlPattern::Regex { regex, .. } => regex.is_match(context_uri),
            };
            if matched {
                return true;
            }
        }
        if let Some(name) = invocation.servlet_name() {
            if self.servlet_names.iter().any(|n| n == name) {
                return true;
            }
        }
        false
    }
}

/// Composes the filter pipeline of one web app around terminal chains.
pub struct FilterMapper {
    mappings: Vec<FilterMapping>,
}

impl Default for FilterMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterMapper {
    pub fn new() -> Self {
        Self {
            mappings: Vec::new(),
        }
    }

    pub fn add_mapping(&mut self, mapping: FilterMapping) {
        self.mappings.push(mapping);
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Wrap the terminal chain with every filter matching this invocation
    /// for the given dispatcher type. Folding in reverse declaration order
    /// leaves the first-declared filter outermost.
    pub fn build_dispatch_chain(
        &self,
        invocation: &mut Invocation,
        dispatcher_type: DispatcherType,
        tail: Arc<dyn FilterChain>,
    ) -> Arc<dyn FilterChain> {
        let mut chain = tail;
        for mapping in self.mappings.iter().rev() {
            if mapping.applies_to(dispatcher_type) && mapping.matches(invocation) {
                tracing::trace!(
                    filter = %mapping.name,
                    uri = %invocation.context_uri(),
                    dispatcher = %dispatcher_type,
                    "composing filter"
                );
                chain = Arc::new(FilterLink::new(
                    Arc::clone(&mapping.name),
                    Arc::clone(&mapping.filter),
                    chain,
                ));
            }
        }
        invocation.set_chain(Arc::clone(&chain));
        chain
    }
}
