//! URL-pattern matching with servlet-style precedence.
//!
//! Supported pattern forms are exact paths, `/prefix/*`, `*.suffix`, the
//! default pattern `/`, and raw regular expressions. When several patterns
//! match one URI the winner is the most specific: exact beats any prefix,
//! longer prefixes beat shorter ones, any prefix beats a suffix, and the
//! default pattern only matches when nothing else does.

use crate::error::DispatchError;
use regex::Regex;

/// Parsed URL pattern.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Exact(String),
    /// `/prefix/*`, stored without the trailing `/*`.
    Prefix(String),
    /// `*.ext`, stored as the `.ext` tail.
    Suffix(String),
    /// The `/` pattern: matches everything at the lowest precedence.
    Default,
    /// Regex pattern with an explicit specificity weight.
    Regex { regex: Regex, weight: usize },
}

impl UrlPattern {
    pub fn parse(pattern: &str) -> Result<Self, DispatchError> {
        if pattern == "/" {
            Ok(UrlPattern::Default)
        } else if let Some(prefix) = pattern.strip_suffix("/*") {
            if prefix.is_empty() {
                // "/*" is a zero-length prefix matching every path.
                Ok(UrlPattern::Prefix(String::new()))
            } else if prefix.starts_with('/') {
                Ok(UrlPattern::Prefix(prefix.to_string()))
            } else {
                Err(DispatchError::Config(format!(
                    "url pattern '{pattern}' must start with '/'"
                )))
            }
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            if suffix.starts_with('.') && !suffix.contains('/') {
                Ok(UrlPattern::Suffix(suffix.to_string()))
            } else {
                Err(DispatchError::Config(format!(
                    "suffix pattern '{pattern}' must look like '*.ext'"
                )))
            }
        } else if pattern.starts_with('/') {
            Ok(UrlPattern::Exact(pattern.to_string()))
        } else {
            Err(DispatchError::Config(format!(
                "url pattern '{pattern}' must start with '/' or '*.'"
            )))
        }
    }

    /// Match the URI, returning the specificity score and the
    /// servlet-path/path-info split. Higher scores win.
    fn matches(&self, uri: &str) -> Option<(i64, String, Option<String>)> {
        match self {
            UrlPattern::Exact(path) => {
                (uri == path).then(|| (i64::MAX, uri.to_string(), None))
            }
            UrlPattern::Prefix(prefix) => {
                let matched = uri == prefix.as_str()
                    || (uri.len() > prefix.len() && uri.starts_with(prefix.as_str())
                        && uri.as_bytes()[prefix.len()] == b'/');
                if !matched {
                    return None;
                }
                let rest = &uri[prefix.len()..];
                let path_info = (!rest.is_empty()).then(|| rest.to_string());
                // Score by prefix length so /admin/db/* beats /admin/*; +2
                // keeps even the empty prefix above suffix patterns.
                Some((prefix.len() as i64 + 2, prefix.clone(), path_info))
            }
            UrlPattern::Suffix(suffix) => {
                (uri.ends_with(suffix.as_str())).then(|| (1, uri.to_string(), None))
            }
            UrlPattern::Default => Some((0, uri.to_string(), None)),
            UrlPattern::Regex { regex, weight } => regex
                .is_match(uri)
                .then(|| (*weight as i64 + 2, uri.to_string(), None)),
        }
    }
}

/// Winning match for a URI.
pub struct UrlMatch<'a, T> {
    pub value: &'a T,
    pub pattern: &'a UrlPattern,
    pub servlet_path: String,
    pub path_info: Option<String>,
}

/// Ordered pattern table mapping URIs to values.
pub struct UrlMap<T> {
    entries: Vec<(UrlPattern, T)>,
}

impl<T> Default for UrlMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UrlMap<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add_map(&mut self, pattern: &str, value: T) -> Result<(), DispatchError> {
        let pattern = UrlPattern::parse(pattern)?;
        self.entries.push((pattern, value));
        Ok(())
    }

    pub fn add_regexp(&mut self, pattern: &str, weight: usize, value: T) -> Result<(), DispatchError> {
        let regex = Regex::new(pattern)
            .map_err(|e| DispatchError::Config(format!("bad url regexp '{pattern}': {e}")))?;
        self.entries.push((UrlPattern::Regex { regex, weight }, value));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best match by specificity. Ties go to the earliest-declared pattern.
    pub fn map(&self, uri: &str) -> Option<UrlMatch<'_, T>> {
        let mut best: Option<(i64, UrlMatch<'_, T>)> = None;
        for (pattern, value) in &self.entries {
            if let Some((score, servlet_path, path_info)) = pattern.matches(uri) {
                let better = best.as_ref().map(|(s, _)| score > *s).unwrap_or(true);
                if better {
                    best = Some((
                        score,
                        UrlMatch {
                            value,
                            pattern,
                            servlet_path,
                            path_info,
                        },
                    ));
                }
            }
        }
        best.map(|(_, m)| m)
    }

    /// Best non-default match; used by welcome-file probing, where falling
    /// through to the default servlet means the probe failed.
    pub fn map_non_default(&self, uri: &str) -> Option<UrlMatch<'_, T>> {
        self.map(uri)
            .filter(|m| !matches!(m.pattern, UrlPattern::Default))
    }
}
