//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the dispatch layer's runtime
//! knobs. Deployment topology (context paths, servlets, filters) is built
//! programmatically; this module only covers the tunables that operators
//! adjust without redeploying.
//!
//! ## Environment Variables
//!
//! - `GANTRY_CHAIN_CACHE_CAPACITY`: per-web-app invocation cache entries
//!   (default: 256)
//! - `GANTRY_URI_CACHE_CAPACITY`: container URI-to-app cache entries
//!   (default: 1024)
//! - `GANTRY_ACTIVE_WAIT_MS`: how long a request blocks waiting for a
//!   web-app to reach ACTIVE before a 503 chain is returned (default: 10000)
//! - `GANTRY_STOP_WAIT_MS`: how long `stop()` waits for in-flight requests
//!   to drain before proceeding with a warning (default: 10000)
//! - `GANTRY_ROLLOVER_WINDOW_MS`: grace period during which the previous
//!   version of a web-app keeps serving session-bound requests after a
//!   version rollover (default: 3600000, one hour)
//! - `GANTRY_DEV_MODE`: `1`/`true` enables detailed built-in error pages
//!   (stack detail and server banner) instead of the production page

use std::env;
use std::time::Duration;

/// Runtime configuration loaded from environment variables.
///
/// Load once at startup with [`RuntimeConfig::from_env()`] and hand to the
/// container/web-app builders.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Capacity of each web-app's filter-chain cache (default: 256 entries).
    pub chain_cache_capacity: usize,
    /// Capacity of the container's URI-to-app lookup cache (default: 1024).
    pub uri_cache_capacity: usize,
    /// Bounded wait for a web-app to become ACTIVE (default: 10 s).
    pub active_wait: Duration,
    /// Bounded wait for in-flight requests to drain on stop (default: 10 s).
    pub stop_wait: Duration,
    /// Old-version grace period after a rollover (default: 1 h).
    pub rollover_window: Duration,
    /// Development mode: detailed error pages with stack detail.
    pub dev_mode: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chain_cache_capacity: 256,
            uri_cache_capacity: 1024,
            active_wait: Duration::from_secs(10),
            stop_wait: Duration::from_secs(10),
            rollover_window: Duration::from_secs(3600),
            dev_mode: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            chain_cache_capacity: env_usize(
                "GANTRY_CHAIN_CACHE_CAPACITY",
                defaults.chain_cache_capacity,
            ),
            uri_cache_capacity: env_usize("GANTRY_URI_CACHE_CAPACITY", defaults.uri_cache_capacity),
            active_wait: env_millis("GANTRY_ACTIVE_WAIT_MS", defaults.active_wait),
            stop_wait: env_millis("GANTRY_STOP_WAIT_MS", defaults.stop_wait),
            rollover_window: env_millis("GANTRY_ROLLOVER_WINDOW_MS", defaults.rollover_window),
            dev_mode: env::var("GANTRY_DEV_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.dev_mode),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
