//! Executable request chains: traits, terminal chains, and the per-web-app
//! wrapper chains applied around every cached invocation.

mod core;
mod webapp_chain;

pub use self::core::{
    ExceptionChain, Filter, FilterChain, FilterLink, Servlet, ServletChain, StatusChain,
};
pub use self::webapp_chain::{
    AccessLog, AccessLogChain, AppScope, CacheChainProvider, RequestListener, StatisticsChain,
    TracingAccessLog, VersionSwitchChain, WebAppChain,
};
