//! # Gantry
//!
//! **Gantry** is the dispatch layer of a servlet-style application server:
//! it resolves raw request URIs to deployed web applications, composes and
//! caches filter chains, and drives forward/include/error sub-dispatch with
//! a blocking thread-per-request model.
//!
//! ## Overview
//!
//! A request enters through the [`server::DispatchServer`], which decodes
//! the raw target and consults its invocation cache. A miss resolves through
//! the [`webapp::WebAppContainer`] by longest context-path prefix to a
//! deployed [`webapp::WebApp`], which maps the URI to a servlet, composes
//! the matching filters around it, and caches the result. The composed
//! chain then executes; servlets can re-enter the engine through
//! [`dispatch::RequestDispatcher`] for forwards and includes, and failures
//! resolve through [`error_pages::ErrorPageManager`].
//!
//! Caching is pull-based throughout: cached resolutions carry a
//! [`cache::Dependency`] and deployment changes only bump epoch counters;
//! the next lookup notices and rebuilds.
//!
//! ## Architecture
//!
//! - **[`invocation`]** - Raw-URI decoding and the resolved dispatch target
//! - **[`mapper`]** - URL pattern tables, servlet/filter mapping, rewrite
//! - **[`chain`]** - Filter-chain traits, terminal chains, per-app wrappers
//! - **[`cache`]** - Chain caching and dependency-based staleness
//! - **[`webapp`]** - Deployment: apps, controllers, container, versioning
//! - **[`dispatch`]** - Request/response model and sub-dispatch engine
//! - **[`error_pages`]** - Error-page resolution and rendering
//! - **[`server`]** - Process-wide entry point and invocation cache
//!
//! ## Concurrency
//!
//! Each request occupies one thread for its full lifetime. Shared state is
//! confined to the caches (mutex-guarded LRUs), the deployment maps
//! (lock-free reads), and per-app counters; a slow request never blocks
//! resolution for other threads beyond a cache lock.

pub mod cache;
pub mod chain;
pub mod dispatch;
pub mod error;
pub mod error_pages;
pub mod ids;
pub mod invocation;
pub mod mapper;
pub mod runtime_config;
pub mod server;
pub mod session;
pub mod txn;
pub mod webapp;

pub use cache::{Dependency, FilterChainEntry, InvocationCache};
pub use chain::{Filter, FilterChain, Servlet};
pub use dispatch::{DispatcherType, Request, RequestDispatcher, Response};
pub use error::{DispatchError, ServletError, MAX_DISPATCH_DEPTH};
pub use invocation::{Invocation, InvocationDecoder};
pub use runtime_config::RuntimeConfig;
pub use server::DispatchServer;
pub use webapp::{WebApp, WebAppBuilder, WebAppContainer, WebAppController};
