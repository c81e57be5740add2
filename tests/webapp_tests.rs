mod common;

use gantry::chain::{FilterChain, Servlet};
use gantry::dispatch::{DispatcherType, Request, Response};
use gantry::error::DispatchError;
use gantry::invocation::{Invocation, InvocationDecoder};
use gantry::mapper::RewriteDispatch;
use gantry::runtime_config::RuntimeConfig;
use gantry::webapp::WebAppBuilder;
use http::Method;
use std::sync::Arc;
use std::time::Duration;

struct EchoServlet(&'static str);

impl Servlet for EchoServlet {
    fn service(&self, _req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        res.print(self.0);
        Ok(())
    }
}

struct PassthroughRewrite;

impl RewriteDispatch for PassthroughRewrite {
    fn map(
        &self,
        _uri: &str,
        _query: Option<&str>,
        tail: Arc<dyn FilterChain>,
    ) -> Arc<dyn FilterChain> {
        tail
    }
}

fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.active_wait = Duration::from_millis(50);
    config.stop_wait = Duration::from_millis(50);
    config
}

fn app_builder(context_path: &str) -> WebAppBuilder {
    let mut builder = WebAppBuilder::new(context_path).with_config(test_config());
    builder
        .servlet_mapper()
        .add_servlet("hello", Arc::new(EchoServlet("hello")));
    builder.servlet_mapper().add_mapping("/hello", "hello").unwrap();
    builder
}

fn resolve(app: &Arc<gantry::webapp::WebApp>, raw_uri: &str) -> Invocation {
    let mut invocation = Invocation::new();
    InvocationDecoder::new()
        .split_query(&mut invocation, raw_uri)
        .unwrap();
    app.build_invocation(&mut invocation);
    invocation
}

fn execute(invocation: &Invocation) -> (Result<(), DispatchError>, Response) {
    let mut req = Request::new(Method::GET, invocation.raw_uri());
    req.set_top_frame(invocation.to_frame(DispatcherType::Request));
    let mut res = Response::new();
    let result = invocation.service(&mut req, &mut res);
    (result, res)
}

#[test]
fn resolves_and_serves_a_mapped_servlet() {
    common::init_tracing();
    let app = app_builder("/app").build();
    app.start();

    let invocation = resolve(&app, "/app/hello");
    assert_eq!(invocation.context_path(), "/app");
    assert_eq!(invocation.context_uri(), "/hello");
    assert_eq!(invocation.servlet_name().map(|n| n.as_ref()), Some("hello"));

    let (result, res) = execute(&invocation);
    result.unwrap();
    assert_eq!(res.body_string(), "hello");
}

#[test]
fn repeated_resolution_reuses_the_cached_chain() {
    let app = app_builder("/app").build();
    app.start();

    resolve(&app, "/app/hello");
    assert_eq!(app.chain_cache_len(), 1);
    resolve(&app, "/app/hello");
    assert_eq!(app.chain_cache_len(), 1);
}

#[test]
fn clear_cache_marks_cached_invocations_stale() {
    let app = app_builder("/app").build();
    app.start();

    let invocation = resolve(&app, "/app/hello");
    assert!(!invocation.is_modified());

    app.clear_cache();
    assert!(invocation.is_modified());
    assert_eq!(app.chain_cache_len(), 0);
}

#[test]
fn cache_defeating_query_marker_bypasses_the_cache() {
    let app = app_builder("/app").build();
    app.start();

    resolve(&app, "/app/hello?jsp_precompile=true");
    assert_eq!(app.chain_cache_len(), 0);

    resolve(&app, "/app/hello?other=1");
    assert_eq!(app.chain_cache_len(), 1);
}

#[test]
fn custom_markers_replace_the_default() {
    let app = app_builder("/app")
        .cache_defeating_markers(vec!["nocache".to_string()])
        .build();
    app.start();

    resolve(&app, "/app/hello?jsp_precompile=true");
    assert_eq!(app.chain_cache_len(), 1);

    resolve(&app, "/app/hello?nocache=1");
    assert_eq!(app.chain_cache_len(), 1);
}

#[test]
fn rewrite_disables_chain_caching() {
    let app = app_builder("/app")
        .rewrite(Arc::new(PassthroughRewrite))
        .build();
    app.start();

    let invocation = resolve(&app, "/app/hello");
    let (result, res) = execute(&invocation);
    result.unwrap();
    assert_eq!(res.body_string(), "hello");
    assert_eq!(app.chain_cache_len(), 0);
}

#[test]
fn config_error_reproduces_on_every_request() {
    let app = app_builder("/app")
        .config_error(DispatchError::Config("web.xml is broken".to_string()))
        .build();
    app.start();

    let invocation = resolve(&app, "/app/hello");
    // Error resolutions are never cached as valid.
    assert!(invocation.is_modified());

    let (result, _res) = execute(&invocation);
    match result {
        Err(DispatchError::Config(msg)) => assert!(msg.contains("web.xml")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn stopped_app_resolves_to_unavailable() {
    let app = app_builder("/app").build();
    app.start();
    app.stop();

    let invocation = resolve(&app, "/app/hello");
    let (result, res) = execute(&invocation);
    match result {
        Err(DispatchError::Status { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected 503, got {other:?}"),
    }
    assert_eq!(res.get_header("Retry-After"), Some("1"));
}

#[test]
fn statistics_record_requests_and_failures() {
    let mut builder = app_builder("/app").statistics_enabled(true);
    builder
        .servlet_mapper()
        .add_mapping("/missing-servlet", "ghost")
        .unwrap();
    let app = builder.build();
    app.start();

    let ok = resolve(&app, "/app/hello");
    execute(&ok).0.unwrap();

    let invocation = resolve(&app, "/app/nope");
    let _ = execute(&invocation);

    assert_eq!(app.request_count(), 2);
    assert_eq!(app.error_count(), 1);
    assert_eq!(app.active_request_count(), 0);
}

struct PanickingServlet;

impl Servlet for PanickingServlet {
    fn service(&self, _req: &mut Request, _res: &mut Response) -> Result<(), DispatchError> {
        panic!("servlet blew up");
    }
}

#[test]
fn panicking_servlet_still_releases_the_active_count() {
    let mut builder = app_builder("/app");
    builder
        .servlet_mapper()
        .add_servlet("boom", Arc::new(PanickingServlet));
    builder.servlet_mapper().add_mapping("/boom", "boom").unwrap();
    let app = builder.build();
    app.start();

    let invocation = resolve(&app, "/app/boom");
    let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut req = Request::new(Method::GET, invocation.raw_uri());
        req.set_top_frame(invocation.to_frame(DispatcherType::Request));
        let mut res = Response::new();
        let _ = invocation.service(&mut req, &mut res);
    }));

    assert!(unwound.is_err());
    assert_eq!(app.active_request_count(), 0);
    // A wedged count would make the drain below time out instead of return.
    app.stop();
}
