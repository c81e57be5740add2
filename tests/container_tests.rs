mod common;

use gantry::chain::Servlet;
use gantry::dispatch::{Request, Response};
use gantry::error::DispatchError;
use gantry::runtime_config::RuntimeConfig;
use gantry::server::DispatchServer;
use gantry::webapp::{WebAppBuilder, WebAppContainer, WebAppController};
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

fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.active_wait = Duration::from_millis(50);
    config.stop_wait = Duration::from_millis(50);
    config
}

fn catch_all_app(context_path: &str, tag: &'static str) -> Arc<gantry::webapp::WebApp> {
    let mut builder = WebAppBuilder::new(context_path).with_config(test_config());
    builder
        .servlet_mapper()
        .add_servlet("echo", Arc::new(EchoServlet(tag)));
    builder.servlet_mapper().add_mapping("/*", "echo").unwrap();
    builder.build()
}

fn serve(server: &DispatchServer, raw_uri: &str) -> Response {
    let mut req = Request::new(Method::GET, raw_uri);
    let mut res = Response::new();
    server.service(raw_uri, &mut req, &mut res).unwrap();
    res
}

fn three_app_setup() -> (Arc<WebAppContainer>, Arc<DispatchServer>) {
    let config = test_config();
    let container = WebAppContainer::new(&config);
    container.deploy(WebAppController::with_instance("", catch_all_app("", "root")));
    container.deploy(WebAppController::with_instance(
        "/app",
        catch_all_app("/app", "app"),
    ));
    container.deploy(WebAppController::with_instance(
        "/app/admin",
        catch_all_app("/app/admin", "admin"),
    ));
    let server = DispatchServer::new(&config, Arc::clone(&container));
    (container, server)
}

#[test]
fn longest_context_prefix_wins() {
    common::init_tracing();
    let (_container, server) = three_app_setup();

    assert_eq!(serve(&server, "/app/admin/users").body_string(), "admin");
    assert_eq!(serve(&server, "/app/hello").body_string(), "app");
    assert_eq!(serve(&server, "/elsewhere").body_string(), "root");
    assert_eq!(serve(&server, "/application").body_string(), "root");
}

#[test]
fn unmatched_uri_renders_not_found_without_root_app() {
    let config = test_config();
    let container = WebAppContainer::new(&config);
    container.deploy(WebAppController::with_instance(
        "/app",
        catch_all_app("/app", "app"),
    ));
    let server = DispatchServer::new(&config, Arc::clone(&container));

    let res = serve(&server, "/nowhere");
    assert_eq!(res.status(), 404);
}

#[test]
fn invocation_cache_reuses_until_deployments_change() {
    let (container, server) = three_app_setup();

    let first = server.build_invocation("/app/hello").unwrap();
    let second = server.build_invocation("/app/hello").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    container.undeploy("/app");
    let third = server.build_invocation("/app/hello").unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    // The controller at /app is gone; the root app takes over.
    assert_eq!(serve(&server, "/app/hello").body_string(), "root");
}

#[test]
fn app_cache_clear_invalidates_server_cached_invocation() {
    let (container, server) = three_app_setup();

    let first = server.build_invocation("/app/hello").unwrap();
    let app = container.find_web_app_by_uri("/app/hello").unwrap();
    app.clear_cache();

    assert!(first.is_modified());
    let second = server.build_invocation("/app/hello").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn escaping_path_is_rejected_as_bad_request() {
    let (_container, server) = three_app_setup();

    match server.build_invocation("/../etc/passwd") {
        Err(DispatchError::BadRequest(_)) => {}
        other => panic!("expected bad request, got {other:?}"),
    }

    let res = serve(&server, "/%2e%2e/etc/passwd");
    assert_eq!(res.status(), 400);
}

#[test]
fn dot_segments_resolve_before_context_lookup() {
    let (_container, server) = three_app_setup();

    // Normalizes to /etc/passwd, which the root app serves; it never reaches
    // /app even though the raw path starts there.
    assert_eq!(serve(&server, "/app/../etc/passwd").body_string(), "root");
    assert_eq!(serve(&server, "/app/./hello").body_string(), "app");
}

#[test]
fn distinct_query_strings_cache_separately() {
    let (_container, server) = three_app_setup();

    let a = server.build_invocation("/app/x?a=1").unwrap();
    let b = server.build_invocation("/app/x?a=2").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.query_string(), Some("a=1"));
    assert_eq!(b.query_string(), Some("a=2"));
}

#[test]
fn undeployed_controller_slot_is_unavailable() {
    let config = test_config();
    let container = WebAppContainer::new(&config);
    // Controller registered without a live instance.
    container.deploy(WebAppController::new("/app"));
    let server = DispatchServer::new(&config, Arc::clone(&container));

    let res = serve(&server, "/app/hello");
    assert_eq!(res.status(), 503);
}
