mod common;

use gantry::chain::{Filter, FilterChain, Servlet};
use gantry::dispatch::{DispatcherType, Request, Response};
use gantry::error::DispatchError;
use gantry::invocation::{Invocation, InvocationDecoder};
use gantry::mapper::{FilterMapper, FilterMapping, ServletMapper};
use http::Method;
use std::sync::Arc;

struct EchoServlet(&'static str);

impl Servlet for EchoServlet {
    fn service(&self, _req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        res.print(self.0);
        Ok(())
    }
}

struct TagFilter(&'static str);

impl Filter for TagFilter {
    fn do_filter(
        &self,
        req: &mut Request,
        res: &mut Response,
        next: &dyn FilterChain,
    ) -> Result<(), DispatchError> {
        res.print(self.0);
        res.print(" ");
        next.service(req, res)
    }
}

fn invocation_for(context_uri: &str) -> Invocation {
    let mut invocation = Invocation::new();
    InvocationDecoder::new()
        .split_query(&mut invocation, context_uri)
        .unwrap();
    invocation.set_context_uri(invocation.uri().to_string());
    invocation
}

fn run(chain: &Arc<dyn FilterChain>) -> (Result<(), DispatchError>, Response) {
    let mut req = Request::new(Method::GET, "/");
    let mut res = Response::new();
    let result = chain.service(&mut req, &mut res);
    (result, res)
}

#[test]
fn maps_uri_to_servlet_with_path_split() {
    common::init_tracing();
    let mut mapper = ServletMapper::new();
    mapper.add_servlet("items", Arc::new(EchoServlet("items")));
    mapper.add_mapping("/items/*", "items").unwrap();

    let mut invocation = invocation_for("/items/42/detail");
    let chain = mapper.map_servlet(&mut invocation).unwrap();

    assert_eq!(invocation.servlet_name().map(|n| n.as_ref()), Some("items"));
    assert_eq!(invocation.servlet_path(), "/items");
    assert_eq!(invocation.path_info(), Some("/42/detail"));

    let (result, res) = run(&chain);
    result.unwrap();
    assert_eq!(res.body_string(), "items");
}

#[test]
fn unmapped_uri_resolves_to_not_found_chain() {
    let mapper = ServletMapper::new();
    let mut invocation = invocation_for("/nothing/here");
    let chain = mapper.map_servlet(&mut invocation).unwrap();

    let (result, _res) = run(&chain);
    match result {
        Err(DispatchError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected 404 status chain, got {other:?}"),
    }
}

#[test]
fn default_servlet_catches_unmatched_uris() {
    let mut mapper = ServletMapper::new();
    mapper.add_servlet("files", Arc::new(EchoServlet("files")));
    mapper.add_mapping("/", "files").unwrap();

    let mut invocation = invocation_for("/any/path.txt");
    let chain = mapper.map_servlet(&mut invocation).unwrap();

    assert_eq!(invocation.servlet_path(), "/any/path.txt");
    assert_eq!(invocation.path_info(), None);
    let (result, res) = run(&chain);
    result.unwrap();
    assert_eq!(res.body_string(), "files");
}

#[test]
fn mapped_but_unregistered_servlet_is_a_config_error() {
    let mut mapper = ServletMapper::new();
    mapper.add_mapping("/ghost", "ghost").unwrap();

    let mut invocation = invocation_for("/ghost");
    match mapper.map_servlet(&mut invocation) {
        Err(DispatchError::Config(msg)) => assert!(msg.contains("ghost")),
        Err(e) => panic!("expected config error, got {e:?}"),
        Ok(_) => panic!("expected config error, got a chain"),
    }
}

#[test]
fn directory_request_probes_welcome_files() {
    let mut mapper = ServletMapper::new();
    mapper.add_servlet("index", Arc::new(EchoServlet("index")));
    mapper.add_mapping("/index.html", "index").unwrap();
    mapper.set_welcome_files(vec!["index.html".to_string()]);

    let mut invocation = invocation_for("/");
    let chain = mapper.map_servlet(&mut invocation).unwrap();

    assert_eq!(invocation.context_uri(), "/index.html");
    assert_eq!(invocation.servlet_path(), "/index.html");
    let (result, res) = run(&chain);
    result.unwrap();
    assert_eq!(res.body_string(), "index");
}

#[test]
fn welcome_probe_ignores_default_servlet() {
    let mut mapper = ServletMapper::new();
    mapper.add_servlet("files", Arc::new(EchoServlet("files")));
    mapper.add_mapping("/", "files").unwrap();
    mapper.set_welcome_files(vec!["index.html".to_string()]);

    // No explicit mapping for /index.html: the directory URI itself falls
    // through to the default servlet unchanged.
    let mut invocation = invocation_for("/docs/");
    mapper.map_servlet(&mut invocation).unwrap();
    assert_eq!(invocation.context_uri(), "/docs/");
    assert_eq!(invocation.servlet_path(), "/docs/");
}

#[test]
fn filters_compose_in_declaration_order_outermost_first() {
    let mut filters = FilterMapper::new();
    filters.add_mapping(
        FilterMapping::new("alpha", Arc::new(TagFilter("alpha")))
            .add_url_pattern("/*")
            .unwrap(),
    );
    filters.add_mapping(
        FilterMapping::new("beta", Arc::new(TagFilter("beta")))
            .add_url_pattern("/*")
            .unwrap(),
    );

    let mut mapper = ServletMapper::new();
    mapper.add_servlet("echo", Arc::new(EchoServlet("servlet")));
    mapper.add_mapping("/echo", "echo").unwrap();

    let mut invocation = invocation_for("/echo");
    let tail = mapper.map_servlet(&mut invocation).unwrap();
    let chain = filters.build_dispatch_chain(&mut invocation, DispatcherType::Request, tail);

    let (result, res) = run(&chain);
    result.unwrap();
    assert_eq!(res.body_string(), "alpha beta servlet");
}

#[test]
fn filters_match_by_servlet_name() {
    let mut filters = FilterMapper::new();
    filters.add_mapping(
        FilterMapping::new("audit", Arc::new(TagFilter("audit"))).add_servlet_name("echo"),
    );

    let mut mapper = ServletMapper::new();
    mapper.add_servlet("echo", Arc::new(EchoServlet("servlet")));
    mapper.add_servlet("other", Arc::new(EchoServlet("other")));
    mapper.add_mapping("/echo", "echo").unwrap();
    mapper.add_mapping("/other", "other").unwrap();

    let mut invocation = invocation_for("/echo");
    let tail = mapper.map_servlet(&mut invocation).unwrap();
    let chain = filters.build_dispatch_chain(&mut invocation, DispatcherType::Request, tail);
    let (_, res) = run(&chain);
    assert_eq!(res.body_string(), "audit servlet");

    let mut invocation = invocation_for("/other");
    let tail = mapper.map_servlet(&mut invocation).unwrap();
    let chain = filters.build_dispatch_chain(&mut invocation, DispatcherType::Request, tail);
    let (_, res) = run(&chain);
    assert_eq!(res.body_string(), "other");
}

#[test]
fn filters_scope_to_their_dispatcher_type() {
    let mut filters = FilterMapper::new();
    filters.add_mapping(
        FilterMapping::new("fwd-only", Arc::new(TagFilter("fwd")))
            .add_url_pattern("/*")
            .unwrap()
            .set_dispatcher_types(vec![DispatcherType::Forward]),
    );

    let mut mapper = ServletMapper::new();
    mapper.add_servlet("echo", Arc::new(EchoServlet("servlet")));
    mapper.add_mapping("/echo", "echo").unwrap();

    let mut invocation = invocation_for("/echo");
    let tail = mapper.map_servlet(&mut invocation).unwrap();

    let chain =
        filters.build_dispatch_chain(&mut invocation, DispatcherType::Request, Arc::clone(&tail));
    let (_, res) = run(&chain);
    assert_eq!(res.body_string(), "servlet");

    let chain = filters.build_dispatch_chain(&mut invocation, DispatcherType::Forward, tail);
    let (_, res) = run(&chain);
    assert_eq!(res.body_string(), "fwd servlet");
}
