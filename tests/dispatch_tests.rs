mod common;

use gantry::chain::Servlet;
use gantry::dispatch::attributes::{FORWARD_REQUEST_URI, FORWARD_SERVLET_PATH, INCLUDE_SERVLET_PATH};
use gantry::dispatch::{DispatcherType, Request, Response};
use gantry::error::{DispatchError, ServletError};
use gantry::invocation::{Invocation, InvocationDecoder};
use gantry::runtime_config::RuntimeConfig;
use gantry::webapp::{WebApp, WebAppBuilder};
use http::Method;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Slot giving servlets access to their own web app after build.
#[derive(Default)]
struct AppSlot(Mutex<Option<Arc<WebApp>>>);

impl AppSlot {
    fn fill(&self, app: &Arc<WebApp>) {
        *self.0.lock().unwrap() = Some(Arc::clone(app));
    }

    fn get(&self) -> Arc<WebApp> {
        self.0.lock().unwrap().clone().unwrap()
    }
}

struct ForwardingServlet {
    target: &'static str,
    app: Arc<AppSlot>,
}

impl Servlet for ForwardingServlet {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        res.print("discarded-by-forward ");
        let dispatcher = self.app.get().get_request_dispatcher(self.target)?;
        dispatcher.forward(req, res)?;
        res.print("after-forward");
        Ok(())
    }
}

struct IncludingServlet {
    target: &'static str,
    app: Arc<AppSlot>,
}

impl Servlet for IncludingServlet {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        res.print("a[");
        let dispatcher = self.app.get().get_request_dispatcher(self.target)?;
        dispatcher.include(req, res)?;
        res.print("]b");
        Ok(())
    }
}

/// Writes the request view it observes, for assertions on path shadowing
/// and dispatch attributes.
struct ProbeServlet;

impl Servlet for ProbeServlet {
    fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
        let fwd_uri = req
            .get_attribute(FORWARD_REQUEST_URI)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let fwd_sp = req
            .get_attribute(FORWARD_SERVLET_PATH)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        res.print(&format!(
            "uri={};sp={};q={};fwd_uri={fwd_uri};fwd_sp={fwd_sp}",
            req.uri(),
            req.servlet_path(),
            req.query_string().unwrap_or("")
        ));
        Ok(())
    }
}

fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.active_wait = Duration::from_millis(50);
    config.stop_wait = Duration::from_millis(50);
    config
}

fn serve(app: &Arc<WebApp>, raw_uri: &str) -> (Result<(), DispatchError>, Request, Response) {
    let mut invocation = Invocation::new();
    InvocationDecoder::new()
        .split_query(&mut invocation, raw_uri)
        .unwrap();
    app.build_invocation(&mut invocation);

    let mut req = Request::new(Method::GET, raw_uri);
    req.set_top_frame(invocation.to_frame(DispatcherType::Request));
    let mut res = Response::new();
    let result = invocation.service(&mut req, &mut res);
    (result, req, res)
}

#[test]
fn forward_swaps_paths_discards_output_and_sets_attributes() {
    common::init_tracing();
    let slot = Arc::new(AppSlot::default());
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "src",
        Arc::new(ForwardingServlet {
            target: "/dest?x=1",
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet("dest", Arc::new(ProbeServlet));
    builder.servlet_mapper().add_mapping("/src", "src").unwrap();
    builder.servlet_mapper().add_mapping("/dest", "dest").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, req, res) = serve(&app, "/app/src");
    result.unwrap();

    assert_eq!(
        res.body_string(),
        "uri=/app/dest;sp=/dest;q=x=1;fwd_uri=/app/src;fwd_sp=/src"
    );
    // Forward closed the response: the trailing write was dropped.
    assert!(res.is_closed());
    // Caller view fully restored.
    assert_eq!(req.frame_count(), 1);
    assert_eq!(req.servlet_path(), "/src");
    assert!(req.get_attribute(FORWARD_REQUEST_URI).is_none());
    assert_eq!(res.policy_depth(), 0);
}

#[test]
fn chained_forwards_keep_original_forward_attributes() {
    let slot = Arc::new(AppSlot::default());
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "a",
        Arc::new(ForwardingServlet {
            target: "/b",
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet(
        "b",
        Arc::new(ForwardingServlet {
            target: "/c",
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet("c", Arc::new(ProbeServlet));
    builder.servlet_mapper().add_mapping("/a", "a").unwrap();
    builder.servlet_mapper().add_mapping("/b", "b").unwrap();
    builder.servlet_mapper().add_mapping("/c", "c").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, _req, res) = serve(&app, "/app/a");
    result.unwrap();
    // The attributes still describe the original request, not /b.
    assert_eq!(
        res.body_string(),
        "uri=/app/c;sp=/c;q=;fwd_uri=/app/a;fwd_sp=/a"
    );
}

#[test]
fn include_keeps_caller_paths_and_suppresses_header_mutation() {
    struct FragmentServlet;
    impl Servlet for FragmentServlet {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            res.set_status(404);
            res.set_header("X-Frag", "1");
            let include_sp = req
                .get_attribute(INCLUDE_SERVLET_PATH)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            res.print(&format!("frag(sp={},inc_sp={include_sp})", req.servlet_path()));
            Ok(())
        }
    }

    let slot = Arc::new(AppSlot::default());
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "page",
        Arc::new(IncludingServlet {
            target: "/frag",
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet("frag", Arc::new(FragmentServlet));
    builder.servlet_mapper().add_mapping("/page", "page").unwrap();
    builder.servlet_mapper().add_mapping("/frag", "frag").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, req, res) = serve(&app, "/app/page");
    result.unwrap();

    // The fragment's path accessors still see the including request; its own
    // target is only visible through the include attributes.
    assert_eq!(res.body_string(), "a[frag(sp=/page,inc_sp=/frag)]b");
    assert_eq!(res.status(), 200);
    assert_eq!(res.get_header("X-Frag"), None);
    assert_eq!(req.frame_count(), 1);
    assert_eq!(res.policy_depth(), 0);
}

#[test]
fn dispatch_depth_trips_on_the_sixty_fifth_nested_dispatch() {
    struct RecursiveServlet {
        app: Arc<AppSlot>,
        calls: Arc<AtomicUsize>,
    }
    impl Servlet for RecursiveServlet {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let dispatcher = self.app.get().get_request_dispatcher("/loop")?;
            dispatcher.forward(req, res)
        }
    }

    let slot = Arc::new(AppSlot::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "loop",
        Arc::new(RecursiveServlet {
            app: Arc::clone(&slot),
            calls: Arc::clone(&calls),
        }),
    );
    builder.servlet_mapper().add_mapping("/loop", "loop").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, req, res) = serve(&app, "/app/loop");
    match result {
        Err(DispatchError::DepthExceeded { depth, .. }) => assert_eq!(depth, 65),
        other => panic!("expected depth exceeded, got {other:?}"),
    }
    // Depth 0 through 64 each ran once before the 65th push was refused.
    assert_eq!(calls.load(Ordering::SeqCst), 65);
    assert_eq!(req.frame_count(), 1);
    assert_eq!(res.policy_depth(), 0);
}

#[test]
fn failed_forward_restores_the_caller_view() {
    struct FailingServlet;
    impl Servlet for FailingServlet {
        fn service(&self, _req: &mut Request, _res: &mut Response) -> Result<(), DispatchError> {
            Err(ServletError::new("example.BoomError", "boom").into())
        }
    }

    struct CheckingServlet {
        app: Arc<AppSlot>,
        restored: Arc<AtomicBool>,
    }
    impl Servlet for CheckingServlet {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            let frames_before = req.frame_count();
            let policies_before = res.policy_depth();
            let dispatcher = self.app.get().get_request_dispatcher("/boom")?;
            let result = dispatcher.forward(req, res);
            assert!(result.is_err());
            let restored = req.frame_count() == frames_before
                && res.policy_depth() == policies_before
                && req.servlet_path() == "/check";
            self.restored.store(restored, Ordering::SeqCst);
            Ok(())
        }
    }

    let slot = Arc::new(AppSlot::default());
    let restored = Arc::new(AtomicBool::new(false));
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "check",
        Arc::new(CheckingServlet {
            app: Arc::clone(&slot),
            restored: Arc::clone(&restored),
        }),
    );
    builder.servlet_mapper().add_servlet("boom", Arc::new(FailingServlet));
    builder.servlet_mapper().add_mapping("/check", "check").unwrap();
    builder.servlet_mapper().add_mapping("/boom", "boom").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, _req, _res) = serve(&app, "/app/check");
    result.unwrap();
    assert!(restored.load(Ordering::SeqCst));
}

#[test]
fn dispatch_reenters_under_the_request_type() {
    struct ReenteringServlet {
        app: Arc<AppSlot>,
    }
    impl Servlet for ReenteringServlet {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            let dispatcher = self.app.get().get_request_dispatcher("/dest")?;
            dispatcher.dispatch(req, res)?;
            res.print(" after");
            Ok(())
        }
    }

    struct TypeProbe;
    impl Servlet for TypeProbe {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            res.print(&format!("type={}", req.dispatcher_type()));
            Ok(())
        }
    }

    let slot = Arc::new(AppSlot::default());
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "re",
        Arc::new(ReenteringServlet {
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet("dest", Arc::new(TypeProbe));
    builder.servlet_mapper().add_mapping("/re", "re").unwrap();
    builder.servlet_mapper().add_mapping("/dest", "dest").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, _req, res) = serve(&app, "/app/re");
    result.unwrap();
    // The target sees a plain request, and unlike a forward the caller can
    // keep writing afterwards.
    assert_eq!(res.body_string(), "type=REQUEST after");
    assert!(!res.is_closed());
}

#[test]
fn forward_after_commit_is_illegal_state() {
    struct CommittingServlet {
        app: Arc<AppSlot>,
    }
    impl Servlet for CommittingServlet {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            res.print("early");
            res.flush();
            let dispatcher = self.app.get().get_request_dispatcher("/dest")?;
            dispatcher.forward(req, res)
        }
    }

    let slot = Arc::new(AppSlot::default());
    let mut builder = WebAppBuilder::new("/app").with_config(test_config());
    builder.servlet_mapper().add_servlet(
        "commit",
        Arc::new(CommittingServlet {
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet("dest", Arc::new(ProbeServlet));
    builder.servlet_mapper().add_mapping("/commit", "commit").unwrap();
    builder.servlet_mapper().add_mapping("/dest", "dest").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, _req, res) = serve(&app, "/app/commit");
    match result {
        Err(DispatchError::IllegalState(_)) => {}
        other => panic!("expected illegal state, got {other:?}"),
    }
    assert!(res.has_error());
}

#[test]
fn forward_after_commit_allowed_when_opted_in() {
    struct CommittingServlet {
        app: Arc<AppSlot>,
    }
    impl Servlet for CommittingServlet {
        fn service(&self, req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            res.print("early ");
            res.flush();
            let dispatcher = self.app.get().get_request_dispatcher("/dest")?;
            dispatcher.forward(req, res)
        }
    }

    struct DestServlet;
    impl Servlet for DestServlet {
        fn service(&self, _req: &mut Request, res: &mut Response) -> Result<(), DispatchError> {
            res.print("late");
            Ok(())
        }
    }

    let slot = Arc::new(AppSlot::default());
    let mut builder = WebAppBuilder::new("/app")
        .with_config(test_config())
        .allow_forward_after_flush(true);
    builder.servlet_mapper().add_servlet(
        "commit",
        Arc::new(CommittingServlet {
            app: Arc::clone(&slot),
        }),
    );
    builder.servlet_mapper().add_servlet("dest", Arc::new(DestServlet));
    builder.servlet_mapper().add_mapping("/commit", "commit").unwrap();
    builder.servlet_mapper().add_mapping("/dest", "dest").unwrap();
    let app = builder.build();
    slot.fill(&app);
    app.start();

    let (result, _req, res) = serve(&app, "/app/commit");
    result.unwrap();
    assert_eq!(res.body_string(), "early late");
    assert!(!res.is_closed());
}
