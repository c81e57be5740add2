//! Controller owning the live instance of one web app.
//!
//! The controller outlives deployments: a redeploy builds a fresh
//! [`WebApp`], swaps it in atomically, and retires the old instance after a
//! drain. During a versioned rollover the controller also remembers the
//! previous instance with an expiry so session-affine routing can reach it.

use crate::webapp::container::WebAppContainer;
use crate::webapp::WebApp;
use arc_swap::ArcSwapOption;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

/// The previous instance retained through a rollover grace window.
#[derive(Clone)]
pub struct RetiredInstance {
    pub web_app: Arc<WebApp>,
    pub expires_at: Instant,
}

pub struct WebAppController {
    context_path: String,
    instance: ArcSwapOption<WebApp>,
    retired: Mutex<Option<RetiredInstance>>,
    parent: Mutex<Weak<WebAppContainer>>,
}

impl WebAppController {
    pub fn new(context_path: &str) -> Arc<Self> {
        Arc::new(Self {
            context_path: context_path.to_string(),
            instance: ArcSwapOption::empty(),
            retired: Mutex::new(None),
            parent: Mutex::new(Weak::new()),
        })
    }

    pub fn with_instance(context_path: &str, web_app: Arc<WebApp>) -> Arc<Self> {
        let controller = Self::new(context_path);
        controller.deploy(web_app);
        controller
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    pub(crate) fn set_parent(&self, container: &Arc<WebAppContainer>) {
        if let Ok(mut parent) = self.parent.lock() {
            *parent = Arc::downgrade(container);
        }
        if let Some(app) = self.instance() {
            app.set_parent(container);
        }
    }

    pub fn instance(&self) -> Option<Arc<WebApp>> {
        self.instance.load_full()
    }

    /// Swap in a new instance, starting it and retiring any previous one.
    /// The old instance drains gracefully on a background thread so the
    /// deploying caller is not blocked by in-flight requests.
    pub fn deploy(&self, web_app: Arc<WebApp>) {
        if let Ok(parent) = self.parent.lock() {
            if let Some(container) = parent.upgrade() {
                web_app.set_parent(&container);
            }
        }
        web_app.start();
        let old = self.instance.swap(Some(Arc::clone(&web_app)));
        tracing::info!(
            context_path = %self.context_path,
            version = ?web_app.version(),
            redeploy = old.is_some(),
            "web app deployed"
        );
        if let Some(old) = old {
            std::thread::spawn(move || old.destroy());
        }
        web_app.clear_cache();
    }

    /// Swap in a new instance but keep the old one alive until the grace
    /// window closes. Used by versioned rollover.
    pub fn deploy_with_grace(&self, web_app: Arc<WebApp>, expires_at: Instant) {
        if let Ok(parent) = self.parent.lock() {
            if let Some(container) = parent.upgrade() {
                web_app.set_parent(&container);
            }
        }
        web_app.start();
        let old = self.instance.swap(Some(Arc::clone(&web_app)));
        if let Some(old) = old {
            if let Ok(mut retired) = self.retired.lock() {
                *retired = Some(RetiredInstance {
                    web_app: old,
                    expires_at,
                });
            }
        }
        web_app.clear_cache();
    }

    /// The retired instance, if its grace window is still open. An expired
    /// instance is destroyed and dropped on first observation.
    pub fn retired_instance(&self) -> Option<RetiredInstance> {
        let Ok(mut retired) = self.retired.lock() else {
            return None;
        };
        match retired.as_ref() {
            Some(r) if Instant::now() < r.expires_at => Some(r.clone()),
            Some(_) => {
                if let Some(expired) = retired.take() {
                    tracing::info!(
                        context_path = %self.context_path,
                        "previous version grace window closed"
                    );
                    std::thread::spawn(move || expired.web_app.destroy());
                }
                None
            }
            None => None,
        }
    }

    /// Stop and drop the live instance.
    pub fn undeploy(&self) {
        if let Some(old) = self.instance.swap(None) {
            old.clear_cache();
            old.destroy();
        }
        if let Ok(mut retired) = self.retired.lock() {
            if let Some(r) = retired.take() {
                r.web_app.destroy();
            }
        }
    }
}

impl std::fmt::Debug for WebAppController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAppController")
            .field("context_path", &self.context_path)
            .field("deployed", &self.instance.load().is_some())
            .finish()
    }
}
