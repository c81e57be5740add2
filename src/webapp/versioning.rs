//! Versioned deployment with single-flight rollover.
//!
//! Several versions of one application can be registered under the same
//! context path. The newest version by numeric-aware comparison is primary;
//! when a newer version appears, one updater thread performs the rollover
//! (compare-and-swap guarded) while concurrent lookups keep using the
//! current primary. The displaced version stays reachable through the
//! controller's grace window for session-affine routing.

use crate::webapp::controller::WebAppController;
use crate::webapp::WebApp;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Compare version strings with numeric runs ordered numerically, so
/// `1.10` sorts above `1.2` and `2.10` above `2.9`. Non-digit runs compare
/// lexically. Longer versions win a shared-prefix tie.
pub fn version_compare(a: &str, b: &str) -> Ordering {
    let mut ia = a.chars().peekable();
    let mut ib = b.chars().peekable();
    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let mut na: u64 = 0;
                    while let Some(c) = ia.peek().copied().filter(char::is_ascii_digit) {
                        na = na.saturating_mul(10).saturating_add(u64::from(c) - u64::from('0'));
                        ia.next();
                    }
                    let mut nb: u64 = 0;
                    while let Some(c) = ib.peek().copied().filter(char::is_ascii_digit) {
                        nb = nb.saturating_mul(10).saturating_add(u64::from(c) - u64::from('0'));
                        ib.next();
                    }
                    match na.cmp(&nb) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    match ca.cmp(&cb) {
                        Ordering::Equal => {
                            ia.next();
                            ib.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

/// Manages the versions registered under one context path and keeps the
/// highest one deployed as primary.
pub struct VersioningController {
    context_path: String,
    controller: Arc<WebAppController>,
    versions: Mutex<Vec<(String, Arc<WebApp>)>>,
    updating: AtomicBool,
    rollover_window: Duration,
}

impl VersioningController {
    pub fn new(context_path: &str, rollover_window: Duration) -> Arc<Self> {
        Arc::new(Self {
            context_path: context_path.to_string(),
            controller: WebAppController::new(context_path),
            versions: Mutex::new(Vec::new()),
            updating: AtomicBool::new(false),
            rollover_window: rollover_window.max(Duration::from_secs(1)),
        })
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// The dispatch controller holding the current primary instance.
    pub fn controller(&self) -> &Arc<WebAppController> {
        &self.controller
    }

    pub fn primary_version(&self) -> Option<String> {
        self.controller
            .instance()
            .and_then(|app| app.version().map(str::to_string))
    }

    /// Register a version and trigger an update pass.
    pub fn add_version(&self, version: &str, web_app: Arc<WebApp>) {
        if let Ok(mut versions) = self.versions.lock() {
            versions.retain(|(v, _)| v != version);
            versions.push((version.to_string(), web_app));
        }
        self.update();
    }

    pub fn remove_version(&self, version: &str) {
        if let Ok(mut versions) = self.versions.lock() {
            versions.retain(|(v, _)| v != version);
        }
        self.update();
    }

    /// Re-evaluate the primary. Single-flight: if another thread is already
    /// updating, return immediately and keep serving the current primary.
    pub fn update(&self) {
        if self
            .updating
            .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
            .is_err()
        {
            return;
        }
        let result = self.update_impl();
        self.updating.store(false, AtomicOrdering::Release);
        if let Some((from, to)) = result {
            tracing::info!(
                context_path = %self.context_path,
                from = ?from,
                to = %to,
                "version rollover"
            );
        }
    }

    fn update_impl(&self) -> Option<(Option<String>, String)> {
        let best = {
            let versions = self.versions.lock().ok()?;
            versions
                .iter()
                .max_by(|(a, _), (b, _)| version_compare(a, b))
                .map(|(v, app)| (v.clone(), Arc::clone(app)))?
        };
        let (best_version, best_app) = best;
        let current = self.primary_version();
        if current.as_deref() == Some(best_version.as_str()) {
            return None;
        }
        let expires_at = Instant::now() + self.rollover_window;
        self.controller.deploy_with_grace(best_app, expires_at);
        Some((current, best_version))
    }
}

impl std::fmt::Debug for VersioningController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersioningController")
            .field("context_path", &self.context_path)
            .field("primary", &self.primary_version())
            .finish()
    }
}
