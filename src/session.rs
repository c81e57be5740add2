//! Session provider boundary.
//!
//! Session management internals live outside this crate; dispatch only needs
//! to resolve a requested session id and to release the per-request session
//! reference when a sub-request finishes.

use std::sync::Arc;

/// Opaque handle to a live session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
}

/// Boundary contract consumed by dispatch requests and by version-rollover
/// affinity checks.
pub trait SessionProvider: Send + Sync {
    /// Resolve a session for the given requested id. `create` requests a new
    /// session when none exists; a provider may still return `None` when
    /// creation is not possible.
    fn get_session(&self, requested_id: Option<&str>, create: bool) -> Option<Session>;
}

/// Provider used when no session layer is wired in: never resolves and never
/// creates.
pub struct NoSessions;

impl SessionProvider for NoSessions {
    fn get_session(&self, _requested_id: Option<&str>, _create: bool) -> Option<Session> {
        None
    }
}

/// Convenience alias for the shared provider handle.
pub type SharedSessionProvider = Arc<dyn SessionProvider>;
