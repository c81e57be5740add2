//! Dispatch error types.
//!
//! Errors flow from chain execution back to the dispatch boundary, where
//! they resolve to error pages. Errors are `Clone` because resolution
//! failures are captured inside cached chains and reproduced on every
//! execution until the deployment is fixed.

use thiserror::Error;

/// Maximum nesting of forward/include/error sub-dispatches per request.
pub const MAX_DISPATCH_DEPTH: usize = 64;

/// Application-raised error carrying an explicit type-ancestry chain, the
/// input to type-based error-page resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServletError {
    pub message: String,
    /// Type names from most to least specific; the first entry is the
    /// concrete type.
    pub types: Vec<String>,
    pub status: Option<u16>,
}

impl ServletError {
    pub fn new(type_name: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            types: vec![type_name.to_string()],
            status: None,
        }
    }

    /// Append an ancestor type, least specific last.
    #[must_use]
    pub fn with_ancestor(mut self, type_name: &str) -> Self {
        self.types.push(type_name.to_string());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl std::fmt::Display for ServletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.types.first() {
            Some(ty) => write!(f, "{ty}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors surfaced by resolution and dispatch.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Deployment configuration is broken; reproduced on every request
    /// until redeployed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target web app cannot serve requests. Permanent unavailability
    /// maps to 404, transient to 503 with an optional Retry-After.
    #[error("{context_path} unavailable (permanent: {permanent})")]
    Unavailable {
        context_path: String,
        permanent: bool,
        retry_after_secs: Option<u32>,
    },

    /// Sub-dispatch nesting exceeded [`MAX_DISPATCH_DEPTH`].
    #[error("dispatch depth {depth} exceeded at {servlet_path}")]
    DepthExceeded { servlet_path: String, depth: usize },

    /// The client went away mid-request; suppressed rather than reported.
    #[error("client disconnected")]
    ClientDisconnect,

    /// The raw request target could not be decoded.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An operation was attempted in a state that forbids it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A bare status-code completion, such as a 404 chain.
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    /// Application-raised failure with a type chain for page resolution.
    #[error("{0}")]
    Servlet(ServletError),
}

impl From<ServletError> for DispatchError {
    fn from(err: ServletError) -> Self {
        DispatchError::Servlet(err)
    }
}

impl DispatchError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        DispatchError::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status this error renders as when no error page overrides it.
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::Config(_) => 500,
            DispatchError::Unavailable { permanent, .. } => {
                if *permanent {
                    404
                } else {
                    503
                }
            }
            DispatchError::DepthExceeded { .. } => 500,
            DispatchError::ClientDisconnect => 500,
            DispatchError::BadRequest(_) => 400,
            DispatchError::IllegalState(_) => 500,
            DispatchError::Status { status, .. } => *status,
            DispatchError::Servlet(err) => err.status.unwrap_or(500),
        }
    }

    /// Type-name chain for error-page resolution, most specific first.
    /// Status completions have no type identity.
    pub fn error_types(&self) -> Vec<String> {
        match self {
            DispatchError::Servlet(err) => err.types.clone(),
            DispatchError::Config(_) => vec!["ConfigError".to_string()],
            DispatchError::Unavailable { .. } => vec!["UnavailableError".to_string()],
            DispatchError::DepthExceeded { .. } => vec!["DepthExceededError".to_string()],
            DispatchError::ClientDisconnect => vec!["ClientDisconnectError".to_string()],
            DispatchError::BadRequest(_) => vec!["BadRequestError".to_string()],
            DispatchError::IllegalState(_) => vec!["IllegalStateError".to_string()],
            DispatchError::Status { .. } => Vec::new(),
        }
    }

    pub fn is_client_disconnect(&self) -> bool {
        matches!(self, DispatchError::ClientDisconnect)
    }
}
