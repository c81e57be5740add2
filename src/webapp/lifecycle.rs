//! Web-app lifecycle state machine.
//!
//! Requests arriving while an app is still starting block on the lifecycle
//! until it becomes active or a wait budget expires, which is how a restart
//! appears as a brief latency blip instead of a burst of 503s.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Starting,
    Active,
    Error,
    Stopping,
    Stopped,
    Destroyed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::New => "new",
            LifecycleState::Starting => "starting",
            LifecycleState::Active => "active",
            LifecycleState::Error => "error",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Condvar-backed state holder shared by the app and its controller.
pub struct Lifecycle {
    name: String,
    state: Mutex<LifecycleState>,
    changed: Condvar,
}

impl Lifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LifecycleState::New),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(LifecycleState::Error)
    }

    fn transition(&self, to: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            if *state != to {
                tracing::info!(name = %self.name, from = %*state, to = %to, "lifecycle transition");
                *state = to;
                self.changed.notify_all();
            }
        }
    }

    pub fn to_starting(&self) {
        self.transition(LifecycleState::Starting);
    }

    pub fn to_active(&self) {
        self.transition(LifecycleState::Active);
    }

    pub fn to_error(&self) {
        self.transition(LifecycleState::Error);
    }

    pub fn to_stopping(&self) {
        self.transition(LifecycleState::Stopping);
    }

    pub fn to_stopped(&self) {
        self.transition(LifecycleState::Stopped);
    }

    pub fn to_destroyed(&self) {
        self.transition(LifecycleState::Destroyed);
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    pub fn is_stopped(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Stopped | LifecycleState::Destroyed
        )
    }

    /// Block until the app is active or the budget runs out. Returns whether
    /// the app ended up active. Terminal and error states return
    /// immediately.
    pub fn wait_for_active(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        loop {
            match *state {
                LifecycleState::Active => return true,
                LifecycleState::Error | LifecycleState::Stopped | LifecycleState::Destroyed => {
                    return false;
                }
                _ => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return *state == LifecycleState::Active;
            }
            match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => state = guard,
                Err(_) => return false,
            }
        }
    }
}
