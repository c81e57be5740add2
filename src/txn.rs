//! Thread-bound transaction bracket.
//!
//! The transaction manager's "current transaction" is thread-bound. The
//! web-app chain checks on exit that any transaction opened during the
//! request was closed, warns if not, and forcibly rolls it back. This is a
//! safety net for filters/servlets that forget their own transaction
//! lifecycle; a cleanup failure is logged and never masks the request's
//! original outcome.

use std::cell::RefCell;
use tracing::warn;

thread_local! {
    static CURRENT: RefCell<Option<Transaction>> = const { RefCell::new(None) };
}

/// A thread-bound transaction handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub name: String,
}

/// Begin a transaction bound to the current thread. Replaces any transaction
/// already open on this thread.
pub fn begin(name: impl Into<String>) {
    CURRENT.with(|c| {
        *c.borrow_mut() = Some(Transaction { name: name.into() });
    });
}

/// Commit and clear the current transaction, if any.
pub fn commit() -> Option<Transaction> {
    CURRENT.with(|c| c.borrow_mut().take())
}

/// Roll back and clear the current transaction, if any.
pub fn rollback() -> Option<Transaction> {
    CURRENT.with(|c| c.borrow_mut().take())
}

/// True when a transaction is open on the current thread.
pub fn is_open() -> bool {
    CURRENT.with(|c| c.borrow().is_some())
}

/// Exit check run by the web-app chain: a transaction still open at the end
/// of the request is a servlet bug. Warn and force it closed.
pub fn close_dangling(context: &str) {
    if let Some(txn) = rollback() {
        warn!(
            transaction = %txn.name,
            context = %context,
            "transaction not closed by servlet; forcing rollback"
        );
    }
}
