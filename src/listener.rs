//! Invocation of user-supplied listeners.
//!
//! Listeners never run under a port's state lock, so a panicking listener
//! leaves the port consistent; the panic is logged and the call skipped.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::error;

/// Runs a user listener, logging and swallowing a panic.
pub(crate) fn guarded<R>(port: &str, listener: &'static str, call: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => Some(result),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(port, listener, %message, "Listener panicked");
            None
        }
    }
}
