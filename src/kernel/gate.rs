use std::sync::Mutex;

use tracing::warn;

use super::sync::lock;
use crate::error::ProctorError;

/// Open/closed switch that every background callback delivery passes through.
///
/// A delivery runs while holding the lock, and `close` takes the same lock, so
/// once `close` returns no delivery is running and none can start. Callbacks
/// delivered through the gate must not close it themselves.
#[derive(Debug)]
pub struct DeliveryGate {
    open: Mutex<bool>,
}

impl DeliveryGate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    /// Runs `f` if the gate is still open. Returns whether it ran.
    pub fn deliver<F>(&self, f: F) -> bool
    where
        F: FnOnce(),
    {
        let guard = lock(&self.open);
        if !*guard {
            return false;
        }
        f();
        true
    }

    pub fn close(&self) {
        *lock(&self.open) = false;
    }

    pub fn is_open(&self) -> bool {
        *lock(&self.open)
    }
}

impl Default for DeliveryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Invokes a consumer callback; an error is logged, never propagated.
pub fn run_callback<T>(
    what: &str,
    callback: &(dyn Fn(T) -> anyhow::Result<()> + Send + Sync),
    value: T,
) {
    if let Err(e) = callback(value) {
        let err = ProctorError::CallbackFailure(format!("{}: {:#}", what, e));
        warn!("{}", err);
    }
}
