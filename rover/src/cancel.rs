//! Cooperative cancellation shared by the vehicle roles
//!
//! Every blocking wait in the process is either bounded by a timeout after
//! which the token is checked, or is a wait on the token itself, so `cancel()`
//! is observed within one poll interval.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
pub struct CancelToken {
    pair: Arc<CondPair>,
}

#[derive(Default)]
struct CondPair {
    cancelled: Mutex<bool>,
    cvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        let mut cancelled = self.pair.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.pair.cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.pair.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless cancelled first. Returns true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.pair.cancelled.lock().unwrap_or_else(PoisonError::into_inner);

        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .pair
                .cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }

        *cancelled
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
