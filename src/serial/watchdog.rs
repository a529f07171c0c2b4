//! # Reconnect Watchdog
//!
//! Background thread that reopens a port whose handle was dropped.
//!
//! The watchdog only holds a `Weak` reference to the port state. It exits when
//! it is stopped or when the port itself is gone.

use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::PortShared;
use crate::error::Result;

/// Wait after a failed reconnect attempt
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(2000);

/// Wait between liveness checks while connected
pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(100);

/// Timing of the watchdog loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub retry_interval: Duration,
    pub settle_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            settle_interval: DEFAULT_SETTLE_INTERVAL,
        }
    }
}

/// Enable flag plus the condition used to wake the loop on stop
type Signal = Arc<(Mutex<bool>, Condvar)>;

/// Handle to a running watchdog thread
pub(crate) struct Watchdog {
    signal: Signal,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn a watchdog for `port`
    pub(crate) fn spawn(port: Weak<PortShared>, policy: ReconnectPolicy) -> Result<Self> {
        let signal: Signal = Arc::new((Mutex::new(true), Condvar::new()));
        let thread_signal = signal.clone();

        let handle = thread::Builder::new()
            .name("port-watchdog".to_string())
            .spawn(move || run(port, thread_signal, policy))?;

        debug!("Reconnect watchdog started");
        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Clear the enable flag, wake the loop and join it
    pub(crate) fn stop(mut self) {
        let (enabled, wake) = &*self.signal;
        *enabled.lock().unwrap_or_else(PoisonError::into_inner) = false;
        wake.notify_all();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Reconnect watchdog panicked");
            }
        }
        debug!("Reconnect watchdog stopped");
    }
}

fn run(port: Weak<PortShared>, signal: Signal, policy: ReconnectPolicy) {
    let (enabled, wake) = &*signal;

    loop {
        if !*enabled.lock().unwrap_or_else(PoisonError::into_inner) {
            break;
        }

        let Some(shared) = port.upgrade() else {
            break;
        };
        let wait = if shared.is_connected() {
            policy.settle_interval
        } else {
            warn!(
                "Attempting to reconnect \"{}\"...",
                shared.last_path().unwrap_or_default()
            );
            if shared.reopen() {
                policy.settle_interval
            } else {
                policy.retry_interval
            }
        };
        drop(shared);

        let guard = enabled.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = wake
            .wait_timeout_while(guard, wait, |on| *on)
            .unwrap_or_else(PoisonError::into_inner);
        if !*guard {
            break;
        }
    }
}
