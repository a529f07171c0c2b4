//! # Serial Communication Module
//!
//! Handles the serial link to telemetry devices.
//!
//! This module handles:
//! - Enumerating candidate ports by human-readable name
//! - Opening and closing a device at a standard baud rate
//! - Reconnecting automatically through a background watchdog
//! - Splitting the incoming byte stream into framed messages

pub mod port_trait;
pub mod reader;
pub mod watchdog;

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::error::{GroundlinkError, Result};
use port_trait::{SerialBackend, SerialDevice, SystemSerial};
use watchdog::{ReconnectPolicy, Watchdog};

pub use reader::FrameReader;

/// Baud rates accepted by [`PortConnection::connect`]
pub const STANDARD_BAUD_RATES: &[u32] = &[
    110, 300, 600, 1_200, 2_400, 4_800, 9_600, 14_400, 19_200, 38_400, 57_600, 115_200,
    128_000, 230_400, 256_000, 460_800, 500_000, 921_600, 1_000_000, 1_500_000, 2_000_000,
];

/// Default baud rate for telemetry radios
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Check whether `baud` is one of [`STANDARD_BAUD_RATES`]
pub fn is_standard_baud(baud: u32) -> bool {
    STANDARD_BAUD_RATES.contains(&baud)
}

/// Cap `baud` to the largest standard rate not above it
///
/// Requests below the smallest standard rate are raised to it.
pub fn cap_baud(baud: u32) -> u32 {
    STANDARD_BAUD_RATES
        .iter()
        .rev()
        .find(|&&rate| rate <= baud)
        .copied()
        .unwrap_or(STANDARD_BAUD_RATES[0])
}

/// Options for [`PortConnection::connect_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Spawn the reconnect watchdog after a successful open
    pub auto_reconnect: bool,
    /// Skip checking the name against the enumerated candidates
    pub override_check: bool,
    /// This is a watchdog retry; open failures are not logged as errors
    pub attempt_reconnect: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            override_check: false,
            attempt_reconnect: false,
        }
    }
}

/// Device handle plus the last requested name and baud
struct Session {
    device: Option<Box<dyn SerialDevice>>,
    path: Option<String>,
    baud: u32,
}

/// State shared between a [`PortConnection`] and its watchdog
pub(crate) struct PortShared {
    backend: Arc<dyn SerialBackend>,
    session: Mutex<Session>,
}

impl PortShared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock().device.is_some()
    }

    pub(crate) fn last_path(&self) -> Option<String> {
        self.lock().path.clone()
    }

    /// Open `path` and install the handle; returns whether it opened
    fn open(&self, path: &str, baud: u32, attempt_reconnect: bool) -> bool {
        let opened = self.backend.open(path, baud);
        let mut session = self.lock();
        session.path = Some(path.to_string());
        session.baud = baud;

        match opened {
            Ok(device) => {
                session.device = Some(device);
                info!("Device \"{}\" connected at {} baud", path, baud);
                true
            }
            Err(e) => {
                session.device = None;
                if attempt_reconnect {
                    debug!("Reconnect to \"{}\" failed: {}", path, e);
                } else {
                    error!("Can't connect port \"{}\": {}", path, e);
                }
                false
            }
        }
    }

    /// Reopen the last session without spawning a watchdog
    pub(crate) fn reopen(&self) -> bool {
        let (path, baud) = {
            let session = self.lock();
            match &session.path {
                Some(path) => (path.clone(), session.baud),
                None => return false,
            }
        };
        self.open(&path, baud, true)
    }
}

/// Serial port connection with optional auto-reconnect
///
/// All methods take `&self`, so one connection can be shared through an
/// `Arc` between the reader thread and the owner.
pub struct PortConnection {
    shared: Arc<PortShared>,
    watchdog: Mutex<Option<Watchdog>>,
    policy: ReconnectPolicy,
}

impl std::fmt::Debug for PortConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortConnection")
            .field("path", &self.shared.last_path())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl PortConnection {
    /// Create a disconnected port over `backend`
    pub fn new(backend: Arc<dyn SerialBackend>) -> Self {
        Self::with_policy(backend, ReconnectPolicy::default())
    }

    /// Create a disconnected port with a custom reconnect policy
    pub fn with_policy(backend: Arc<dyn SerialBackend>, policy: ReconnectPolicy) -> Self {
        Self {
            shared: Arc::new(PortShared {
                backend,
                session: Mutex::new(Session {
                    device: None,
                    path: None,
                    baud: DEFAULT_BAUD_RATE,
                }),
            }),
            watchdog: Mutex::new(None),
            policy,
        }
    }

    /// Create a disconnected port on the system serial backend
    pub fn system(policy: ReconnectPolicy) -> Self {
        Self::with_policy(Arc::new(SystemSerial), policy)
    }

    /// Enumerate the ports present right now
    ///
    /// # Returns
    ///
    /// * `Result<BTreeMap<String, String>>` - Human-readable name to device path
    pub fn list_candidates(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .shared
            .backend
            .list_ports()?
            .into_iter()
            .map(|port| (port.display_name(), port.path))
            .collect())
    }

    /// Resolve a human-readable name or device path against the candidates
    fn resolve(&self, name: &str) -> Result<String> {
        let candidates = self.list_candidates()?;

        if let Some(path) = candidates.get(name) {
            return Ok(path.clone());
        }
        if candidates.values().any(|path| path == name) {
            return Ok(name.to_string());
        }
        Err(GroundlinkError::NoDeviceFound(format!(
            "No device named \"{}\"",
            name
        )))
    }

    /// Connect to `name` at `baud`
    ///
    /// # Arguments
    ///
    /// * `name` - Human-readable name from [`list_candidates`](Self::list_candidates) or device path
    /// * `baud` - Requested baud rate, capped to the standard set
    /// * `auto_reconnect` - Spawn the reconnect watchdog on success
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - Whether the device opened
    ///
    /// # Errors
    ///
    /// Returns `NoDeviceFound` if `name` matches no enumerated port
    pub fn connect(&self, name: &str, baud: u32, auto_reconnect: bool) -> Result<bool> {
        self.connect_with(
            name,
            baud,
            ConnectOptions {
                auto_reconnect,
                ..ConnectOptions::default()
            },
        )
    }

    /// Connect with explicit [`ConnectOptions`]
    pub fn connect_with(&self, name: &str, baud: u32, options: ConnectOptions) -> Result<bool> {
        let name = name.trim();
        let path = if options.override_check {
            name.to_string()
        } else {
            self.resolve(name)?
        };

        let baud = if is_standard_baud(baud) {
            baud
        } else {
            let capped = cap_baud(baud);
            warn!("Baud rate {} is not standard, using {}", baud, capped);
            capped
        };

        if self.is_connected() {
            info!(
                "Clearing connection from \"{}\" before connecting \"{}\"",
                self.shared.last_path().unwrap_or_default(),
                path
            );
            self.disconnect(false);
        }
        self.stop_watchdog();

        let opened = self.shared.open(&path, baud, options.attempt_reconnect);
        if opened && options.auto_reconnect {
            self.start_watchdog()?;
        }
        Ok(opened)
    }

    /// Close the device and stop the watchdog
    ///
    /// # Arguments
    ///
    /// * `force` - Tolerate an already closed or never opened port silently
    pub fn disconnect(&self, force: bool) {
        self.stop_watchdog();

        let mut session = self.shared.lock();
        let path = session.path.clone().unwrap_or_default();
        match session.device.take() {
            Some(device) => {
                drop(device);
                info!("\"{}\" has been closed", path);
            }
            None if force => {}
            None if session.path.is_none() => warn!("The port has not been initialized"),
            None => warn!("\"{}\" has already been disconnected", path),
        }
    }

    /// Whether a live device handle is held
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Release the device handle without stopping the watchdog
    ///
    /// Readers call this on I/O errors; the watchdog then reconnects.
    pub fn drop_handle(&self) {
        if self.shared.lock().device.take().is_some() {
            warn!(
                "Dropped handle for \"{}\" after I/O error",
                self.shared.last_path().unwrap_or_default()
            );
        }
    }

    /// Read whatever bytes are waiting; empty when disconnected
    pub fn read_available(&self) -> io::Result<Vec<u8>> {
        let mut session = self.shared.lock();
        let Some(device) = session.device.as_mut() else {
            return Ok(Vec::new());
        };

        let waiting = device.bytes_available()?;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; waiting];
        let n = device.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Device path of the last connect attempt
    pub fn device_path(&self) -> Option<String> {
        self.shared.last_path()
    }

    /// Whether a watchdog is currently attached
    pub fn has_watchdog(&self) -> bool {
        self.watchdog_slot().is_some()
    }

    fn watchdog_slot(&self) -> MutexGuard<'_, Option<Watchdog>> {
        self.watchdog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_watchdog(&self) -> Result<()> {
        let watchdog = Watchdog::spawn(Arc::downgrade(&self.shared), self.policy)?;
        *self.watchdog_slot() = Some(watchdog);
        Ok(())
    }

    fn stop_watchdog(&self) {
        let watchdog = self.watchdog_slot().take();
        if let Some(watchdog) = watchdog {
            watchdog.stop();
        }
    }
}

impl Drop for PortConnection {
    fn drop(&mut self) {
        self.disconnect(true);
    }
}
