use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;

use crate::common::lock;
use crate::device::DeviceInner;
use crate::error::Result;

/// Debounce interval used until [`Settings::set_debounce`] is called.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Process-wide mutable settings.
///
/// The single field is the debounce interval: how long a changed input
/// level must persist before it counts as a transition. Watcher threads
/// sample it fresh on every poll iteration, so changes take effect on the
/// next iteration.
pub struct Settings {
    debounce_ms: AtomicU64,
}

impl Settings {
    fn new() -> Self {
        Self {
            debounce_ms: AtomicU64::new(DEFAULT_DEBOUNCE.as_millis() as u64),
        }
    }

    /// Current debounce interval.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.load(Ordering::Relaxed))
    }

    /// Change the debounce interval, with millisecond resolution.
    pub fn set_debounce(&self, interval: Duration) {
        self.debounce_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Process-scoped registry of every device interface created against it,
/// plus the global [`Settings`].
///
/// Construct one `Context`, pass it to the device constructors, and call
/// [`Context::cleanup`] once at shutdown. There is no ambient global state.
pub struct Context {
    settings: Arc<Settings>,
    devices: Mutex<Vec<Arc<DeviceInner>>>,
}

impl Context {
    /// Create an empty context with default settings.
    pub fn new() -> Self {
        Self {
            settings: Arc::new(Settings::new()),
            devices: Mutex::new(Vec::new()),
        }
    }

    /// Access the process-wide settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn settings_handle(&self) -> Arc<Settings> {
        Arc::clone(&self.settings)
    }

    pub(crate) fn register(&self, device: Arc<DeviceInner>) {
        debug!("registering device {}", device.label());
        lock(&self.devices).push(device);
    }

    /// Release every device created against this context: stop edge
    /// watchers, drop listeners and release pin claims.
    ///
    /// Idempotent; a second call is a no-op. On failure the remaining
    /// devices are still released and the first error is returned.
    pub fn cleanup(&self) -> Result<()> {
        let devices: Vec<_> = lock(&self.devices).drain(..).collect();
        let mut first_err = None;
        for device in devices {
            if let Err(err) = device.shutdown() {
                log::warn!("cleanup: failed to release {}: {err}", device.label());
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
