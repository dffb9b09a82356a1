use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::common::{lock, Backend, Direction, Edge, EdgeMode, EventFn, PortEvent};
use crate::context::Settings;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::watcher::{EdgeWatcher, ListenerTable};

/// Shared state of one physical device: the backend behind the device lock,
/// the listener table and the lazily started edge watcher.
pub(crate) struct DeviceInner {
    label: String,
    port_count: u8,
    /// Port numbers in range that are nevertheless unusable, with the
    /// reason (native header pins wired to power, ground or I2C).
    reserved: &'static [(u8, &'static str)],
    backend: Mutex<Box<dyn Backend>>,
    listeners: Arc<ListenerTable>,
    watcher: Mutex<Option<EdgeWatcher>>,
    settings: Arc<Settings>,
    released: AtomicBool,
}

impl DeviceInner {
    pub(crate) fn new(
        label: String,
        port_count: u8,
        reserved: &'static [(u8, &'static str)],
        backend: Box<dyn Backend>,
        settings: Arc<Settings>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label,
            port_count,
            reserved,
            backend: Mutex::new(backend),
            listeners: Arc::new(ListenerTable::new()),
            watcher: Mutex::new(None),
            settings,
            released: AtomicBool::new(false),
        })
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    /// Validate a public 1-based port number.
    pub(crate) fn check_port(&self, number: u8) -> Result<()> {
        if number < 1 || number > self.port_count {
            return Err(Error::PortRange {
                number,
                max: self.port_count,
            });
        }
        if let Some((_, reason)) = self.reserved.iter().find(|(pin, _)| *pin == number) {
            return Err(Error::Config(format!(
                "pin {number} is reserved for {reason}"
            )));
        }
        Ok(())
    }

    fn usable_numbers(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=self.port_count).filter(|n| self.check_port(*n).is_ok())
    }

    pub(crate) fn direction_of(&self, number: u8) -> Direction {
        lock(&self.backend).direction(number - 1)
    }

    /// Live value without any direction policy applied; used by the
    /// watcher and by `get_value`.
    pub(crate) fn raw_read(&self, number: u8) -> Result<bool> {
        lock(&self.backend).read(number - 1)
    }

    pub(crate) fn set_value(&self, number: u8, level: bool) -> Result<()> {
        let mut backend = lock(&self.backend);
        if backend.direction(number - 1) == Direction::Input {
            return Err(Error::Config(format!(
                "port {number} is configured as input, cannot set its value"
            )));
        }
        backend.write(number - 1, level)
    }

    /// Switching to output forces the value LOW (the initialization
    /// policy) and drops the port's listeners, as value-change events only
    /// make sense for inputs.
    pub(crate) fn set_direction(self: &Arc<Self>, number: u8, direction: Direction) -> Result<()> {
        lock(&self.backend).set_direction(number - 1, direction)?;
        if direction == Direction::Output {
            self.clear_listeners(number);
        }
        Ok(())
    }

    pub(crate) fn add_listener(
        self: &Arc<Self>,
        number: u8,
        edge: Edge,
        callback: Arc<EventFn>,
    ) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::Config(format!(
                "device {} has been released",
                self.label
            )));
        }
        if self.direction_of(number) == Direction::Output {
            return Err(Error::Config(format!(
                "port {number} is configured as output, cannot listen for value changes"
            )));
        }
        // The live value at first registration seeds the debounce state
        // machine's stable value.
        let initial = self.raw_read(number)?;
        self.listeners.add(number, edge, callback, initial);
        // Bind the mode so the backend guard drops here;
        // hook_host_dispatch re-locks the backend.
        let mode = lock(&self.backend).edge_mode();
        let hooked = match mode {
            EdgeMode::Host => self.hook_host_dispatch(number),
            EdgeMode::Polled => self.ensure_watcher(),
        };
        if let Err(err) = hooked {
            // A failed hook must not leave the callback armed.
            self.listeners.pop(number, edge);
            return Err(err);
        }
        Ok(())
    }

    fn ensure_watcher(self: &Arc<Self>) -> Result<()> {
        let mut watcher = lock(&self.watcher);
        if watcher.is_none() {
            *watcher = Some(EdgeWatcher::spawn(Arc::clone(self))?);
        }
        Ok(())
    }

    /// Install one host edge-watch per pin which fans out to the ordered
    /// callback lists. Further registrations on the same port reuse it.
    fn hook_host_dispatch(self: &Arc<Self>, number: u8) -> Result<()> {
        if self.listeners.hooked(number) {
            return Ok(());
        }
        let table = Arc::clone(&self.listeners);
        let dispatch = Box::new(move |level: bool| {
            if let Some((callbacks, value)) = table.commit(number, level) {
                for callback in callbacks {
                    callback(PortEvent { number, value });
                }
            }
        });
        lock(&self.backend).host_watch(number - 1, self.settings.debounce(), dispatch)?;
        self.listeners.set_hooked(number);
        Ok(())
    }

    pub(crate) fn clear_listeners(self: &Arc<Self>, number: u8) {
        if let Some(hooked) = self.listeners.remove(number) {
            if hooked {
                if let Err(err) = lock(&self.backend).host_unwatch(number - 1) {
                    warn!("{}: failed to remove edge watch on {number}: {err}", self.label);
                }
            }
        }
        if self.listeners.is_empty() {
            // Last listener gone: stop the watcher and fall back to idle.
            // Taken out as a statement so the guard is released before the
            // join; shutdown can be reached from a watcher-thread callback.
            let watcher = lock(&self.watcher).take();
            if let Some(watcher) = watcher {
                watcher.shutdown();
            }
        }
    }

    /// Stop the watcher and release underlying resources. Guarded so the
    /// release actions run at most once.
    pub(crate) fn shutdown(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("releasing device {}", self.label);
        let watcher = lock(&self.watcher).take();
        if let Some(watcher) = watcher {
            watcher.shutdown();
        }
        self.listeners.clear_all();
        lock(&self.backend).release()
    }
}

/// Handle to one physical device: the native board or a single expander
/// chip. Owns a fixed set of 1-based numbered ports and resolves numbers
/// to [`Port`] handles.
///
/// Cheap to clone; clones refer to the same device.
#[derive(Clone)]
pub struct Interface {
    inner: Arc<DeviceInner>,
}

impl core::fmt::Debug for Interface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interface").finish_non_exhaustive()
    }
}

impl Interface {
    pub(crate) fn new(inner: Arc<DeviceInner>) -> Self {
        Self { inner }
    }

    /// Number of ports on the device (including reserved pin positions on
    /// the native header).
    pub fn port_count(&self) -> u8 {
        self.inner.port_count
    }

    /// Resolve a 1-based port number to its handle.
    ///
    /// Fails with [`Error::PortRange`] outside `[1, port_count]` and with
    /// [`Error::Config`] for reserved native pins.
    pub fn get_port(&self, number: u8) -> Result<Port> {
        self.inner.check_port(number)?;
        Ok(Port::new(number, Arc::clone(&self.inner)))
    }

    /// All usable ports in ascending number order.
    pub fn get_all_ports(&self) -> Vec<Port> {
        self.inner
            .usable_numbers()
            .map(|number| Port::new(number, Arc::clone(&self.inner)))
            .collect()
    }

    /// The requested ports in the requested order; duplicates are allowed
    /// and resolve to the same port repeatedly.
    pub fn get_ports(&self, numbers: &[u8]) -> Result<Vec<Port>> {
        numbers.iter().map(|&number| self.get_port(number)).collect()
    }

    /// Set every usable port HIGH, as independent single-port writes (N
    /// writes of a full byte each on an expander, not one batched write).
    pub fn set_high(&self) -> Result<()> {
        for number in self.inner.usable_numbers() {
            self.inner.set_value(number, true)?;
        }
        Ok(())
    }

    /// Set every usable port LOW; same cost model as [`Interface::set_high`].
    pub fn set_low(&self) -> Result<()> {
        for number in self.inner.usable_numbers() {
            self.inner.set_value(number, false)?;
        }
        Ok(())
    }

    /// Configure every usable port as input, one port at a time.
    pub fn set_as_input(&self) -> Result<()> {
        for number in self.inner.usable_numbers() {
            self.inner.set_direction(number, Direction::Input)?;
        }
        Ok(())
    }

    /// Configure every usable port as output (LOW), one port at a time.
    pub fn set_as_output(&self) -> Result<()> {
        for number in self.inner.usable_numbers() {
            self.inner.set_direction(number, Direction::Output)?;
        }
        Ok(())
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.label)
    }
}
