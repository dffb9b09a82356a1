use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::common::{lock, Direction, Edge, EventFn, PortEvent};
use crate::device::DeviceInner;
use crate::error::{Error, Result};

/// Cadence of the polling loop.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Pending {
    value: bool,
    since: Instant,
}

/// Listener state for one port: its ordered callback lists and the debounce
/// state machine.
struct PortListeners {
    rising: Vec<Arc<EventFn>>,
    falling: Vec<Arc<EventFn>>,
    last_stable: bool,
    pending: Option<Pending>,
    /// A host edge-watch dispatcher has been installed for this port
    /// (native backends only).
    hooked: bool,
}

impl PortListeners {
    fn new(initial: bool) -> Self {
        Self {
            rising: Vec::new(),
            falling: Vec::new(),
            last_stable: initial,
            pending: None,
            hooked: false,
        }
    }
}

/// Per-device table of event listeners, shared between the application
/// threads and the device's watcher (or host dispatchers).
///
/// This is the lock that `clear_value_change_listeners` contends on: a
/// dispatch snapshots the callback list under it, so a clear can never race
/// a dispatch into a stale list, while a poll already holding its snapshot
/// completes with it.
pub(crate) struct ListenerTable {
    ports: Mutex<BTreeMap<u8, PortListeners>>,
}

impl ListenerTable {
    pub(crate) fn new() -> Self {
        Self {
            ports: Mutex::new(BTreeMap::new()),
        }
    }

    /// Append a callback for `edge` on `number`. `initial` seeds the stable
    /// value when this is the port's first listener.
    pub(crate) fn add(&self, number: u8, edge: Edge, callback: Arc<EventFn>, initial: bool) {
        let mut ports = lock(&self.ports);
        let entry = ports
            .entry(number)
            .or_insert_with(|| PortListeners::new(initial));
        match edge {
            Edge::Rising => entry.rising.push(callback),
            Edge::Falling => entry.falling.push(callback),
        }
    }

    /// Drop the most recently added callback for `edge`, removing the
    /// port's entry entirely when no callbacks remain. Undoes an `add`
    /// whose edge hook failed.
    pub(crate) fn pop(&self, number: u8, edge: Edge) {
        let mut ports = lock(&self.ports);
        if let Some(entry) = ports.get_mut(&number) {
            match edge {
                Edge::Rising => {
                    entry.rising.pop();
                }
                Edge::Falling => {
                    entry.falling.pop();
                }
            }
            if entry.rising.is_empty() && entry.falling.is_empty() {
                ports.remove(&number);
            }
        }
    }

    /// Drop all listeners for `number`. Returns whether a host dispatcher
    /// was installed for the removed entry.
    pub(crate) fn remove(&self, number: u8) -> Option<bool> {
        lock(&self.ports).remove(&number).map(|entry| entry.hooked)
    }

    pub(crate) fn clear_all(&self) {
        lock(&self.ports).clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        lock(&self.ports).is_empty()
    }

    pub(crate) fn hooked(&self, number: u8) -> bool {
        lock(&self.ports)
            .get(&number)
            .map(|entry| entry.hooked)
            .unwrap_or(false)
    }

    pub(crate) fn set_hooked(&self, number: u8) {
        if let Some(entry) = lock(&self.ports).get_mut(&number) {
            entry.hooked = true;
        }
    }

    /// Ports with listeners, in ascending number order.
    pub(crate) fn active_ports(&self) -> Vec<u8> {
        lock(&self.ports).keys().copied().collect()
    }

    /// Feed one sampled value into the debounce state machine.
    ///
    /// A change from the last stable value starts a pending record; a
    /// revert before `debounce` elapses discards it silently; a value that
    /// persists for at least `debounce` (measured from the first observed
    /// change) is committed. On commit, returns a snapshot of the matching
    /// callback list and the new value, to be dispatched without holding
    /// the table lock.
    pub(crate) fn observe(
        &self,
        number: u8,
        value: bool,
        debounce: Duration,
        now: Instant,
    ) -> Option<(Vec<Arc<EventFn>>, bool)> {
        let mut ports = lock(&self.ports);
        let entry = ports.get_mut(&number)?;
        if value == entry.last_stable {
            entry.pending = None;
            return None;
        }
        let since = match &entry.pending {
            Some(pending) if pending.value == value => pending.since,
            _ => {
                entry.pending = Some(Pending { value, since: now });
                now
            }
        };
        if now.duration_since(since) < debounce {
            return None;
        }
        entry.pending = None;
        entry.last_stable = value;
        let list = if value { &entry.rising } else { &entry.falling };
        Some((list.clone(), value))
    }

    /// Commit a level reported by a host edge facility (already debounced
    /// by the host). Returns the dispatch snapshot if the level actually
    /// changed.
    pub(crate) fn commit(&self, number: u8, value: bool) -> Option<(Vec<Arc<EventFn>>, bool)> {
        let mut ports = lock(&self.ports);
        let entry = ports.get_mut(&number)?;
        if value == entry.last_stable {
            return None;
        }
        entry.last_stable = value;
        let list = if value { &entry.rising } else { &entry.falling };
        Some((list.clone(), value))
    }
}

/// Background polling loop emulating hardware interrupts for one expander
/// device.
///
/// Spawned lazily when the first listener is registered and stopped when
/// the last one is cleared or the device is released. The stop signal is
/// checked once per iteration boundary; a running iteration always
/// completes.
pub(crate) struct EdgeWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeWatcher {
    pub(crate) fn spawn(device: Arc<DeviceInner>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("portmux-watch-{}", device.label()))
            .spawn(move || run(device, flag))
            .map_err(|err| Error::Comm(format!("failed to spawn watcher thread: {err}")))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the loop to stop and wait for the current iteration to
    /// finish. Joining is skipped when called from the watcher thread
    /// itself (a callback clearing the last listener).
    pub(crate) fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn run(device: Arc<DeviceInner>, stop: Arc<AtomicBool>) {
    debug!("{}: edge watcher started", device.label());
    while !stop.load(Ordering::Acquire) {
        // Sampled once per iteration; setting changes apply on the next one.
        let debounce = device.settings().debounce();
        for number in device.listeners().active_ports() {
            if device.direction_of(number) != Direction::Input {
                continue;
            }
            let value = match device.raw_read(number) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        "{}: poll read failed on port {number}, skipping: {err}",
                        device.label()
                    );
                    continue;
                }
            };
            if let Some((callbacks, value)) =
                device
                    .listeners()
                    .observe(number, value, debounce, Instant::now())
            {
                for callback in callbacks {
                    callback(PortEvent { number, value });
                }
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
    debug!("{}: edge watcher stopped", device.label());
}
