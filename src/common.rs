use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Error, Result};

/// Direction a port is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The port reads an externally driven level.
    Input,
    /// The port drives a level.
    Output,
}

/// Kind of level transition a listener is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// LOW to HIGH.
    Rising,
    /// HIGH to LOW.
    Falling,
}

/// Payload handed to edge callbacks: the port that changed and the new
/// stable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortEvent {
    /// 1-based port number within its device.
    pub number: u8,
    /// The committed value; `true` is HIGH.
    pub value: bool,
}

/// Callback invoked on a committed transition.
pub type EventFn = dyn Fn(PortEvent) + Send + Sync;

/// Level callback handed to a host edge-detection facility.
pub type LevelFn = Box<dyn Fn(bool) + Send>;

/// How edge events are produced for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeMode {
    /// A background watcher polls input ports and debounces in software.
    Polled,
    /// The host exposes its own interrupt-capable watch facility; edge
    /// registration is a thin pass-through.
    Host,
}

/// Capability interface over one physical device's lines.
///
/// `Port` and `Interface` program only against this trait and never branch
/// on the backend kind. Indices are 0-based; all public numbering is
/// 1-based.
pub(crate) trait Backend: Send {
    fn set_direction(&mut self, index: u8, direction: Direction) -> Result<()>;

    /// Direction from held state; no hardware access.
    fn direction(&self, index: u8) -> Direction;

    fn write(&mut self, index: u8, level: bool) -> Result<()>;

    fn read(&mut self, index: u8) -> Result<bool>;

    fn edge_mode(&self) -> EdgeMode {
        EdgeMode::Polled
    }

    fn host_watch(&mut self, _index: u8, _debounce: Duration, _dispatch: LevelFn) -> Result<()> {
        Err(Error::Config(
            "backend has no host edge-detection facility".into(),
        ))
    }

    fn host_unwatch(&mut self, _index: u8) -> Result<()> {
        Ok(())
    }

    /// Release underlying resources at process teardown.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Lock a mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
