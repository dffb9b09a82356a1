use std::fmt;
use std::sync::Arc;

use crate::common::{Direction, Edge, EventFn, PortEvent};
use crate::device::DeviceInner;
use crate::error::Result;

/// Handle to one numbered line on a device.
///
/// A `Port` is obtained from [`Interface::get_port`](crate::Interface::get_port)
/// and is therefore always in range. It proxies every operation through its
/// owning device; it never touches hardware directly.
#[derive(Clone)]
pub struct Port {
    number: u8,
    device: Arc<DeviceInner>,
}

impl core::fmt::Debug for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("number", &self.number)
            .finish_non_exhaustive()
    }
}

impl Port {
    pub(crate) fn new(number: u8, device: Arc<DeviceInner>) -> Self {
        Self { number, device }
    }

    /// 1-based port number within the owning device.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Current value; `true` is HIGH.
    ///
    /// For output-configured expander ports this answers from held register
    /// state; input-configured ports are read live from the hardware.
    pub fn get_value(&self) -> Result<bool> {
        self.device.raw_read(self.number)
    }

    /// `get_value() == HIGH`.
    pub fn is_high(&self) -> Result<bool> {
        self.get_value()
    }

    /// `get_value() == LOW`.
    pub fn is_low(&self) -> Result<bool> {
        Ok(!self.get_value()?)
    }

    /// Whether the port is currently configured as input.
    pub fn is_input(&self) -> bool {
        self.device.direction_of(self.number) == Direction::Input
    }

    /// Whether the port is currently configured as output.
    pub fn is_output(&self) -> bool {
        self.device.direction_of(self.number) == Direction::Output
    }

    /// Drive the port HIGH. Direction is left untouched; a port currently
    /// configured as input is rejected with a configuration error.
    pub fn set_high(&self) -> Result<()> {
        self.device.set_value(self.number, true)
    }

    /// Drive the port LOW. Same input-port policy as [`Port::set_high`].
    pub fn set_low(&self) -> Result<()> {
        self.device.set_value(self.number, false)
    }

    /// Configure the port as input.
    pub fn set_as_input(&self) -> Result<()> {
        self.device.set_direction(self.number, Direction::Input)
    }

    /// Configure the port as output. The value defaults to LOW and any
    /// registered value-change listeners are dropped.
    pub fn set_as_output(&self) -> Result<()> {
        self.device.set_direction(self.number, Direction::Output)
    }

    /// Register a callback for LOW to HIGH transitions.
    ///
    /// Callbacks accumulate: every registration is retained and invoked in
    /// registration order with the port number and the new value. The port
    /// must currently be configured as input.
    pub fn on_rising<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(PortEvent) + Send + Sync + 'static,
    {
        self.add_listener(Edge::Rising, Arc::new(callback))
    }

    /// Register a callback for HIGH to LOW transitions; see
    /// [`Port::on_rising`] for the retention and ordering rules.
    pub fn on_falling<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(PortEvent) + Send + Sync + 'static,
    {
        self.add_listener(Edge::Falling, Arc::new(callback))
    }

    fn add_listener(&self, edge: Edge, callback: Arc<EventFn>) -> Result<()> {
        self.device.add_listener(self.number, edge, callback)
    }

    /// Drop all rising and falling callbacks registered on this port. A
    /// poll cycle already dispatching from its snapshot completes with it;
    /// afterwards nothing fires until a new registration.
    pub fn clear_value_change_listeners(&self) {
        self.device.clear_listeners(self.number);
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {} on {}", self.number, self.device.label())
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && Arc::ptr_eq(&self.device, &other.device)
    }
}

impl Eq for Port {}
