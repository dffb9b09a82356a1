//! The board's own GPIO header, behind the same [`Interface`] abstraction
//! as the expanders.
//!
//! The low-level pin driver is a collaborator supplied by the caller
//! through [`NativePins`]; this module only adds the numbering policy of
//! the 40-pin Raspberry Pi header and the pass-through of edge
//! registration to the host's interrupt-capable watch facility. No polling
//! thread is started for native devices.

use std::sync::Arc;
use std::time::Duration;

use crate::common::{Backend, Direction, EdgeMode, LevelFn};
use crate::context::Context;
use crate::device::DeviceInner;
use crate::error::Result;
use crate::Interface;

/// Number of positions on the physical header.
pub const PIN_COUNT: u8 = 40;

/// Header pins that are not general-purpose I/O, with the reason.
const RESERVED: &[(u8, &str)] = &[
    (1, "3.3V power"),
    (2, "5V power"),
    (3, "I2C"),
    (4, "5V power"),
    (5, "I2C"),
    (6, "ground"),
    (9, "ground"),
    (14, "ground"),
    (17, "3.3V power"),
    (20, "ground"),
    (25, "ground"),
    (27, "I2C"),
    (28, "I2C"),
    (30, "ground"),
    (34, "ground"),
    (39, "ground"),
];

fn is_reserved(pin: u8) -> bool {
    RESERVED.iter().any(|(reserved, _)| *reserved == pin)
}

/// Low-level driver for the board's discrete pins.
///
/// Pins are addressed by their 1-based header number. Errors surface as
/// [`Error::Comm`](crate::Error::Comm) for I/O failures and
/// [`Error::Config`](crate::Error::Config) for invalid pins.
pub trait NativePins: Send {
    /// Configure a pin's direction.
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<()>;

    /// Drive an output pin; `true` is HIGH.
    fn write(&mut self, pin: u8, level: bool) -> Result<()>;

    /// Read a pin's level.
    fn read(&mut self, pin: u8) -> Result<bool>;

    /// Ask the host's edge-detection facility to invoke `callback` with the
    /// new level on any edge of `pin`, debounced by `debounce`.
    ///
    /// The default implementation reports that no such facility exists.
    fn watch(&mut self, pin: u8, debounce: Duration, callback: LevelFn) -> Result<()> {
        let _ = (pin, debounce, callback);
        Err(crate::Error::Config(
            "pin driver has no edge-detection facility".into(),
        ))
    }

    /// Remove an edge watch installed by [`NativePins::watch`].
    fn unwatch(&mut self, pin: u8) -> Result<()> {
        let _ = pin;
        Ok(())
    }

    /// Release all pin claims at process teardown.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Thin pass-through from the backend capability surface to a
/// [`NativePins`] driver, translating 0-based indices to header numbers.
struct NativeAdapter<P> {
    pins: P,
    /// Direction registry; bit n set means index n is an input.
    inputs: u64,
}

impl<P: NativePins> Backend for NativeAdapter<P> {
    fn set_direction(&mut self, index: u8, direction: Direction) -> Result<()> {
        let pin = index + 1;
        self.pins.configure(pin, direction)?;
        match direction {
            Direction::Input => {
                self.inputs |= 1 << index;
            }
            Direction::Output => {
                self.pins.write(pin, false)?;
                self.inputs &= !(1 << index);
            }
        }
        Ok(())
    }

    fn direction(&self, index: u8) -> Direction {
        if self.inputs & (1 << index) != 0 {
            Direction::Input
        } else {
            Direction::Output
        }
    }

    fn write(&mut self, index: u8, level: bool) -> Result<()> {
        self.pins.write(index + 1, level)
    }

    fn read(&mut self, index: u8) -> Result<bool> {
        self.pins.read(index + 1)
    }

    fn edge_mode(&self) -> EdgeMode {
        EdgeMode::Host
    }

    fn host_watch(&mut self, index: u8, debounce: Duration, dispatch: LevelFn) -> Result<()> {
        self.pins.watch(index + 1, debounce, dispatch)
    }

    fn host_unwatch(&mut self, index: u8) -> Result<()> {
        self.pins.unwatch(index + 1)
    }

    fn release(&mut self) -> Result<()> {
        self.pins.release()
    }
}

/// The board's native GPIO device.
pub struct NativeGpio;

impl NativeGpio {
    /// Open the 40-pin header on top of `pins` and register the device
    /// with `ctx`.
    ///
    /// Every usable pin is configured as output and driven LOW, one pin at
    /// a time. Pins reserved for power, ground or I2C are rejected by
    /// `get_port` with a configuration error naming the reservation.
    pub fn open<P>(ctx: &Context, pins: P) -> Result<Interface>
    where
        P: NativePins + 'static,
    {
        let mut adapter = NativeAdapter { pins, inputs: 0 };
        for pin in 1..=PIN_COUNT {
            if is_reserved(pin) {
                continue;
            }
            adapter.pins.configure(pin, Direction::Output)?;
            adapter.pins.write(pin, false)?;
        }
        let inner = DeviceInner::new(
            "native GPIO".to_string(),
            PIN_COUNT,
            RESERVED,
            Box::new(adapter),
            ctx.settings_handle(),
        );
        ctx.register(Arc::clone(&inner));
        Ok(Interface::new(inner))
    }
}
