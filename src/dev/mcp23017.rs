//! Support for the `MCP23017` "16-Bit I/O Expander with Serial Interface".
//!
//! Datasheet: <https://ww1.microchip.com/downloads/en/devicedoc/20001952c.pdf>
//!
//! The MCP23017 offers two eight-bit GPIO banks. It has three address
//! pins, so eight devices can coexist on an I2C bus. Ports 1-8 live on
//! bank A (GPA0-GPA7), ports 9-16 on bank B (GPB0-GPB7).
//!
//! The chip only supports writing a register 8 bits at a time, so changing
//! a single port rewrites the full byte of its bank from locally held
//! state. The other 7 bits come from that held state, never from a fresh
//! hardware read; concurrent modification of the same register by anything
//! else on the bus is undefined.

use std::sync::Arc;

use embedded_hal::i2c::I2c;
use log::debug;

use crate::bus::I2cExt;
use crate::common::{Backend, Direction};
use crate::context::Context;
use crate::device::DeviceInner;
use crate::error::{Error, Result};
use crate::Interface;

/// Number of ports on one expander.
pub const PORT_COUNT: u8 = 16;

/// One of the two 8-bit register banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    /// GPA0-GPA7, ports 1-8.
    A,
    /// GPB0-GPB7, ports 9-16.
    B,
}

impl Bank {
    fn iodir(self) -> Regs {
        match self {
            Bank::A => Regs::IODIRA,
            Bank::B => Regs::IODIRB,
        }
    }

    fn gpio(self) -> Regs {
        match self {
            Bank::A => Regs::GPIOA,
            Bank::B => Regs::GPIOB,
        }
    }

    fn olat(self) -> Regs {
        match self {
            Bank::A => Regs::OLATA,
            Bank::B => Regs::OLATB,
        }
    }

    fn shift(self) -> u8 {
        match self {
            Bank::A => 0,
            Bank::B => 8,
        }
    }
}

fn bank_of(index: u8) -> Bank {
    if index < 8 {
        Bank::A
    } else {
        Bank::B
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// N.B.: These values are for BANK=0, which is the reset state of the chip
/// (and this driver does not change).
///
/// For all registers the reset value is 0x00, except for IODIR{A,B} which
/// are 0xFF (making all pins inputs) at reset.
enum Regs {
    /// IODIR: input/output direction: 0=output; 1=input
    IODIRA = 0x00,
    /// IODIR: input/output direction: 0=output; 1=input
    IODIRB = 0x01,
    /// GPIO: reflects logic level on pins
    GPIOA = 0x12,
    /// GPIO: reflects logic level on pins
    GPIOB = 0x13,
    /// OLAT: output latches: sets state for pins configured as outputs
    OLATA = 0x14,
    /// OLAT: output latches: sets state for pins configured as outputs
    OLATB = 0x15,
}

impl From<Regs> for u8 {
    fn from(r: Regs) -> u8 {
        r as u8
    }
}

/// Register-group driver: holds the direction and output-latch words and
/// resends the full byte of a bank on any single-bit change.
struct ExpanderDriver<I2C> {
    bus: I2C,
    address: u8,
    /// Held output latches; bit 0 = port 1. Single source of truth for
    /// output bits.
    out: u16,
    /// Held direction word, IODIR polarity: 1 = input.
    dir: u16,
}

impl<I2C: I2c> ExpanderDriver<I2C> {
    /// All ports output, all LOW, with exactly one write per register per
    /// bank.
    fn initialize(&mut self) -> Result<()> {
        for bank in [Bank::A, Bank::B] {
            self.bus.write_reg(self.address, bank.iodir(), 0x00)?;
        }
        for bank in [Bank::A, Bank::B] {
            self.bus.write_reg(self.address, bank.olat(), 0x00)?;
        }
        Ok(())
    }

    fn write_out(&mut self, bank: Bank) -> Result<()> {
        let byte = (self.out >> bank.shift()) as u8;
        debug!(
            "MCP23017@{:#04x}: writing {byte:#010b} to {:?}",
            self.address,
            bank.olat()
        );
        self.bus.write_reg(self.address, bank.olat(), byte)
    }

    fn write_dir(&mut self, bank: Bank) -> Result<()> {
        let byte = (self.dir >> bank.shift()) as u8;
        debug!(
            "MCP23017@{:#04x}: writing {byte:#010b} to {:?}",
            self.address,
            bank.iodir()
        );
        self.bus.write_reg(self.address, bank.iodir(), byte)
    }
}

impl<I2C: I2c + Send> Backend for ExpanderDriver<I2C> {
    fn set_direction(&mut self, index: u8, direction: Direction) -> Result<()> {
        let mask = 1u16 << index;
        let bank = bank_of(index);
        match direction {
            Direction::Input => {
                self.dir |= mask;
            }
            Direction::Output => {
                // Latch LOW before flipping the direction so the line
                // comes up driven LOW.
                self.out &= !mask;
                self.write_out(bank)?;
                self.dir &= !mask;
            }
        }
        self.write_dir(bank)
    }

    fn direction(&self, index: u8) -> Direction {
        if self.dir & (1 << index) != 0 {
            Direction::Input
        } else {
            Direction::Output
        }
    }

    fn write(&mut self, index: u8, level: bool) -> Result<()> {
        let mask = 1u16 << index;
        if level {
            self.out |= mask;
        } else {
            self.out &= !mask;
        }
        self.write_out(bank_of(index))
    }

    fn read(&mut self, index: u8) -> Result<bool> {
        let mask = 1u16 << index;
        if self.dir & mask == 0 {
            // Output bits answer from the held latch word.
            return Ok(self.out & mask != 0);
        }
        let byte = self.bus.read_reg(self.address, bank_of(index).gpio())?;
        Ok(byte & (1 << (index % 8)) != 0)
    }
}

/// The MCP23017 expander device.
///
/// Constructed through [`Mcp23017::open`], which yields a regular
/// [`Interface`] of 16 ports.
pub struct Mcp23017;

impl Mcp23017 {
    /// Open the expander at `address` on `bus` and register it with `ctx`.
    ///
    /// `address` is the chip's 7-bit I2C address, `0x20..=0x27` depending
    /// on the A0-A2 strapping. Every port comes up configured as output
    /// and LOW, established with one full write per register per bank.
    pub fn open<I2C>(ctx: &Context, bus: I2C, address: u8) -> Result<Interface>
    where
        I2C: I2c + Send + 'static,
    {
        if !(0x20..=0x27).contains(&address) {
            return Err(Error::Config(format!(
                "invalid MCP23017 address {address:#04x}, expected 0x20..=0x27"
            )));
        }
        let mut driver = ExpanderDriver {
            bus,
            address,
            out: 0x0000,
            dir: 0x0000,
        };
        driver.initialize()?;
        let inner = DeviceInner::new(
            format!("MCP23017@{address:#04x}"),
            PORT_COUNT,
            &[],
            Box::new(driver),
            ctx.settings_handle(),
        );
        ctx.register(Arc::clone(&inner));
        Ok(Interface::new(inner))
    }

    /// Map a 1-8 in-bank number to the flat 1-16 numbering, for callers
    /// that think in terms of GPA/GPB.
    pub fn bank_port(bank: Bank, number: u8) -> Result<u8> {
        if !(1..=8).contains(&number) {
            return Err(Error::Config(format!(
                "in-bank port number {number} is out of range [1, 8]"
            )));
        }
        Ok(match bank {
            Bank::A => number,
            Bank::B => number + 8,
        })
    }
}
