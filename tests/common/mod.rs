//! A register-file MCP23017 simulation for the polling scenarios.
//!
//! `embedded-hal-mock` expectations work for fixed transaction scripts,
//! but the edge watcher reads the GPIO registers an unbounded number of
//! times. This fake chip answers reads from a mutable register file the
//! test drives, like a real chip whose input pins change level.

use std::sync::{Arc, Mutex};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

const REG_FILE_SIZE: usize = 0x16;
const GPIOA: usize = 0x12;
const GPIOB: usize = 0x13;

struct ChipState {
    regs: [u8; REG_FILE_SIZE],
    fail_reads: bool,
}

/// Handle to the simulated chip; clones share the register file.
#[derive(Clone)]
pub struct FakeChip {
    state: Arc<Mutex<ChipState>>,
}

impl FakeChip {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState {
                regs: [0x00; REG_FILE_SIZE],
                fail_reads: false,
            })),
        }
    }

    /// Drive the simulated level on an input port (1-16).
    pub fn set_input_level(&self, port: u8, level: bool) {
        assert!((1..=16).contains(&port));
        let (reg, bit) = if port <= 8 {
            (GPIOA, port - 1)
        } else {
            (GPIOB, port - 9)
        };
        let mut state = self.state.lock().unwrap();
        if level {
            state.regs[reg] |= 1 << bit;
        } else {
            state.regs[reg] &= !(1 << bit);
        }
    }

    /// Make every register read fail with a bus error until disabled.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    /// Last value written to a register.
    #[allow(dead_code)]
    pub fn reg(&self, reg: u8) -> u8 {
        self.state.lock().unwrap().regs[reg as usize]
    }
}

impl ErrorType for FakeChip {
    type Error = ErrorKind;
}

impl I2c for FakeChip {
    fn transaction(
        &mut self,
        _address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        let mut pointer = 0usize;
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    if let Some(reg) = bytes.first() {
                        pointer = *reg as usize;
                    }
                    if let Some(value) = bytes.get(1) {
                        state.regs[pointer] = *value;
                    }
                }
                Operation::Read(buffer) => {
                    if state.fail_reads {
                        return Err(ErrorKind::Other);
                    }
                    for byte in buffer.iter_mut() {
                        *byte = state.regs[pointer];
                    }
                }
            }
        }
        Ok(())
    }
}
