use embedded_hal::i2c::I2c;

use crate::error::{Error, Result};

/// Register-level access over any `embedded-hal` I2C bus.
///
/// There is deliberately no read-modify-write helper here: the register
/// group discipline resends full bytes from locally held state and never
/// re-reads hardware to compose a write.
pub(crate) trait I2cExt {
    fn write_reg<R: Into<u8>>(&mut self, addr: u8, reg: R, value: u8) -> Result<()>;
    fn read_reg<R: Into<u8>>(&mut self, addr: u8, reg: R) -> Result<u8>;
}

impl<I2C: I2c> I2cExt for I2C {
    fn write_reg<R: Into<u8>>(&mut self, addr: u8, reg: R, value: u8) -> Result<()> {
        self.write(addr, &[reg.into(), value]).map_err(Error::comm)
    }

    fn read_reg<R: Into<u8>>(&mut self, addr: u8, reg: R) -> Result<u8> {
        let mut buf = [0x00];
        self.write_read(addr, &[reg.into()], &mut buf)
            .map_err(Error::comm)?;
        Ok(buf[0])
    }
}
