//! Register level access to a sensor.
//!
//! The drivers only ever talk to hardware through [RegisterBus]. [I2cBus] implements it on top
//! of the blocking `embedded-hal` I2C and delay traits.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::trace;

/// Register read, register write and blocking sleep.
///
/// Implementations must transfer exactly `buffer.len()` / `data.len()` bytes starting at
/// `register`, and `sleep_ms` must block for at least the given number of milliseconds.
pub trait RegisterBus {
    /// Transport error, reported to the caller as [Error::Bus](crate::Error::Bus).
    type Error;

    /// Fill `buffer` with the registers starting at `register`.
    fn read(&mut self, register: u16, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` to the registers starting at `register`.
    fn write(&mut self, register: u16, data: &[u8]) -> Result<(), Self::Error>;

    /// Block the calling context for at least `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32) -> Result<(), Self::Error>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    type Error = T::Error;

    fn read(&mut self, register: u16, buffer: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read(register, buffer)
    }

    fn write(&mut self, register: u16, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write(register, data)
    }

    fn sleep_ms(&mut self, ms: u32) -> Result<(), Self::Error> {
        (**self).sleep_ms(ms)
    }
}

/// Width of the register address sent ahead of every transfer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterWidth {
    /// One address byte, used by the BMP280.
    Eight,
    /// Two address bytes, most significant first, used by the VL6180X.
    Sixteen,
}

impl RegisterWidth {
    fn encode(self, register: u16, frame: &mut [u8]) -> usize {
        match self {
            Self::Eight => {
                debug_assert!(
                    register <= 0xFF,
                    "register {:#06x} needs a 16-bit address",
                    register
                );
                frame[0] = register as u8;
                1
            }
            Self::Sixteen => {
                frame[..2].copy_from_slice(&register.to_be_bytes());
                2
            }
        }
    }
}

// Data bytes carried per write transaction.
const WRITE_CHUNK: usize = 8;

/// [RegisterBus] over a blocking I2C bus and a millisecond delay.
#[derive(Debug)]
pub struct I2cBus<'a, I2C, D> {
    i2c: &'a mut I2C,
    delay: &'a mut D,
    address: u8,
    width: RegisterWidth,
}

impl<'a, I2C, D, E> I2cBus<'a, I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u32>,
{
    /// Talk to the device at the 7-bit `address` using the given register address width.
    pub fn new(i2c: &'a mut I2C, delay: &'a mut D, address: u8, width: RegisterWidth) -> Self {
        I2cBus {
            i2c,
            delay,
            address,
            width,
        }
    }

    /// The 7-bit device address.
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl<'a, I2C, D, E> RegisterBus for I2cBus<'a, I2C, D>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    D: DelayMs<u32>,
{
    type Error = E;

    fn read(&mut self, register: u16, buffer: &mut [u8]) -> Result<(), E> {
        let mut frame = [0u8; 2];
        let len = self.width.encode(register, &mut frame);
        trace!("i2c {:#04x} read {:#06x} len {}", self.address, register, buffer.len());
        self.i2c.write_read(self.address, &frame[..len], buffer)
    }

    fn write(&mut self, register: u16, data: &[u8]) -> Result<(), E> {
        // Registers auto-increment, so long payloads go out as consecutive writes.
        let mut frame = [0u8; 2 + WRITE_CHUNK];
        let mut offset = register;
        for chunk in data.chunks(WRITE_CHUNK) {
            let len = self.width.encode(offset, &mut frame);
            frame[len..len + chunk.len()].copy_from_slice(chunk);
            trace!("i2c {:#04x} write {:#06x} {:02x?}", self.address, offset, chunk);
            self.i2c.write(self.address, &frame[..len + chunk.len()])?;
            offset = offset.wrapping_add(chunk.len() as u16);
        }
        Ok(())
    }

    fn sleep_ms(&mut self, ms: u32) -> Result<(), E> {
        self.delay.delay_ms(ms);
        Ok(())
    }
}
