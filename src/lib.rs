//! Drivers for two I2C sensors: the Bosch BMP280 barometric pressure and temperature sensor
//! and the ST VL6180X time-of-flight range sensor.
//!
//! Both drivers talk to their device through the [RegisterBus] trait, which bundles a register
//! read, a register write and a blocking sleep. [I2cBus] implements it on top of any blocking
//! `embedded-hal` I2C bus and delay:
//!
//! ```rust, ignore
//! use bmp280_vl6180x::*;
//!
//! let bus = I2cBus::new(&mut i2c, &mut delay, bmp280::I2C_ADDRESS, RegisterWidth::Eight);
//! let mut barometer = Bmp280::new(bus);
//! barometer.init()?;
//! barometer.set_measurement_control(Oversampling::X2, Oversampling::X16, PowerMode::Normal)?;
//! let (temperature, pressure) = barometer.get_temperature_and_pressure()?;
//! ```
//!
//! The range sensor uses 16-bit register addresses:
//!
//! ```rust, ignore
//! let bus = I2cBus::new(&mut i2c, &mut delay, vl6180x::I2C_ADDRESS, RegisterWidth::Sixteen);
//! let mut ranger = Vl6180x::new(bus);
//! ranger.init()?;
//! ranger.request_single_measurement()?;
//! ranger.wait_for_new_measurement(10, Some(50))?;
//! let distance = ranger.get_measurement_result()?;
//! ```
//!
//! For a plain polling loop, [application::Altimeter] and [application::RangeFinder] do the
//! bring-up and return readings in display units.
//!
//! All I/O is blocking and happens on the caller's thread. A driver instance owns its bus and
//! state, so one instance per device.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![cfg_attr(not(test), no_std)]

extern crate embedded_hal as hal;
extern crate libm;

pub mod application;
pub mod bmp280;
mod bus;
mod error;
pub mod vl6180x;

#[cfg(test)]
mod mock;

pub use bmp280::{Bmp280, Filter, Oversampling, PowerMode, Spi3Wire, StandbyTime};
pub use bus::{I2cBus, RegisterBus, RegisterWidth};
pub use error::Error;
pub use vl6180x::{InterruptError, RangeStatus, Vl6180x};
