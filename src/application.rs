//! Ready-made sensor sessions for a polling loop.
//!
//! [Altimeter] and [RangeFinder] bring their driver up with a fixed configuration and expose
//! readings in the units an application wants to print.

use log::debug;

use crate::bmp280::{Bmp280, Filter, Oversampling, PowerMode, Spi3Wire, StandbyTime};
use crate::vl6180x::Vl6180x;
use crate::{Error, RegisterBus};

/// Settings applied by [Altimeter::initialize].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AltimeterConfig {
    /// Standby time between normal mode measurements.
    pub standby: StandbyTime,
    /// IIR filter coefficient.
    pub filter: Filter,
    /// Temperature oversampling.
    pub temperature_oversampling: Oversampling,
    /// Pressure oversampling.
    pub pressure_oversampling: Oversampling,
    /// Power mode.
    pub power_mode: PowerMode,
    /// Measure the altitude reference at start-up. Otherwise the reference stays at sea level.
    pub calibrate: bool,
}

impl Default for AltimeterConfig {
    /// Indoor navigation profile with start-up calibration.
    fn default() -> Self {
        AltimeterConfig {
            standby: StandbyTime::Ms0_5,
            filter: Filter::X16,
            temperature_oversampling: Oversampling::X2,
            pressure_oversampling: Oversampling::X16,
            power_mode: PowerMode::Normal,
            calibrate: true,
        }
    }
}

/// Altitude relative to where the session started, from a BMP280.
#[derive(Debug)]
pub struct Altimeter<B> {
    sensor: Bmp280<B>,
}

impl<B, E> Altimeter<B>
where
    B: RegisterBus<Error = E>,
{
    /// Initialise and configure the sensor, then take the altitude reference if configured to.
    pub fn initialize(bus: B, config: AltimeterConfig) -> Result<Self, Error<E>> {
        let mut sensor = Bmp280::new(bus);
        sensor.init()?;
        sensor.set_configuration(config.standby, config.filter, Spi3Wire::Disabled)?;
        sensor.set_measurement_control(
            config.temperature_oversampling,
            config.pressure_oversampling,
            config.power_mode,
        )?;
        if config.calibrate {
            sensor.calibrate()?;
        }
        debug!("altimeter ready");
        Ok(Altimeter { sensor })
    }

    /// Height above the reference point in centimetres.
    pub fn altitude_delta_cm(&mut self) -> Result<f64, Error<E>> {
        Ok(self.sensor.altitude_delta()? * 100.0)
    }

    /// Temperature in whole degrees celsius.
    pub fn temperature_celsius(&mut self) -> Result<f64, Error<E>> {
        self.sensor.get_temperature()
    }

    /// Pressure in hectopascals, from a whole pascal reading.
    pub fn pressure_hpa(&mut self) -> Result<f64, Error<E>> {
        Ok(self.sensor.get_pressure()? / 100.0)
    }

    /// The underlying driver.
    pub fn sensor(&mut self) -> &mut Bmp280<B> {
        &mut self.sensor
    }

    /// Give back the bus.
    pub fn release(self) -> B {
        self.sensor.release()
    }
}

/// Settings applied by [RangeFinder::initialize].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RangeFinderConfig {
    /// Range continuously instead of requesting one measurement per poll.
    pub continuous: bool,
    /// Sleep between two polls of the interrupt status.
    pub poll_interval_ms: u32,
    /// Polls before giving up on a measurement, `None` to wait forever.
    pub max_attempts: Option<u32>,
}

impl Default for RangeFinderConfig {
    fn default() -> Self {
        RangeFinderConfig {
            continuous: true,
            poll_interval_ms: 1000,
            max_attempts: None,
        }
    }
}

/// Distance readings from a VL6180X.
#[derive(Debug)]
pub struct RangeFinder<B> {
    sensor: Vl6180x<B>,
    config: RangeFinderConfig,
}

impl<B, E> RangeFinder<B>
where
    B: RegisterBus<Error = E>,
{
    /// Initialise the sensor and start continuous ranging if configured to.
    pub fn initialize(bus: B, config: RangeFinderConfig) -> Result<Self, Error<E>> {
        let mut sensor = Vl6180x::new(bus);
        sensor.init()?;
        if config.continuous {
            sensor.start_continuous_measurements()?;
        }
        debug!("range finder ready");
        Ok(RangeFinder { sensor, config })
    }

    /// Wait for the next measurement and return the distance in millimetres.
    pub fn poll_distance_mm(&mut self) -> Result<u8, Error<E>> {
        if !self.config.continuous {
            self.sensor.request_single_measurement()?;
        }
        self.sensor
            .wait_for_new_measurement(self.config.poll_interval_ms, self.config.max_attempts)?;
        self.sensor.get_measurement_result()
    }

    /// The underlying driver.
    pub fn sensor(&mut self) -> &mut Vl6180x<B> {
        &mut self.sensor
    }

    /// Stop ranging and give back the bus.
    pub fn release(mut self) -> Result<B, Error<E>> {
        if self.config.continuous {
            self.sensor.stop_continuous_measurements()?;
        }
        Ok(self.sensor.release())
    }
}
