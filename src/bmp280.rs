//! Driver for the Bosch BMP280 pressure and temperature sensor.
//!
//! The sensor reports raw 20-bit ADC codes which are compensated with the factory trimming
//! coefficients using the 64-bit integer routine from the datasheet. On top of that the driver
//! keeps a reference pressure and temperature, used to turn pressure readings into an altitude
//! difference with the barometric formula.
//!
//! ```rust, ignore
//! let mut barometer = Bmp280::new(bus);
//! barometer.init()?;
//! barometer.set_configuration(StandbyTime::Ms0_5, Filter::X16, Spi3Wire::Disabled)?;
//! barometer.set_measurement_control(Oversampling::X2, Oversampling::X16, PowerMode::Normal)?;
//! barometer.calibrate()?;
//! let climbed = barometer.altitude_delta()?;
//! ```

use log::{debug, warn};

use crate::{Error, RegisterBus};

/// Default 7-bit I2C address (SDO pulled low).
pub const I2C_ADDRESS: u8 = 0x76;
/// Alternative 7-bit I2C address (SDO pulled high).
pub const I2C_ADDRESS_ALT: u8 = 0x77;

const CALIB: u16 = 0x88;
const ID: u16 = 0xD0;
const RESET: u16 = 0xE0;
const CTRL_MEAS: u16 = 0xF4;
const CONFIG: u16 = 0xF5;
const PRESS: u16 = 0xF7;

const CHIP_ID: u8 = 0x58;
const RESET_VALUE: u8 = 0xB6;

const CALIBRATION_LEN: usize = 24;
const MEASUREMENT_LEN: usize = 6;

// Bit positions of the fields in `config` and `ctrl_meas`.
const STANDBY_SHIFT: u8 = 5;
const FILTER_SHIFT: u8 = 2;
const OSRS_T_SHIFT: u8 = 5;
const OSRS_P_SHIFT: u8 = 2;

const STARTUP_MS: u32 = 2;

const SEA_LEVEL_PRESSURE: f64 = 101_325.0;
const SEA_LEVEL_TEMPERATURE: f64 = 15.0;
const KELVIN_OFFSET: f64 = 273.15;
/// Standard atmosphere temperature lapse rate, K/m.
const LAPSE_RATE: f64 = 6.5e-3;
const BAROMETRIC_EXPONENT: f64 = 0.1902664357;

const SETTLE_SAMPLES: u32 = 10;
const REFERENCE_SAMPLES: u32 = 20;
const SAMPLE_INTERVAL_MS: u32 = 40;

/// Inactive duration between measurements in normal mode. Three bits at position 5 of `config`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StandbyTime {
    /// 0.5 ms
    Ms0_5 = 0b000,
    /// 62.5 ms
    Ms62_5 = 0b001,
    /// 125 ms
    Ms125 = 0b010,
    /// 250 ms
    Ms250 = 0b011,
    /// 500 ms
    Ms500 = 0b100,
    /// 1 s
    Ms1000 = 0b101,
    /// 2 s
    Ms2000 = 0b110,
    /// 4 s
    Ms4000 = 0b111,
}

/// IIR filter coefficient. Three bits at position 2 of `config`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Filter {
    /// Filter disabled.
    Off = 0b000,
    /// Coefficient 2.
    X2 = 0b001,
    /// Coefficient 4.
    X4 = 0b010,
    /// Coefficient 8.
    X8 = 0b011,
    /// Coefficient 16.
    X16 = 0b100,
}

/// 3-wire SPI interface. Bit 0 of `config`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Spi3Wire {
    /// 3-wire SPI disabled.
    Disabled = 0b0,
    /// 3-wire SPI enabled.
    Enabled = 0b1,
}

/// Oversampling of a measurement. Three bits, at position 5 of `ctrl_meas` for temperature and
/// at position 2 for pressure.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Oversampling {
    /// Measurement skipped, the output is left at 0x80000.
    Skipped = 0b000,
    /// Ultra low power, 16 bit resolution.
    X1 = 0b001,
    /// Low power, 17 bit resolution.
    X2 = 0b010,
    /// Standard resolution, 18 bit.
    X4 = 0b011,
    /// High resolution, 19 bit.
    X8 = 0b100,
    /// Ultra high resolution, 20 bit.
    X16 = 0b101,
}

/// Power mode. Bits 1:0 of `ctrl_meas`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PowerMode {
    /// No measurements are performed.
    Sleep = 0b00,
    /// A single measurement is performed, then the sensor returns to sleep.
    Forced = 0b01,
    /// Measurements are performed continuously, separated by the standby time.
    Normal = 0b11,
}

/// Factory trimming coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    /// dig_T1
    pub t1: u16,
    /// dig_T2
    pub t2: i16,
    /// dig_T3
    pub t3: i16,
    /// dig_P1
    pub p1: u16,
    /// dig_P2
    pub p2: i16,
    /// dig_P3
    pub p3: i16,
    /// dig_P4
    pub p4: i16,
    /// dig_P5
    pub p5: i16,
    /// dig_P6
    pub p6: i16,
    /// dig_P7
    pub p7: i16,
    /// dig_P8
    pub p8: i16,
    /// dig_P9
    pub p9: i16,
}

impl Calibration {
    /// Decode the calibration block starting at register 0x88. Every coefficient is a little
    /// endian 16-bit word.
    pub fn from_bytes(data: &[u8; CALIBRATION_LEN]) -> Self {
        let word = |i: usize| [data[2 * i], data[2 * i + 1]];
        Calibration {
            t1: u16::from_le_bytes(word(0)),
            t2: i16::from_le_bytes(word(1)),
            t3: i16::from_le_bytes(word(2)),
            p1: u16::from_le_bytes(word(3)),
            p2: i16::from_le_bytes(word(4)),
            p3: i16::from_le_bytes(word(5)),
            p4: i16::from_le_bytes(word(6)),
            p5: i16::from_le_bytes(word(7)),
            p6: i16::from_le_bytes(word(8)),
            p7: i16::from_le_bytes(word(9)),
            p8: i16::from_le_bytes(word(10)),
            p9: i16::from_le_bytes(word(11)),
        }
    }
}

/// Fixed-point output of the compensation routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compensated {
    /// Temperature in hundredths of a degree celsius.
    pub temperature: i32,
    /// Pressure in pascals, Q24.8.
    pub pressure: u32,
}

impl Compensated {
    /// Temperature in whole degrees celsius, truncated.
    pub fn celsius(&self) -> f64 {
        f64::from(self.temperature / 100)
    }

    /// Pressure in whole pascals, truncated.
    pub fn pascals(&self) -> f64 {
        f64::from(self.pressure / 256)
    }
}

/// Why a raw measurement could not be compensated. Both only happen with corrupt calibration
/// data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationError {
    /// The pressure divisor is zero.
    ZeroDivisor,
    /// An intermediate pressure term does not fit in 64 bits, or the result does not fit in
    /// 32 bits.
    Overflow,
}

impl<E> From<CompensationError> for Error<E> {
    fn from(error: CompensationError) -> Self {
        match error {
            CompensationError::ZeroDivisor => Error::ZeroDivisor,
            CompensationError::Overflow => Error::CompensationOverflow,
        }
    }
}

/// Compensate a raw measurement block (`press_msb` to `temp_xlsb`).
pub fn compensate(
    raw: &[u8; MEASUREMENT_LEN],
    calibration: &Calibration,
) -> Result<Compensated, CompensationError> {
    let adc_p = adc20(&raw[0..3]);
    let adc_t = adc20(&raw[3..6]);
    let t_fine = fine_temperature(adc_t, calibration);
    let pressure = pressure_q24_8(adc_p, t_fine, calibration)?;
    Ok(Compensated {
        temperature: (t_fine * 5 + 128) >> 8,
        pressure,
    })
}

fn adc20(bytes: &[u8]) -> i32 {
    (i32::from(bytes[0]) << 12) | (i32::from(bytes[1]) << 4) | (i32::from(bytes[2]) >> 4)
}

fn fine_temperature(adc_t: i32, cal: &Calibration) -> i32 {
    let adc = i64::from(adc_t);
    let t1 = i64::from(cal.t1);
    let var1 = (((adc >> 3) - (t1 << 1)) * i64::from(cal.t2)) >> 11;
    let var2 = ((((adc >> 4) - t1) * ((adc >> 4) - t1)) >> 12) * i64::from(cal.t3) >> 14;
    (var1 + var2) as i32
}

fn pressure_q24_8(adc_p: i32, t_fine: i32, cal: &Calibration) -> Result<u32, CompensationError> {
    let (divisor, offset) = pressure_terms(t_fine, cal).ok_or(CompensationError::Overflow)?;
    if divisor == 0 {
        return Err(CompensationError::ZeroDivisor);
    }
    pressure_scaled(adc_p, divisor, offset, cal)
        .and_then(|p| u32::try_from(p).ok())
        .ok_or(CompensationError::Overflow)
}

// Returns (var1, var2) of the datasheet routine, var1 being the divisor.
fn pressure_terms(t_fine: i32, cal: &Calibration) -> Option<(i64, i64)> {
    let var1 = i64::from(t_fine) - 128_000;
    let square = var1.checked_mul(var1)?;
    let var2 = square
        .checked_mul(i64::from(cal.p6))?
        .checked_add(var1.checked_mul(i64::from(cal.p5))?.checked_mul(1 << 17)?)?
        .checked_add(i64::from(cal.p4) << 35)?;
    let var1 = (square.checked_mul(i64::from(cal.p3))? >> 8)
        .checked_add(var1.checked_mul(i64::from(cal.p2))?.checked_mul(1 << 12)?)?;
    let var1 = (1i64 << 47).checked_add(var1)?.checked_mul(i64::from(cal.p1))? >> 33;
    Some((var1, var2))
}

fn pressure_scaled(adc_p: i32, divisor: i64, offset: i64, cal: &Calibration) -> Option<i64> {
    let p = 1_048_576 - i64::from(adc_p);
    let p = (p << 31).checked_sub(offset)?.checked_mul(3125)?.checked_div(divisor)?;
    let var1 = i64::from(cal.p9).checked_mul(p >> 13)?.checked_mul(p >> 13)? >> 25;
    let var2 = i64::from(cal.p8).checked_mul(p)? >> 19;
    Some((p.checked_add(var1)?.checked_add(var2)? >> 8) + (i64::from(cal.p7) << 4))
}

/// Reference point for altitude calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    /// Reference pressure in pascals.
    pub pressure: f64,
    /// Reference temperature in kelvin divided by the lapse rate, in metres.
    pub temperature_term: f64,
}

impl Reference {
    /// Reference from a pressure in pascals and a temperature in degrees celsius.
    pub fn new(pressure: f64, celsius: f64) -> Self {
        Reference {
            pressure,
            temperature_term: (celsius + KELVIN_OFFSET) / LAPSE_RATE,
        }
    }
}

impl Default for Reference {
    /// Standard atmosphere at sea level: 101325 Pa and 15 °C.
    fn default() -> Self {
        Reference::new(SEA_LEVEL_PRESSURE, SEA_LEVEL_TEMPERATURE)
    }
}

/// The BMP280 barometer.
///
/// Constructed uninitialised; every method except [Bmp280::init] fails with
/// [Error::NotInitialized] until `init` succeeds.
#[derive(Debug)]
pub struct Bmp280<B> {
    bus: B,
    calibration: Option<Calibration>,
    reference: Reference,
}

impl<B, E> Bmp280<B>
where
    B: RegisterBus<Error = E>,
{
    /// Wrap a bus. No I/O is performed.
    pub fn new(bus: B) -> Self {
        Bmp280 {
            bus,
            calibration: None,
            reference: Reference::default(),
        }
    }

    /// Check the chip ID, read the trimming coefficients and reset the altitude reference to
    /// sea level.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.calibration = None;

        let id = self.read8(ID)?;
        if id != CHIP_ID {
            warn!("BMP280: unexpected chip id {:#04x}", id);
            return Err(Error::InvalidChipId(id));
        }

        let mut block = [0u8; CALIBRATION_LEN];
        self.read(CALIB, &mut block)?;
        let calibration = Calibration::from_bytes(&block);
        debug!("BMP280: calibration {:?}", calibration);

        self.reference = Reference::default();
        self.calibration = Some(calibration);
        Ok(())
    }

    /// `true` once [Bmp280::init] has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.calibration.is_some()
    }

    /// The trimming coefficients read by [Bmp280::init].
    pub fn calibration(&self) -> Result<Calibration, Error<E>> {
        self.calibration.ok_or(Error::NotInitialized)
    }

    /// The current altitude reference.
    pub fn reference(&self) -> Reference {
        self.reference
    }

    /// Write the `config` register.
    pub fn set_configuration(
        &mut self,
        standby: StandbyTime,
        filter: Filter,
        spi3w: Spi3Wire,
    ) -> Result<(), Error<E>> {
        self.calibration()?;
        let byte =
            (standby as u8) << STANDBY_SHIFT | (filter as u8) << FILTER_SHIFT | spi3w as u8;
        self.write(CONFIG, &[byte])
    }

    /// Write the `ctrl_meas` register.
    pub fn set_measurement_control(
        &mut self,
        temperature: Oversampling,
        pressure: Oversampling,
        mode: PowerMode,
    ) -> Result<(), Error<E>> {
        self.calibration()?;
        let byte =
            (temperature as u8) << OSRS_T_SHIFT | (pressure as u8) << OSRS_P_SHIFT | mode as u8;
        self.write(CTRL_MEAS, &[byte])
    }

    /// Reset every configuration register to its power-on value. The trimming coefficients and
    /// the altitude reference are kept.
    pub fn soft_reset(&mut self) -> Result<(), Error<E>> {
        self.calibration()?;
        self.write(RESET, &[RESET_VALUE])?;
        self.bus.sleep_ms(STARTUP_MS).map_err(Error::Bus)
    }

    /// Read and compensate one measurement without converting units.
    pub fn read_compensated(&mut self) -> Result<Compensated, Error<E>> {
        let calibration = self.calibration()?;
        let mut raw = [0u8; MEASUREMENT_LEN];
        self.read(PRESS, &mut raw)?;
        Ok(compensate(&raw, &calibration)?)
    }

    /// Read the temperature in whole degrees celsius and the pressure in whole pascals.
    ///
    /// Both values are truncated, not rounded. Use [Bmp280::read_compensated] for the full
    /// resolution.
    pub fn get_temperature_and_pressure(&mut self) -> Result<(f64, f64), Error<E>> {
        let compensated = self.read_compensated()?;
        Ok((compensated.celsius(), compensated.pascals()))
    }

    /// Read the temperature in whole degrees celsius.
    pub fn get_temperature(&mut self) -> Result<f64, Error<E>> {
        Ok(self.get_temperature_and_pressure()?.0)
    }

    /// Read the pressure in whole pascals.
    pub fn get_pressure(&mut self) -> Result<f64, Error<E>> {
        Ok(self.get_temperature_and_pressure()?.1)
    }

    /// Measure a new altitude reference.
    ///
    /// Switches to the indoor navigation profile (normal mode, x16 pressure and x2 temperature
    /// oversampling, filter coefficient 16, 0.5 ms standby), discards the first samples while
    /// the filter settles and averages the rest into the reference. The previous `config` and
    /// `ctrl_meas` contents are restored afterwards.
    ///
    /// Any error aborts immediately. The reference then holds the average of the samples taken
    /// so far and the registers are not restored.
    pub fn calibrate(&mut self) -> Result<(), Error<E>> {
        self.calibration()?;

        let mut saved = [0u8; 2];
        self.read(CTRL_MEAS, &mut saved)?;
        let [ctrl_meas, config] = saved;

        self.set_configuration(StandbyTime::Ms0_5, Filter::X16, Spi3Wire::Disabled)?;
        self.set_measurement_control(Oversampling::X2, Oversampling::X16, PowerMode::Normal)?;

        for _ in 0..SETTLE_SAMPLES {
            self.bus.sleep_ms(SAMPLE_INTERVAL_MS).map_err(Error::Bus)?;
            self.get_temperature_and_pressure()?;
        }

        let mut temperature = 0.0;
        let mut pressure = 0.0;
        for n in 1..=REFERENCE_SAMPLES {
            self.bus.sleep_ms(SAMPLE_INTERVAL_MS).map_err(Error::Bus)?;
            let (t, p) = self.get_temperature_and_pressure()?;
            temperature += (t - temperature) / f64::from(n);
            pressure += (p - pressure) / f64::from(n);
            self.reference = Reference::new(pressure, temperature);
        }

        self.write(CONFIG, &[config])?;
        self.write(CTRL_MEAS, &[ctrl_meas])?;
        debug!("BMP280: reference {:?}", self.reference);
        Ok(())
    }

    /// Height in metres above the reference point, from the current pressure.
    pub fn altitude_delta(&mut self) -> Result<f64, Error<E>> {
        let pressure = self.get_pressure()?;
        let ratio = pressure / self.reference.pressure;
        Ok(self.reference.temperature_term * (1.0 - libm::pow(ratio, BAROMETRIC_EXPONENT)))
    }

    /// Give back the bus.
    pub fn release(self) -> B {
        self.bus
    }

    fn read(&mut self, reg: u16, buffer: &mut [u8]) -> Result<(), Error<E>> {
        self.bus.read(reg, buffer).map_err(Error::Bus)
    }

    fn read8(&mut self, reg: u16) -> Result<u8, Error<E>> {
        let mut buffer = [0u8];
        self.read(reg, &mut buffer)?;
        Ok(buffer[0])
    }

    fn write(&mut self, reg: u16, data: &[u8]) -> Result<(), Error<E>> {
        self.bus.write(reg, data).map_err(Error::Bus)
    }
}
