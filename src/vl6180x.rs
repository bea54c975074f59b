//! Driver for the ST VL6180X time-of-flight range sensor.
//!
//! [Vl6180x::init] runs the start-up sequence from application note AN4545: identification,
//! fresh-out-of-reset check, the mandatory private register settings, the recommended public
//! settings and finally clearing the fresh-out-of-reset flag. Ranging is then driven by polling:
//!
//! ```rust, ignore
//! let mut ranger = Vl6180x::new(bus);
//! ranger.init()?;
//! ranger.start_continuous_measurements()?;
//! loop {
//!     ranger.wait_for_new_measurement(10, Some(100))?;
//!     let distance = ranger.get_measurement_result()?;
//! }
//! ```

use log::{debug, warn};

use crate::{Error, RegisterBus};

/// Default 7-bit I2C address.
pub const I2C_ADDRESS: u8 = 0x29;

const IDENTIFICATION_MODEL_ID: u16 = 0x000;
const SYSTEM_INTERRUPT_CLEAR: u16 = 0x015;
const SYSTEM_FRESH_OUT_OF_RESET: u16 = 0x016;
const SYSRANGE_START: u16 = 0x018;
const RESULT_RANGE_STATUS: u16 = 0x04D;
const RESULT_INTERRUPT_STATUS_GPIO: u16 = 0x04F;
const RESULT_RANGE_VAL: u16 = 0x062;

const MODEL_ID: u8 = 0xB4;

// SYSRANGE__START: bit 0 start/stop, bit 1 continuous mode select.
const START_SINGLE_SHOT: u8 = 0x01;
const START_CONTINUOUS: u8 = 0x03;
const STOP_CONTINUOUS: u8 = 0x01;

// RESULT__RANGE_STATUS
const RANGE_DEVICE_READY: u8 = 0x01;
const RANGE_ERROR_SHIFT: u8 = 4;

// RESULT__INTERRUPT_STATUS_GPIO
const INT_ERROR_MASK: u8 = 0xC0;
const INT_ERROR_SHIFT: u8 = 6;
const INT_RANGE_MASK: u8 = 0x07;
const INT_RANGE_NEW_SAMPLE_READY: u8 = 0x04;

// SYSTEM__INTERRUPT_CLEAR
const CLEAR_RANGE_INT: u8 = 0x01;
const CLEAR_ALL_INT: u8 = 0x07;

/// Mandatory private register settings, AN4545 section 9.
pub(crate) const PRIVATE_SETTINGS: [(u16, u8); 30] = [
    (0x0207, 0x01),
    (0x0208, 0x01),
    (0x0096, 0x00),
    (0x0097, 0xfd),
    (0x00e3, 0x00),
    (0x00e4, 0x04),
    (0x00e5, 0x02),
    (0x00e6, 0x01),
    (0x00e7, 0x03),
    (0x00f5, 0x02),
    (0x00d9, 0x05),
    (0x00db, 0xce),
    (0x00dc, 0x03),
    (0x00dd, 0xf8),
    (0x009f, 0x00),
    (0x00a3, 0x3c),
    (0x00b7, 0x00),
    (0x00bb, 0x3c),
    (0x00b2, 0x09),
    (0x00ca, 0x09),
    (0x0198, 0x01),
    (0x01b0, 0x17),
    (0x01ad, 0x00),
    (0x00ff, 0x05),
    (0x0100, 0x05),
    (0x0199, 0x05),
    (0x01a6, 0x1b),
    (0x01ac, 0x3e),
    (0x01a7, 0x1f),
    (0x0030, 0x00),
];

/// Recommended public register settings, AN4545 section 9.
pub(crate) const RECOMMENDED_SETTINGS: [(u16, u8); 9] = [
    // GPIO1 polls for new sample ready
    (0x0011, 0x10),
    // averaging sample period
    (0x010a, 0x30),
    // light and dark gain, dark gain must stay as is
    (0x003f, 0x46),
    // range measurements between auto calibrations
    (0x0031, 0xFF),
    // ALS integration time 100 ms
    (0x0040, 0x63),
    // one temperature calibration of the ranging sensor
    (0x002e, 0x01),
    // ranging inter-measurement period 100 ms
    (0x001b, 0x09),
    // ALS inter-measurement period 500 ms
    (0x003e, 0x31),
    // interrupt on new sample ready
    (0x0014, 0x24),
];

/// Error field of the interrupt status register, bits 7:6.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptError {
    /// No error.
    NoError,
    /// Laser safety error.
    LaserSafety,
    /// PLL1 or PLL2 lock error.
    Pll,
    /// Value not defined by the datasheet.
    Unknown,
}

impl InterruptError {
    fn from_status(status: u8) -> Self {
        match (status & INT_ERROR_MASK) >> INT_ERROR_SHIFT {
            0 => Self::NoError,
            1 => Self::LaserSafety,
            2 => Self::Pll,
            _ => Self::Unknown,
        }
    }
}

/// Error code of the range status register, bits 7:4.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RangeStatus {
    /// Valid measurement.
    NoError,
    /// VCSEL continuity test failed.
    VcselContinuityTest,
    /// VCSEL watchdog test failed.
    VcselWatchdogTest,
    /// VCSEL watchdog triggered.
    VcselWatchdog,
    /// PLL1 lock lost.
    Pll1Lock,
    /// PLL2 lock lost.
    Pll2Lock,
    /// Early convergence estimate check failed.
    EarlyConvergenceEstimate,
    /// No target detected within the maximum convergence time.
    MaxConvergence,
    /// Ignore threshold check failed.
    NoTargetIgnore,
    /// Ambient conditions too high.
    MaxSignalToNoiseRatio,
    /// Target too close, raw range underflow.
    RawRangingAlgoUnderflow,
    /// Target too far, raw range overflow.
    RawRangingAlgoOverflow,
    /// Target too close.
    RangingAlgoUnderflow,
    /// Target too far.
    RangingAlgoOverflow,
    /// Code marked as not used by the datasheet.
    Reserved(u8),
}

impl RangeStatus {
    fn from_status(status: u8) -> Self {
        match status >> RANGE_ERROR_SHIFT {
            0 => Self::NoError,
            1 => Self::VcselContinuityTest,
            2 => Self::VcselWatchdogTest,
            3 => Self::VcselWatchdog,
            4 => Self::Pll1Lock,
            5 => Self::Pll2Lock,
            6 => Self::EarlyConvergenceEstimate,
            7 => Self::MaxConvergence,
            8 => Self::NoTargetIgnore,
            11 => Self::MaxSignalToNoiseRatio,
            12 => Self::RawRangingAlgoUnderflow,
            13 => Self::RawRangingAlgoOverflow,
            14 => Self::RangingAlgoUnderflow,
            15 => Self::RangingAlgoOverflow,
            code => Self::Reserved(code),
        }
    }
}

/// The VL6180X range sensor.
#[derive(Debug)]
pub struct Vl6180x<B> {
    bus: B,
    initialized: bool,
}

impl<B, E> Vl6180x<B>
where
    B: RegisterBus<Error = E>,
{
    /// Wrap a bus. No I/O is performed.
    pub fn new(bus: B) -> Self {
        Vl6180x {
            bus,
            initialized: false,
        }
    }

    /// Run the start-up sequence.
    ///
    /// The device must be fresh out of reset, so a device that was already initialised has to
    /// be power cycled first. Any failed transfer aborts the sequence; registers written up to
    /// that point keep their new values.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.initialized = false;

        let id = self.read8(IDENTIFICATION_MODEL_ID)?;
        if id != MODEL_ID {
            warn!("VL6180X: unexpected model id {:#04x}", id);
            return Err(Error::InvalidModelId(id));
        }

        if self.read8(SYSTEM_FRESH_OUT_OF_RESET)? != 0x01 {
            warn!("VL6180X: device is not fresh out of reset");
            return Err(Error::NotFreshOutOfReset);
        }

        for (register, value) in PRIVATE_SETTINGS.iter().chain(RECOMMENDED_SETTINGS.iter()) {
            self.write8(*register, *value)?;
        }

        self.write8(SYSTEM_FRESH_OUT_OF_RESET, 0x00)?;
        self.initialized = true;
        debug!("VL6180X: initialised");
        Ok(())
    }

    /// `true` once [Vl6180x::init] has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Start a single range measurement.
    pub fn request_single_measurement(&mut self) -> Result<(), Error<E>> {
        self.start(START_SINGLE_SHOT)
    }

    /// Start ranging continuously at the inter-measurement period.
    pub fn start_continuous_measurements(&mut self) -> Result<(), Error<E>> {
        self.start(START_CONTINUOUS)
    }

    /// Stop continuous ranging.
    pub fn stop_continuous_measurements(&mut self) -> Result<(), Error<E>> {
        self.start(STOP_CONTINUOUS)
    }

    /// Returns `(ready, error)`. `ready` is only `true` when a new range sample is available
    /// and no error is flagged; an error takes precedence over a new sample.
    pub fn is_measurement_ready(&mut self) -> Result<(bool, InterruptError), Error<E>> {
        self.check_initialized()?;
        let status = self.read8(RESULT_INTERRUPT_STATUS_GPIO)?;
        let error = InterruptError::from_status(status);
        let new_sample = status & INT_RANGE_MASK == INT_RANGE_NEW_SAMPLE_READY;
        Ok((error == InterruptError::NoError && new_sample, error))
    }

    /// Poll [Vl6180x::is_measurement_ready] until a sample is available, sleeping
    /// `poll_interval_ms` between polls.
    ///
    /// An error flagged by the device ends the wait with [Error::Interrupt]. With
    /// `max_attempts` set to `None` the wait is unbounded; `Some(n)` gives up with
    /// [Error::Timeout] once `n` polls found no sample.
    pub fn wait_for_new_measurement(
        &mut self,
        poll_interval_ms: u32,
        max_attempts: Option<u32>,
    ) -> Result<(), Error<E>> {
        let mut attempts: u32 = 0;
        loop {
            let (ready, error) = self.is_measurement_ready()?;
            if ready {
                return Ok(());
            }
            if error != InterruptError::NoError {
                warn!("VL6180X: interrupt error {:?}", error);
                return Err(Error::Interrupt(error));
            }

            attempts = attempts.saturating_add(1);
            if max_attempts.map_or(false, |max| attempts >= max) {
                warn!("VL6180X: no sample after {} polls", attempts);
                return Err(Error::Timeout);
            }
            self.bus.sleep_ms(poll_interval_ms).map_err(Error::Bus)?;
        }
    }

    /// Read the measured distance in millimetres and clear the range interrupt.
    ///
    /// If the range status reports an error the interrupt is left set and the error is
    /// returned as [Error::Range].
    pub fn get_measurement_result(&mut self) -> Result<u8, Error<E>> {
        self.check_initialized()?;
        let distance = self.read8(RESULT_RANGE_VAL)?;
        let status = RangeStatus::from_status(self.read8(RESULT_RANGE_STATUS)?);
        if status != RangeStatus::NoError {
            warn!("VL6180X: range error {:?}", status);
            return Err(Error::Range(status));
        }
        self.write8(SYSTEM_INTERRUPT_CLEAR, CLEAR_RANGE_INT)?;
        Ok(distance)
    }

    /// Clear the range, ALS and error interrupts.
    pub fn clear_interrupts(&mut self) -> Result<(), Error<E>> {
        self.check_initialized()?;
        self.write8(SYSTEM_INTERRUPT_CLEAR, CLEAR_ALL_INT)
    }

    /// Give back the bus.
    pub fn release(self) -> B {
        self.bus
    }

    fn start(&mut self, code: u8) -> Result<(), Error<E>> {
        self.check_initialized()?;
        if self.read8(RESULT_RANGE_STATUS)? & RANGE_DEVICE_READY == 0 {
            return Err(Error::DeviceNotReady);
        }
        self.write8(SYSRANGE_START, code)
    }

    fn check_initialized(&self) -> Result<(), Error<E>> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn read8(&mut self, reg: u16) -> Result<u8, Error<E>> {
        let mut buffer = [0u8];
        self.bus.read(reg, &mut buffer).map_err(Error::Bus)?;
        Ok(buffer[0])
    }

    fn write8(&mut self, reg: u16, value: u8) -> Result<(), Error<E>> {
        self.bus.write(reg, &[value]).map_err(Error::Bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockError};
    use std::vec::Vec;

    const INIT_WRITES: usize = 40;

    fn device() -> MockBus {
        let mut bus = MockBus::new();
        bus.set(IDENTIFICATION_MODEL_ID, &[MODEL_ID])
            .set(SYSTEM_FRESH_OUT_OF_RESET, &[0x01])
            .set(RESULT_RANGE_STATUS, &[RANGE_DEVICE_READY]);
        bus
    }

    fn initialized(bus: &mut MockBus) -> Vl6180x<&mut MockBus> {
        let mut ranger = Vl6180x::new(bus);
        ranger.init().unwrap();
        ranger
    }

    #[test]
    fn test_init_sequence() {
        let mut bus = device();
        let ranger = initialized(&mut bus);
        assert!(ranger.is_initialized());

        let expected: Vec<(u16, Vec<u8>)> = PRIVATE_SETTINGS
            .iter()
            .chain(RECOMMENDED_SETTINGS.iter())
            .map(|(r, v)| (*r, vec![*v]))
            .chain([(SYSTEM_FRESH_OUT_OF_RESET, vec![0x00])])
            .collect();
        assert_eq!(bus.writes.len(), INIT_WRITES);
        assert_eq!(bus.writes, expected);
        assert_eq!(bus.reads, vec![IDENTIFICATION_MODEL_ID, SYSTEM_FRESH_OUT_OF_RESET]);
    }

    #[test]
    fn test_init_rejects_wrong_model_id() {
        let mut bus = device();
        bus.set(IDENTIFICATION_MODEL_ID, &[0xEE]);
        let mut ranger = Vl6180x::new(&mut bus);
        assert_eq!(ranger.init(), Err(Error::InvalidModelId(0xEE)));
        assert!(!ranger.is_initialized());
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn test_init_requires_fresh_out_of_reset() {
        let mut bus = device();
        bus.set(SYSTEM_FRESH_OUT_OF_RESET, &[0x00]);
        let mut ranger = Vl6180x::new(&mut bus);
        assert_eq!(ranger.init(), Err(Error::NotFreshOutOfReset));
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn test_second_init_fails_without_power_cycle() {
        let mut bus = device();
        let mut ranger = initialized(&mut bus);
        assert_eq!(ranger.init(), Err(Error::NotFreshOutOfReset));
        assert!(!ranger.is_initialized());
    }

    #[test]
    fn test_init_aborts_on_write_error() {
        let mut bus = device();
        bus.fail_write(0x00ff);
        let mut ranger = Vl6180x::new(&mut bus);
        assert_eq!(ranger.init(), Err(Error::Bus(MockError)));
        assert!(!ranger.is_initialized());
        assert_eq!(bus.writes.len(), 23);
    }

    #[test]
    fn test_requires_init() {
        let mut bus = device();
        let mut ranger = Vl6180x::new(&mut bus);
        assert_eq!(ranger.request_single_measurement(), Err(Error::NotInitialized));
        assert_eq!(ranger.is_measurement_ready(), Err(Error::NotInitialized));
        assert_eq!(ranger.wait_for_new_measurement(1, None), Err(Error::NotInitialized));
        assert_eq!(ranger.get_measurement_result(), Err(Error::NotInitialized));
        assert_eq!(ranger.clear_interrupts(), Err(Error::NotInitialized));
        assert!(bus.reads.is_empty());
    }

    #[test]
    fn test_start_codes() {
        let mut bus = device();
        let mut ranger = initialized(&mut bus);
        ranger.request_single_measurement().unwrap();
        ranger.start_continuous_measurements().unwrap();
        ranger.stop_continuous_measurements().unwrap();
        assert_eq!(
            bus.writes[INIT_WRITES..],
            [
                (SYSRANGE_START, vec![START_SINGLE_SHOT]),
                (SYSRANGE_START, vec![START_CONTINUOUS]),
                (SYSRANGE_START, vec![STOP_CONTINUOUS]),
            ]
        );
    }

    #[test]
    fn test_start_requires_device_ready() {
        let mut bus = device();
        bus.set(RESULT_RANGE_STATUS, &[0x00]);
        let mut ranger = initialized(&mut bus);
        assert_eq!(ranger.request_single_measurement(), Err(Error::DeviceNotReady));
        assert_eq!(ranger.start_continuous_measurements(), Err(Error::DeviceNotReady));
        assert_eq!(bus.writes.len(), INIT_WRITES);
    }

    #[test]
    fn test_is_measurement_ready() {
        let mut bus = device();
        bus.queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x04])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x00])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x44])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x80])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x01]);
        let mut ranger = initialized(&mut bus);
        assert_eq!(ranger.is_measurement_ready(), Ok((true, InterruptError::NoError)));
        assert_eq!(ranger.is_measurement_ready(), Ok((false, InterruptError::NoError)));
        assert_eq!(ranger.is_measurement_ready(), Ok((false, InterruptError::LaserSafety)));
        assert_eq!(ranger.is_measurement_ready(), Ok((false, InterruptError::Pll)));
        assert_eq!(ranger.is_measurement_ready(), Ok((false, InterruptError::NoError)));
    }

    #[test]
    fn test_wait_for_new_measurement() {
        let mut bus = device();
        bus.queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x00])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x00])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x04]);
        let mut ranger = initialized(&mut bus);
        ranger.wait_for_new_measurement(10, None).unwrap();
        assert_eq!(bus.sleeps, vec![10, 10]);
        assert_eq!(bus.reads_of(RESULT_INTERRUPT_STATUS_GPIO), 3);
    }

    #[test]
    fn test_wait_stops_on_error() {
        let mut bus = device();
        bus.queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x00])
            .queue(RESULT_INTERRUPT_STATUS_GPIO, &[0x84]);
        let mut ranger = initialized(&mut bus);
        assert_eq!(
            ranger.wait_for_new_measurement(5, None),
            Err(Error::Interrupt(InterruptError::Pll))
        );
        assert_eq!(bus.sleeps, vec![5]);
    }

    #[test]
    fn test_wait_times_out() {
        let mut bus = device();
        let mut ranger = initialized(&mut bus);
        assert_eq!(ranger.wait_for_new_measurement(20, Some(3)), Err(Error::Timeout));
        assert_eq!(bus.reads_of(RESULT_INTERRUPT_STATUS_GPIO), 3);
        assert_eq!(bus.sleeps, vec![20, 20]);
    }

    #[test]
    fn test_get_measurement_result() {
        let mut bus = device();
        bus.set(RESULT_RANGE_VAL, &[123]);
        let mut ranger = initialized(&mut bus);
        assert_eq!(ranger.get_measurement_result(), Ok(123));
        assert_eq!(
            bus.writes[INIT_WRITES..],
            [(SYSTEM_INTERRUPT_CLEAR, vec![CLEAR_RANGE_INT])]
        );
    }

    #[test]
    fn test_range_error_keeps_interrupt() {
        let mut bus = device();
        bus.set(RESULT_RANGE_VAL, &[255])
            .set(RESULT_RANGE_STATUS, &[0xB1]);
        let mut ranger = initialized(&mut bus);
        assert_eq!(
            ranger.get_measurement_result(),
            Err(Error::Range(RangeStatus::MaxSignalToNoiseRatio))
        );
        assert_eq!(bus.writes.len(), INIT_WRITES);
    }

    #[test]
    fn test_range_status_codes() {
        assert_eq!(RangeStatus::from_status(0x01), RangeStatus::NoError);
        assert_eq!(RangeStatus::from_status(0x71), RangeStatus::MaxConvergence);
        assert_eq!(RangeStatus::from_status(0x90), RangeStatus::Reserved(9));
        assert_eq!(RangeStatus::from_status(0xF0), RangeStatus::RangingAlgoOverflow);
    }

    #[test]
    fn test_clear_interrupts() {
        let mut bus = device();
        let mut ranger = initialized(&mut bus);
        ranger.clear_interrupts().unwrap();
        assert_eq!(bus.writes_to(SYSTEM_INTERRUPT_CLEAR), vec![vec![CLEAR_ALL_INT]]);
    }
}
