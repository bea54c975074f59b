use crate::vl6180x::{InterruptError, RangeStatus};

/// Errors returned by the drivers.
///
/// `E` is the error type of the underlying [RegisterBus](crate::RegisterBus). A failed transfer
/// always surfaces as [Error::Bus]; every other variant means the transfer succeeded but the
/// device reported something the driver cannot accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The register read, register write or sleep operation failed.
    Bus(E),
    /// The driver has not been initialised with a successful `init` call.
    NotInitialized,
    /// The BMP280 chip ID register returned an unexpected value.
    InvalidChipId(u8),
    /// The VL6180X model ID register returned an unexpected value.
    InvalidModelId(u8),
    /// The VL6180X was not fresh out of reset. Power cycle the device before initialising it.
    NotFreshOutOfReset,
    /// The VL6180X device ready bit is clear, the start command was not sent.
    DeviceNotReady,
    /// The pressure compensation divisor evaluated to zero, the calibration data is corrupt.
    ZeroDivisor,
    /// A pressure compensation term overflowed, the calibration data is corrupt.
    CompensationOverflow,
    /// The VL6180X interrupt status register reported an error.
    Interrupt(InterruptError),
    /// The VL6180X range status register reported an error.
    Range(RangeStatus),
    /// A bounded wait for a new measurement ran out of attempts.
    Timeout,
}
