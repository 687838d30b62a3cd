//! The operations the acquisition loop needs from a thermal sensor.

use crate::frame::{Eeprom, PIXELS};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("i2c bus not found: {0}")]
    BusNotFound(String),
    #[error("failed to open i2c bus {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("i2c transfer failed: {0}")]
    Bus(String),
    #[error("register {register:#06x} reads {actual:#06x} after writing {written:#06x}")]
    WriteVerify {
        register: u16,
        written: u16,
        actual: u16,
    },
    #[error("sensor driver error: {0}")]
    Driver(String),
    #[error("raw register access is closed once the driver owns the bus")]
    BusHandedOver,
    #[error("driver did not report an ambient temperature")]
    NoAmbient,
    #[error("{0} broken pixels in calibration data (at most 4 allowed)")]
    TooManyBrokenPixels(usize),
    #[error("{0} outlier pixels in calibration data (at most 4 allowed)")]
    TooManyOutlierPixels(usize),
    #[error("bad pixels {0} and {1} are adjacent")]
    AdjacentBadPixels(u16, u16),
}

/// Measurement mode bit of control register 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Continuous,
    Step,
}

/// ADC resolution of the pixel readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bits16 = 0b00,
    Bits17 = 0b01,
    Bits18 = 0b10,
    Bits19 = 0b11,
}

/// Register access plus temperature calculation for one sensor session.
///
/// Every call blocks until it completes. Failures are not retried.
pub trait ThermalSensor {
    /// Per-session data extracted from the EEPROM image.
    type Params;
    /// One sub-page readout, reused across cycles.
    type Frame: Default;

    fn set_device_mode(&mut self, mode: DeviceMode) -> Result<(), SensorError>;

    fn set_subpage_repeat(&mut self, repeat: bool) -> Result<(), SensorError>;

    /// Apply a 3-bit refresh-rate code.
    fn set_refresh_rate(&mut self, code: u8) -> Result<(), SensorError>;

    fn set_chess_mode(&mut self) -> Result<(), SensorError>;

    fn dump_eeprom(&mut self, eeprom: &mut Eeprom) -> Result<(), SensorError>;

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), SensorError>;

    fn extract_parameters(&self, eeprom: &Eeprom) -> Result<Self::Params, SensorError>;

    /// Block until a new sub-page is ready and read it into `frame`.
    fn fetch_frame(&mut self, frame: &mut Self::Frame) -> Result<(), SensorError>;

    fn interpolate_outliers(&self, frame: &mut Self::Frame, eeprom: &Eeprom);

    /// Sensor die temperature in °C.
    fn ambient_temperature(&self, frame: &Self::Frame, params: &Self::Params) -> f32;

    /// Object temperatures in °C for every pixel. Pixels outside the latest
    /// sub-page carry their value from the sub-page before.
    fn calculate_to(
        &self,
        frame: &Self::Frame,
        params: &Self::Params,
        emissivity: f32,
        reflected: f32,
        out: &mut [f32; PIXELS],
    );
}
