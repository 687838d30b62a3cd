//! thermcam-hw — Hardware layer for the MLX90640 32x24 thermal sensor.
//!
//! Wraps the `mlx9064x` driver in the session contract the acquisition loop
//! uses, adding raw control-register access, the EEPROM image and
//! deviating-pixel handling.

pub mod device;
pub mod frame;
pub mod sensor;

pub use device::{LinuxMlx90640, Mlx90640, DEFAULT_ADDRESS};
pub use frame::{Eeprom, PixelHealth, Readout};
pub use sensor::{DeviceMode, Resolution, SensorError, ThermalSensor};
