//! thermcam-core — Sensor-independent pieces of the thermal streamer.
//!
//! Holds the 32x24 temperature grid and color image types, the supported
//! frame-rate table, the cadence arithmetic of the acquisition loop, the
//! false-color gradient, and the raw frame stream format.

pub mod cadence;
pub mod palette;
pub mod rate;
pub mod stream;
pub mod types;

pub use cadence::{Cadence, Clock, MonotonicClock};
pub use rate::{parse_rate, ConfigError, FrameRate};
pub use types::{ColorImage, GridStats, TemperatureGrid};
