//! EEPROM image, sub-page readouts, deviating pixels and their interpolation.

use crate::sensor::SensorError;
use serde::Serialize;

/// Sensor columns.
pub const COLUMNS: usize = 32;
/// Sensor rows.
pub const ROWS: usize = 24;
/// Pixels per frame.
pub const PIXELS: usize = COLUMNS * ROWS;
/// Calibration words stored in the device EEPROM.
pub const EEPROM_WORDS: usize = 832;

/// First pixel word in the EEPROM image.
pub(crate) const EEPROM_PIXEL_BASE: usize = 64;

/// Most broken, and separately most outlier, pixels a device may report.
const MAX_DEVIATING_PIXELS: usize = 4;

const KELVIN: f32 = 273.15;

/// Calibration memory image dumped from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eeprom {
    pub words: [u16; EEPROM_WORDS],
}

impl Eeprom {
    pub fn new() -> Self {
        Self {
            words: [0; EEPROM_WORDS],
        }
    }

    /// Calibration word of a pixel.
    pub fn pixel_word(&self, pixel: usize) -> u16 {
        self.words[EEPROM_PIXEL_BASE + pixel]
    }

    /// A pixel with no calibration data at all.
    pub fn is_broken(&self, pixel: usize) -> bool {
        self.pixel_word(pixel) == 0
    }

    /// A pixel the factory flagged as out of tolerance.
    pub fn is_outlier(&self, pixel: usize) -> bool {
        let word = self.pixel_word(pixel);
        word != 0 && word & 0x0001 != 0
    }
}

impl Default for Eeprom {
    fn default() -> Self {
        Self::new()
    }
}

/// The driver's view of the latest sub-page.
///
/// `temperatures` are object temperatures at unit emissivity. The driver only
/// rewrites the pixels of the sub-page it just read, so the other half keeps
/// the previous sub-page's values.
#[derive(Debug, Clone, PartialEq)]
pub struct Readout {
    pub temperatures: [f32; PIXELS],
    /// Die temperature (°C) measured with this sub-page.
    pub ambient: f32,
}

impl Default for Readout {
    fn default() -> Self {
        Self {
            temperatures: [0.0; PIXELS],
            ambient: 0.0,
        }
    }
}

/// Pixels the EEPROM marks as unusable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PixelHealth {
    pub broken: Vec<u16>,
    pub outliers: Vec<u16>,
}

impl PixelHealth {
    /// Collect the deviating pixels and reject images with too many of
    /// them, or with two of them touching.
    pub fn from_eeprom(ee: &Eeprom) -> Result<Self, SensorError> {
        let broken: Vec<u16> = (0..PIXELS).filter(|&p| ee.is_broken(p)).map(|p| p as u16).collect();
        let outliers: Vec<u16> = (0..PIXELS).filter(|&p| ee.is_outlier(p)).map(|p| p as u16).collect();

        if broken.len() > MAX_DEVIATING_PIXELS {
            return Err(SensorError::TooManyBrokenPixels(broken.len()));
        }
        if outliers.len() > MAX_DEVIATING_PIXELS {
            return Err(SensorError::TooManyOutlierPixels(outliers.len()));
        }

        let all: Vec<u16> = broken.iter().chain(outliers.iter()).copied().collect();
        for (n, &a) in all.iter().enumerate() {
            for &b in &all[n + 1..] {
                if adjacent(a, b) {
                    return Err(SensorError::AdjacentBadPixels(a.min(b), a.max(b)));
                }
            }
        }

        if !all.is_empty() {
            tracing::debug!(broken = ?broken, outliers = ?outliers, "deviating pixels");
        }
        Ok(Self { broken, outliers })
    }
}

/// Pixels that touch, including diagonally. Matches the datasheet's index
/// window check, which also flags row-wrapping neighbours.
fn adjacent(a: u16, b: u16) -> bool {
    let d = i32::from(a) - i32::from(b);
    (-34 < d && d < -30) || (-2 < d && d < 2) || (30 < d && d < 34)
}

/// Replace every broken or outlier pixel with the mean of its in-bounds
/// diagonal neighbours.
///
/// Diagonal neighbours share the pixel's chess sub-page, so they were
/// measured in the same readout.
pub fn interpolate_outliers(temperatures: &mut [f32; PIXELS], eeprom: &Eeprom) {
    for pixel in 0..PIXELS {
        if !(eeprom.is_broken(pixel) || eeprom.is_outlier(pixel)) {
            continue;
        }

        let row = (pixel / COLUMNS) as isize;
        let col = (pixel % COLUMNS) as isize;
        let mut sum = 0.0f32;
        let mut count = 0u8;

        for (dr, dc) in [(-1, -1), (-1, 1), (1, -1), (1, 1)] {
            let (r, c) = (row + dr, col + dc);
            if r < 0 || c < 0 || r >= ROWS as isize || c >= COLUMNS as isize {
                continue;
            }
            sum += temperatures[r as usize * COLUMNS + c as usize];
            count += 1;
        }

        if count > 0 {
            temperatures[pixel] = sum / f32::from(count);
        }
    }
}

/// Re-express a unit-emissivity temperature for a surface of `emissivity`
/// reflecting a background at `reflected` (°C).
///
/// The sensor sees `e·σT⁴ + (1 − e)·σTr⁴`; solving for T gives
/// `T⁴ = (T₁⁴ − (1 − e)·Tr⁴) / e`.
pub fn compensate_emissivity(unit: f32, emissivity: f32, reflected: f32) -> f32 {
    if emissivity == 1.0 {
        return unit;
    }
    let t1 = (unit + KELVIN).powi(4);
    let tr = (reflected + KELVIN).powi(4);
    ((t1 - (1.0 - emissivity) * tr) / emissivity).powf(0.25) - KELVIN
}
