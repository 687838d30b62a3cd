use serde::Serialize;

/// Sensor columns.
pub const WIDTH: usize = 32;
/// Sensor rows.
pub const HEIGHT: usize = 24;
/// Pixels per frame (32x24).
pub const PIXELS: usize = WIDTH * HEIGHT;
/// Bytes per pixel of a [`ColorImage`].
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Object emissivity used when none is configured.
pub const DEFAULT_EMISSIVITY: f32 = 0.8;

/// Calibrated per-pixel temperatures (°C) for one acquisition cycle.
///
/// Row-major: index `row * WIDTH + col`, row 0 first as read from the sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureGrid {
    pub values: [f32; PIXELS],
}

impl TemperatureGrid {
    pub fn new() -> Self {
        Self {
            values: [0.0; PIXELS],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * WIDTH + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.values[row * WIDTH + col] = value;
    }

    /// One sensor row as a slice of `WIDTH` values.
    pub fn row(&self, row: usize) -> &[f32] {
        &self.values[row * WIDTH..(row + 1) * WIDTH]
    }

    /// Minimum, maximum and mean over the finite pixel values.
    ///
    /// Returns `None` if no pixel holds a finite value.
    pub fn stats(&self) -> Option<GridStats> {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut count = 0usize;

        for &v in self.values.iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
            count += 1;
        }

        if count == 0 {
            return None;
        }
        Some(GridStats {
            min,
            max,
            mean: (sum / count as f64) as f32,
        })
    }
}

impl Default for TemperatureGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one temperature grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

/// False-color rendering of a grid: one RGB triple per pixel.
///
/// Rows are stored top-down for display, which is the reverse of the sensor's
/// row order (see [`crate::palette::render`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorImage {
    pub data: [u8; PIXELS * RGB_BYTES_PER_PIXEL],
}

impl ColorImage {
    pub fn new() -> Self {
        Self {
            data: [0; PIXELS * RGB_BYTES_PER_PIXEL],
        }
    }

    /// RGB triple at image coordinates.
    pub fn pixel(&self, row: usize, col: usize) -> [u8; 3] {
        let offset = (row * WIDTH + col) * RGB_BYTES_PER_PIXEL;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    pub fn put_pixel(&mut self, row: usize, col: usize, rgb: [u8; 3]) {
        let offset = (row * WIDTH + col) * RGB_BYTES_PER_PIXEL;
        self.data[offset..offset + RGB_BYTES_PER_PIXEL].copy_from_slice(&rgb);
    }
}

impl Default for ColorImage {
    fn default() -> Self {
        Self::new()
    }
}
