//! False-color gradient from temperature to RGB.
//!
//! Seven stops, black → blue → green → yellow → red → magenta → white,
//! spread evenly over `[VMIN, VMAX]`. Values outside the range clamp to the
//! end stops. Channels are truncated, not rounded.

use crate::types::{ColorImage, TemperatureGrid, HEIGHT, WIDTH};

/// Temperature mapped to the first stop (°C).
pub const VMIN: f32 = 5.0;
/// Temperature mapped to the last stop (°C).
pub const VMAX: f32 = 50.0;

const RAMP: [[f32; 3]; 7] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
];

/// Map one temperature to an RGB triple.
pub fn false_color(v: f32) -> [u8; 3] {
    let last = RAMP.len() - 1;
    let t = (v - VMIN) / (VMAX - VMIN);

    let (lower, upper, weight) = if t <= 0.0 {
        (0, 0, 0.0)
    } else if t >= 1.0 {
        (last, last, 0.0)
    } else {
        let scaled = t * last as f32;
        let lower = (scaled.floor() as usize).min(last - 1);
        (lower, lower + 1, scaled - lower as f32)
    };

    let lo = RAMP[lower];
    let hi = RAMP[upper];
    let channel = |c: usize| (((hi[c] - lo[c]) * weight + lo[c]) * 255.0) as u8;
    [channel(0), channel(1), channel(2)]
}

/// Render a whole grid, flipping it vertically: grid row `r` lands on image
/// row `HEIGHT - 1 - r`.
pub fn render(grid: &TemperatureGrid, image: &mut ColorImage) {
    for y in 0..HEIGHT {
        let src_row = HEIGHT - 1 - y;
        for x in 0..WIDTH {
            image.put_pixel(y, x, false_color(grid.get(src_row, x)));
        }
    }
}
