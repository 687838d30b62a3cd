//! Supported frame rates and their device refresh-rate codes.

use std::fmt;
use thiserror::Error;

/// Rate used when none is given on the command line.
pub const DEFAULT_FPS: u32 = 16;

/// Frames per second → 3-bit refresh-rate code of control register 1.
///
/// The device code runs one step ahead of the frame rate because the sensor
/// measures two sub-pages per full frame.
const RATE_CODES: [(u32, u8); 7] = [
    (1, 0b001),
    (2, 0b010),
    (4, 0b011),
    (8, 0b100),
    (16, 0b101),
    (32, 0b110),
    (64, 0b111),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid framerate: {0:?}")]
    InvalidArgument(String),
    #[error("unsupported framerate: {0} (supported: 1, 2, 4, 8, 16, 32, 64)")]
    UnsupportedRate(i64),
}

/// A validated output frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    fps: u32,
    code: u8,
}

impl FrameRate {
    /// Look up `fps` in the rate table.
    pub fn from_fps(fps: i64) -> Result<Self, ConfigError> {
        RATE_CODES
            .iter()
            .find(|&&(rate, _)| i64::from(rate) == fps)
            .map(|&(fps, code)| Self { fps, code })
            .ok_or(ConfigError::UnsupportedRate(fps))
    }

    pub fn fps(self) -> u32 {
        self.fps
    }

    /// Device refresh-rate code for this rate.
    pub fn code(self) -> u8 {
        self.code
    }

    /// Nominal frame period in whole microseconds (`1_000_000 / fps`).
    pub fn frame_period_micros(self) -> u64 {
        1_000_000 / u64::from(self.fps)
    }

    /// All supported rates, slowest first.
    pub fn supported() -> impl Iterator<Item = FrameRate> {
        RATE_CODES
            .iter()
            .map(|&(fps, code)| FrameRate { fps, code })
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            code: 0b101,
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fps", self.fps)
    }
}

/// Resolve the optional rate argument.
///
/// Integers follow C `strtol` base detection: optional leading whitespace
/// and sign, then `0x`/`0X` for hex, a leading `0` for octal, decimal
/// otherwise. Empty input, trailing characters and overflow are
/// `InvalidArgument`.
pub fn parse_rate(arg: Option<&str>) -> Result<FrameRate, ConfigError> {
    let Some(raw) = arg else {
        return Ok(FrameRate::default());
    };

    let fps = parse_integer(raw).ok_or_else(|| ConfigError::InvalidArgument(raw.to_string()))?;
    FrameRate::from_fps(fps)
}

fn parse_integer(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, digits) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (16, hex)
    } else if s.len() > 1 && s.starts_with('0') {
        (8, &s[1..])
    } else {
        (10, s)
    };

    // from_str_radix would accept a second sign
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
