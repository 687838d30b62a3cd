use crate::engine::{OutputFormat, SessionSettings};
use thermcam_core::types::DEFAULT_EMISSIVITY;
use thermcam_core::{parse_rate, ConfigError};
use thermcam_hw::DEFAULT_ADDRESS;

/// Streamer configuration, loaded from environment variables.
pub struct Config {
    /// I2C bus device path (default: /dev/i2c-1).
    pub i2c_bus: String,
    /// 7-bit sensor address (default: 0x33).
    pub i2c_address: u8,
    /// Object emissivity in (0, 1] (default: 0.8).
    pub emissivity: f32,
}

impl Config {
    /// Load configuration from `THERMCAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let emissivity = env_f32(&lookup, "THERMCAM_EMISSIVITY", DEFAULT_EMISSIVITY);
        let emissivity = if emissivity > 0.0 && emissivity <= 1.0 {
            emissivity
        } else {
            tracing::warn!(emissivity, "emissivity out of range; using default");
            DEFAULT_EMISSIVITY
        };

        Self {
            i2c_bus: env_string(&lookup, "THERMCAM_I2C_BUS", "/dev/i2c-1"),
            i2c_address: env_address(&lookup, "THERMCAM_I2C_ADDRESS", DEFAULT_ADDRESS),
            emissivity,
        }
    }

    /// Validate the rate argument and combine it with this configuration.
    ///
    /// Runs before the bus is opened, so a bad rate never touches the sensor.
    pub fn session_settings(
        &self,
        rate_arg: Option<&str>,
        format: OutputFormat,
    ) -> Result<SessionSettings, ConfigError> {
        Ok(SessionSettings {
            rate: parse_rate(rate_arg)?,
            emissivity: self.emissivity,
            format,
        })
    }
}

/// Decimal or `0x`-prefixed hex 7-bit address.
pub fn parse_address(value: &str) -> Option<u8> {
    let value = value.trim();
    let address = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok()?,
        None => value.parse().ok()?,
    };
    (address < 0x80).then_some(address)
}

fn env_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_address(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u8) -> u8 {
    lookup(key)
        .and_then(|v| parse_address(&v))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.i2c_bus, "/dev/i2c-1");
        assert_eq!(config.i2c_address, 0x33);
        assert_eq!(config.emissivity, 0.8);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("THERMCAM_I2C_BUS", "/dev/i2c-3"),
            ("THERMCAM_I2C_ADDRESS", "0x34"),
            ("THERMCAM_EMISSIVITY", "0.95"),
        ]);
        assert_eq!(config.i2c_bus, "/dev/i2c-3");
        assert_eq!(config.i2c_address, 0x34);
        assert_eq!(config.emissivity, 0.95);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("THERMCAM_I2C_ADDRESS", "0x1FF"),
            ("THERMCAM_EMISSIVITY", "1.5"),
        ]);
        assert_eq!(config.i2c_address, 0x33);
        assert_eq!(config.emissivity, 0.8);
    }

    #[test]
    fn test_env_helpers() {
        let lookup = |key: &str| match key {
            "F" => Some(" 0.5".to_string()),
            "BAD" => Some("warm".to_string()),
            "ADDR" => Some("0x2a".to_string()),
            "BUS" => Some("/dev/i2c-7".to_string()),
            _ => None,
        };
        assert_eq!(env_f32(&lookup, "F", 1.0), 0.5);
        assert_eq!(env_f32(&lookup, "BAD", 1.0), 1.0);
        assert_eq!(env_f32(&lookup, "MISSING", 1.0), 1.0);
        assert_eq!(env_address(&lookup, "ADDR", 0x33), 0x2A);
        assert_eq!(env_address(&lookup, "BAD", 0x33), 0x33);
        assert_eq!(env_string(&lookup, "BUS", "/dev/i2c-1"), "/dev/i2c-7");
        assert_eq!(env_string(&lookup, "MISSING", "/dev/i2c-1"), "/dev/i2c-1");
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("51"), Some(0x33));
        assert_eq!(parse_address("0x33"), Some(0x33));
        assert_eq!(parse_address("0X7f"), Some(0x7F));
        assert_eq!(parse_address("0x80"), None);
        assert_eq!(parse_address("zz"), None);
    }

    #[test]
    fn test_session_settings() {
        let config = config_from(&[]);
        let settings = config.session_settings(Some("4"), OutputFormat::Temps).unwrap();
        assert_eq!(settings.rate.fps(), 4);
        assert_eq!(settings.emissivity, 0.8);

        let default = config.session_settings(None, OutputFormat::Rgb).unwrap();
        assert_eq!(default.rate.fps(), 16);
        assert_eq!(default.format, OutputFormat::Rgb);
    }

    #[test]
    fn test_session_settings_errors() {
        let config = config_from(&[]);
        assert_eq!(
            config.session_settings(Some("12x"), OutputFormat::Temps).err(),
            Some(ConfigError::InvalidArgument("12x".into()))
        );
        assert_eq!(
            config.session_settings(Some("3"), OutputFormat::Temps).err(),
            Some(ConfigError::UnsupportedRate(3))
        );
    }
}
