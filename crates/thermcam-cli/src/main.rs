use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thermcam_hw::{Eeprom, Mlx90640, ThermalSensor, DEFAULT_ADDRESS};

mod capture;

#[derive(Parser)]
#[command(name = "thermcam", version, about = "thermcam stream consumer and sensor diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read frames from `thermcam-stream` on stdin and print their statistics
    Capture {
        /// Number of frames to capture
        #[arg(long, default_value_t = 50)]
        frames: u64,
        /// Warm-up frames to discard first
        #[arg(long, default_value_t = 2)]
        skip: u64,
        /// Write each captured frame as a false-color PNG into this directory
        #[arg(long)]
        out: Option<PathBuf>,
        /// PNG upscaling factor
        #[arg(long, default_value_t = 10)]
        scale: u32,
    },
    /// List I2C bus devices
    Buses,
    /// Load the sensor's calibration and print its settings and bad pixels as JSON
    Info {
        /// I2C bus device path
        #[arg(long, default_value = "/dev/i2c-1")]
        bus: String,
        /// 7-bit sensor address (decimal or 0x hex)
        #[arg(long, value_parser = parse_address, default_value_t = DEFAULT_ADDRESS)]
        address: u8,
    },
}

fn parse_address(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    match parsed {
        Ok(a) if a < 0x80 => Ok(a),
        _ => Err(format!("not a 7-bit I2C address: {value}")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Capture {
            frames,
            skip,
            out,
            scale,
        } => {
            let opts = capture::CaptureOptions {
                frames,
                skip,
                out,
                scale,
            };
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let captured = capture::capture(stdin.lock(), &mut stdout.lock(), &opts)?;
            tracing::info!(captured, "capture finished");
        }
        Commands::Buses => {
            let buses = Mlx90640::list_buses();
            if buses.is_empty() {
                println!("No I2C buses found");
            }
            for bus in buses {
                println!("{bus}");
            }
        }
        Commands::Info { bus, address } => {
            let mut sensor = Mlx90640::open(&bus, address)?;
            // register reads first: the EEPROM dump hands the bus to the driver
            let control = sensor.control_register()?;
            let refresh_rate_code = sensor.refresh_rate_code()?;
            let mut eeprom = Eeprom::new();
            sensor.dump_eeprom(&mut eeprom)?;
            let pixels = sensor.extract_parameters(&eeprom)?;

            let info = serde_json::json!({
                "bus": bus,
                "address": format!("{address:#04x}"),
                "control_register": format!("{control:#06x}"),
                "refresh_rate_code": refresh_rate_code,
                "deviating_pixels": pixels,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x33"), Ok(0x33));
        assert_eq!(parse_address("51"), Ok(0x33));
        assert!(parse_address("0x80").is_err());
        assert!(parse_address("bus").is_err());
    }

    #[test]
    fn test_capture_defaults() {
        let cli = Cli::try_parse_from(["thermcam", "capture"]).unwrap();
        match cli.command {
            Commands::Capture {
                frames,
                skip,
                out,
                scale,
            } => {
                assert_eq!((frames, skip, scale), (50, 2, 10));
                assert!(out.is_none());
            }
            _ => panic!("expected capture"),
        }
    }
}
