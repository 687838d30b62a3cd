use anyhow::Result;
use clap::Parser;
use thermcam_core::MonotonicClock;
use thermcam_hw::{Mlx90640, SensorError, ThermalSensor};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;

use config::Config;
use engine::{OutputFormat, Session};

/// Stream calibrated MLX90640 frames to stdout.
#[derive(Parser)]
#[command(name = "thermcam-stream", version, about)]
struct Cli {
    /// Frames per second: 1, 2, 4, 8, 16, 32 or 64 (default 16)
    #[arg(allow_hyphen_values = true)]
    rate: Option<String>,

    /// Frame layout written to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Temps)]
    format: OutputFormat,
}

/// Resolve the session settings, then open and configure the sensor.
///
/// `open` is only called once the rate argument has been accepted.
fn start<S, F>(
    config: &Config,
    rate_arg: Option<&str>,
    format: OutputFormat,
    open: F,
) -> Result<Session<S>>
where
    S: ThermalSensor,
    F: FnOnce(&str, u8) -> Result<S, SensorError>,
{
    let settings = config.session_settings(rate_arg, format)?;

    tracing::info!(
        bus = %config.i2c_bus,
        address = config.i2c_address,
        rate = %settings.rate,
        emissivity = settings.emissivity,
        format = ?settings.format,
        "thermcam-stream starting"
    );

    let sensor = open(&config.i2c_bus, config.i2c_address)?;
    Ok(Session::configure(sensor, &settings)?)
}

fn main() -> Result<()> {
    // stdout carries frame data; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let mut session = start(&config, cli.rate.as_deref(), cli.format, Mlx90640::open)?;

    let stdout = std::io::stdout();
    let mut sink = stdout.lock();
    let clock = MonotonicClock::new();

    match session.run(&mut sink, &clock) {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!(cycles = session.cycles(), error = %e, "acquisition stopped");
            Err(e.into())
        }
    }
}
